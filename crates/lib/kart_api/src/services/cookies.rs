//! Cookie service: build and clear the httpOnly session cookie pair.
//!
//! The refresh cookie is scoped to the refresh endpoint so browsers only send
//! it there. Clearing also expires a legacy root-scoped refresh cookie.

use axum::http::HeaderValue;
use axum::http::header::SET_COOKIE;
use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

use crate::routes::POST_AUTH_REFRESH;

/// Cookie name for the access token.
pub const ACCESS_COOKIE: &str = "access_token";
/// Cookie name for the refresh token.
pub const REFRESH_COOKIE: &str = "refresh_token";

fn session_cookie(
    name: &'static str,
    value: String,
    path: &'static str,
    max_age: Duration,
    secure: bool,
) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path(path)
        .max_age(max_age)
        .build()
}

/// Build the access token cookie.
pub fn access_cookie(token: &str, max_age_secs: i64, secure: bool) -> Cookie<'static> {
    session_cookie(
        ACCESS_COOKIE,
        token.to_string(),
        "/",
        Duration::seconds(max_age_secs),
        secure,
    )
}

/// Build the refresh token cookie, scoped to `/auth/refresh`.
pub fn refresh_cookie(token: &str, max_age_secs: i64, secure: bool) -> Cookie<'static> {
    session_cookie(
        REFRESH_COOKIE,
        token.to_string(),
        POST_AUTH_REFRESH,
        Duration::seconds(max_age_secs),
        secure,
    )
}

/// Expired cookies that remove every session cookie variant.
pub fn clear_cookies(secure: bool) -> [Cookie<'static>; 3] {
    [
        session_cookie(ACCESS_COOKIE, String::new(), "/", Duration::ZERO, secure),
        session_cookie(
            REFRESH_COOKIE,
            String::new(),
            POST_AUTH_REFRESH,
            Duration::ZERO,
            secure,
        ),
        session_cookie(REFRESH_COOKIE, String::new(), "/", Duration::ZERO, secure),
    ]
}

/// Render cookies as `Set-Cookie` header pairs.
///
/// A `CookieJar` keys cookies by name only, which would collapse the two
/// `refresh_token` variants into one header.
pub fn set_cookie_headers<const N: usize>(
    cookies: [Cookie<'static>; N],
) -> [(axum::http::HeaderName, HeaderValue); N] {
    cookies.map(|cookie| {
        let value = HeaderValue::from_str(&cookie.to_string())
            .unwrap_or_else(|_| HeaderValue::from_static(""));
        (SET_COOKIE, value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_cookie_attributes() {
        let rendered = access_cookie("tok", 900, true).to_string();
        assert!(rendered.starts_with("access_token=tok"));
        assert!(rendered.contains("HttpOnly"));
        assert!(rendered.contains("Secure"));
        assert!(rendered.contains("SameSite=Lax"));
        assert!(rendered.contains("Path=/"));
        assert!(rendered.contains("Max-Age=900"));
    }

    #[test]
    fn refresh_cookie_is_scoped_to_refresh_endpoint() {
        let cookie = refresh_cookie("r", 604_800, false);
        assert_eq!(cookie.path(), Some("/auth/refresh"));
        assert_eq!(cookie.max_age(), Some(Duration::seconds(604_800)));
        assert!(!cookie.to_string().contains("Secure"));
    }

    #[test]
    fn clearing_covers_both_refresh_paths() {
        let cleared = clear_cookies(true);
        let described: Vec<_> = cleared
            .iter()
            .map(|c| (c.name().to_string(), c.path().map(String::from)))
            .collect();
        assert_eq!(
            described,
            vec![
                ("access_token".to_string(), Some("/".to_string())),
                ("refresh_token".to_string(), Some("/auth/refresh".to_string())),
                ("refresh_token".to_string(), Some("/".to_string())),
            ]
        );
        assert!(cleared.iter().all(|c| c.max_age() == Some(Duration::ZERO)));
    }

    #[test]
    fn headers_keep_duplicate_names() {
        let headers = set_cookie_headers(clear_cookies(false));
        assert_eq!(headers.len(), 3);
        assert!(headers.iter().all(|(name, _)| name == SET_COOKIE));
    }
}

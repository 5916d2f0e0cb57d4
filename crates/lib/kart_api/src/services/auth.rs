//! Glue between HTTP requests and the `kart_core` session lifecycle.
//!
//! Turns a core `Session` into cookies, a CSRF token and a JSON body, and
//! resolves the caller's identity from cookie or bearer token.

use axum::http::HeaderMap;
use axum::http::header::{AUTHORIZATION, USER_AGENT};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use kart_core::auth::AuthError;
use kart_core::auth::csrf::CsrfGuard;
use kart_core::auth::session::Session;
use kart_core::models::auth::Identity;
use tracing::debug;

use crate::AppState;
use crate::error::AppResult;
use crate::models::TokenResponse;
use crate::services::cookies::{ACCESS_COOKIE, REFRESH_COOKIE, access_cookie, refresh_cookie};

/// Everything a login or refresh response carries.
pub struct IssuedSession {
    pub cookies: [Cookie<'static>; 2],
    pub csrf_token: String,
    pub body: TokenResponse,
}

/// `User-Agent` header, or empty when absent or not visible ASCII.
pub fn user_agent(headers: &HeaderMap) -> &str {
    headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

/// Value of the `access_token` cookie, if any.
pub fn access_token_cookie(headers: &HeaderMap) -> Option<String> {
    CookieJar::from_headers(headers)
        .get(ACCESS_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

/// Value of the `refresh_token` cookie, if any.
pub fn refresh_token_cookie(headers: &HeaderMap) -> Option<String> {
    CookieJar::from_headers(headers)
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Package a fresh session: cookies, CSRF token bound to the new access
/// token and the caller's `User-Agent`, and the JSON body.
pub fn issue_session(
    state: &AppState,
    session: Session,
    headers: &HeaderMap,
) -> AppResult<IssuedSession> {
    let secure = state.config.auth.secure_cookies;
    let tokens = session.tokens;
    let session_id = CsrfGuard::session_identifier(&tokens.access_token, user_agent(headers));
    let csrf_token = state.csrf.generate(&session_id)?;

    let cookies = [
        access_cookie(&tokens.access_token, tokens.expires_in, secure),
        refresh_cookie(&tokens.refresh_token, tokens.refresh_expires_in, secure),
    ];
    let body = TokenResponse {
        user: session.user,
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        expires_in: tokens.expires_in,
        token_type: "Bearer".into(),
        csrf_token: csrf_token.clone(),
        csrf_token_snake: csrf_token.clone(),
    };
    Ok(IssuedSession {
        cookies,
        csrf_token,
        body,
    })
}

/// Resolve the caller from the `access_token` cookie, falling back to
/// `Authorization: Bearer`. Every failure is `AuthError::InvalidToken`.
pub fn resolve_identity(state: &AppState, headers: &HeaderMap) -> Result<Identity, AuthError> {
    let token = match access_token_cookie(headers) {
        Some(cookie) => cookie,
        None => bearer_token(headers)
            .map(String::from)
            .ok_or(AuthError::InvalidToken)?,
    };
    let claims = state.auth.issuer().verify_access_token(&token)?;
    let user_id = claims.sub.parse::<i64>().map_err(|_| {
        debug!(sub = %claims.sub, "access token subject is not a user id");
        AuthError::InvalidToken
    })?;
    Ok(Identity {
        user_id,
        role: claims.role,
        username: claims.username,
    })
}

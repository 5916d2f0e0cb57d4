//! Route paths and the per-route access table.
//!
//! Middleware consults `ROUTE_TABLE` by `(method, matched path)` instead of
//! per-handler annotations. A route missing from the table is treated as
//! authenticated and not rate limited.

use axum::http::Method;
use kart_core::models::auth::Role;

pub const GET_API_HEALTH: &str = "/api/health";
pub const POST_AUTH_LOGIN: &str = "/auth/login";
pub const POST_AUTH_REGISTER: &str = "/auth/register";
pub const POST_AUTH_REFRESH: &str = "/auth/refresh";
pub const POST_AUTH_LOGOUT: &str = "/auth/logout";
pub const GET_AUTH_PROFILE: &str = "/auth/profile";
pub const POST_AUTH_FORGOT_PASSWORD: &str = "/auth/forgot-password";
pub const POST_AUTH_RESET_PASSWORD: &str = "/auth/reset-password";
pub const POST_AUTH_VERIFY_EMAIL_REQUEST: &str = "/auth/verify-email/request";
pub const POST_AUTH_VERIFY_EMAIL: &str = "/auth/verify-email";
pub const USERS: &str = "/users";
pub const USER_BY_ID: &str = "/user/{id}";

/// Payment processor webhook. Authenticated by the processor's signature,
/// so it is exempt from CSRF checks.
pub const PAYMENTS_WEBHOOK: &str = "/payments/webhook";

/// Who may call a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// No identity resolution.
    Public,
    /// Any valid access token.
    Authenticated,
    /// Valid access token with one of the listed roles.
    Roles(&'static [Role]),
}

#[derive(Debug, Clone)]
pub struct RouteSpec {
    pub method: Method,
    pub path: &'static str,
    pub access: Access,
    pub rate_limited: bool,
}

const fn spec(method: Method, path: &'static str, access: Access, rate_limited: bool) -> RouteSpec {
    RouteSpec {
        method,
        path,
        access,
        rate_limited,
    }
}

pub static ROUTE_TABLE: &[RouteSpec] = &[
    spec(Method::GET, GET_API_HEALTH, Access::Public, false),
    spec(Method::POST, POST_AUTH_LOGIN, Access::Public, true),
    spec(Method::POST, POST_AUTH_REGISTER, Access::Public, true),
    spec(Method::POST, POST_AUTH_REFRESH, Access::Public, true),
    // Public so the handler can clear cookies before resolving identity.
    spec(Method::POST, POST_AUTH_LOGOUT, Access::Public, false),
    spec(Method::GET, GET_AUTH_PROFILE, Access::Authenticated, false),
    spec(Method::POST, POST_AUTH_FORGOT_PASSWORD, Access::Public, true),
    spec(Method::POST, POST_AUTH_RESET_PASSWORD, Access::Public, true),
    spec(Method::POST, POST_AUTH_VERIFY_EMAIL_REQUEST, Access::Authenticated, true),
    spec(Method::POST, POST_AUTH_VERIFY_EMAIL, Access::Public, true),
    spec(Method::GET, USERS, Access::Roles(&[Role::Admin]), false),
    spec(Method::GET, USER_BY_ID, Access::Authenticated, false),
    spec(Method::DELETE, USER_BY_ID, Access::Authenticated, false),
];

static DEFAULT_SPEC: RouteSpec = RouteSpec {
    method: Method::GET,
    path: "",
    access: Access::Authenticated,
    rate_limited: false,
};

/// Look up the table entry for a matched route.
pub fn lookup(method: &Method, path: &str) -> &'static RouteSpec {
    ROUTE_TABLE
        .iter()
        .find(|r| r.method == *method && r.path == path)
        .unwrap_or(&DEFAULT_SPEC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_entry_points_are_public_and_rate_limited() {
        for path in [POST_AUTH_LOGIN, POST_AUTH_REGISTER, POST_AUTH_REFRESH] {
            let spec = lookup(&Method::POST, path);
            assert_eq!(spec.access, Access::Public, "{path}");
            assert!(spec.rate_limited, "{path}");
        }
    }

    #[test]
    fn profile_requires_authentication() {
        assert_eq!(
            lookup(&Method::GET, GET_AUTH_PROFILE).access,
            Access::Authenticated
        );
    }

    #[test]
    fn user_list_is_admin_only() {
        assert_eq!(
            lookup(&Method::GET, USERS).access,
            Access::Roles(&[Role::Admin])
        );
    }

    #[test]
    fn unknown_routes_fail_closed() {
        let spec = lookup(&Method::POST, "/not/in/table");
        assert_eq!(spec.access, Access::Authenticated);
        assert!(!spec.rate_limited);
        // Method is part of the key.
        assert_eq!(
            lookup(&Method::PUT, POST_AUTH_LOGIN).access,
            Access::Authenticated
        );
    }

    #[test]
    fn table_has_no_duplicate_entries() {
        for (i, a) in ROUTE_TABLE.iter().enumerate() {
            for b in &ROUTE_TABLE[i + 1..] {
                assert!(
                    !(a.method == b.method && a.path == b.path),
                    "duplicate route {} {}",
                    a.method,
                    a.path
                );
            }
        }
    }
}

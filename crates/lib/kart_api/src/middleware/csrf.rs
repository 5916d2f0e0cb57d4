//! Double-submit CSRF check for cookie-authenticated unsafe requests.

use axum::extract::{Request, State};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::Response;
use kart_core::auth::csrf::{CSRF_HEADER, CsrfGuard};
use tracing::warn;

use crate::AppState;
use crate::error::AppError;
use crate::routes::PAYMENTS_WEBHOOK;
use crate::services::auth::{access_token_cookie, user_agent};

/// Whether a request with this method and path is subject to the check.
/// Requests without an access cookie are skipped separately.
pub fn needs_check(method: &Method, path: &str) -> bool {
    let unsafe_method = matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    );
    unsafe_method && path != PAYMENTS_WEBHOOK
}

pub async fn csrf_protect(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !needs_check(request.method(), request.uri().path()) {
        return Ok(next.run(request).await);
    }
    let Some(cookie) = access_token_cookie(request.headers()) else {
        return Ok(next.run(request).await);
    };

    let headers = request.headers();
    let session_id = CsrfGuard::session_identifier(&cookie, user_agent(headers));
    let presented = headers.get(CSRF_HEADER).and_then(|v| v.to_str().ok());
    if let Err(e) = state.csrf.validate(&session_id, presented) {
        warn!(
            method = %request.method(),
            path = request.uri().path(),
            header_present = presented.is_some(),
            "csrf check failed"
        );
        return Err(e.into());
    }

    Ok(next.run(request).await)
}

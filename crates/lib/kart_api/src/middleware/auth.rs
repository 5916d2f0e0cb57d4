//! Request identity middleware.
//!
//! Looks the matched route up in the route table, verifies the access token
//! for non-public routes, enforces role restrictions, and injects
//! `AuthenticatedUser` into request extensions.

use axum::extract::{FromRequestParts, MatchedPath, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use kart_core::models::auth::Identity;
use tracing::debug;

use crate::AppState;
use crate::error::AppError;
use crate::routes::{self, Access};
use crate::services::auth::resolve_identity;

/// Verified caller, available to handlers as an extractor.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Identity);

impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("Authentication required".into()))
    }
}

/// Axum middleware: resolves identity for every route not marked public.
pub async fn require_identity(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_default();
    let spec = routes::lookup(request.method(), &path);

    if spec.access == Access::Public {
        return Ok(next.run(request).await);
    }

    let identity = resolve_identity(&state, request.headers()).map_err(|e| {
        debug!(%path, "identity resolution failed");
        AppError::from(e)
    })?;

    if let Access::Roles(allowed) = spec.access
        && !allowed.contains(&identity.role)
    {
        debug!(user_id = identity.user_id, role = %identity.role, %path, "role not permitted");
        return Err(AppError::Forbidden("Forbidden".into()));
    }

    request.extensions_mut().insert(AuthenticatedUser(identity));
    Ok(next.run(request).await)
}

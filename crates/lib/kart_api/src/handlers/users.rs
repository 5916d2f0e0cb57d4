//! User resource handlers. Every handler runs the ownership policy before
//! reading or mutating a user.

use axum::Json;
use axum::extract::{Path, State};
use kart_core::auth::policy::can_access;
use kart_core::models::auth::PublicUser;
use tracing::info;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{AckResponse, UserListResponse};

/// `GET /user/{id}`: owner or admin.
pub async fn get_user_handler(
    State(state): State<AppState>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<PublicUser>> {
    can_access(&identity, Some(id))?;
    let user = state
        .store
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(Json(user.to_public()))
}

/// `DELETE /user/{id}`: owner or admin.
pub async fn delete_user_handler(
    State(state): State<AppState>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<AckResponse>> {
    can_access(&identity, Some(id))?;
    if !state.store.delete_user(id).await? {
        return Err(AppError::NotFound("User not found".into()));
    }
    info!(user_id = id, by = identity.user_id, "user deleted");
    Ok(Json(AckResponse::ok()))
}

/// `GET /users`: admin only, enforced by the route table.
pub async fn list_users_handler(State(state): State<AppState>) -> AppResult<Json<UserListResponse>> {
    let users = state.store.list_users().await?;
    Ok(Json(UserListResponse {
        users: users.iter().map(|u| u.to_public()).collect(),
    }))
}

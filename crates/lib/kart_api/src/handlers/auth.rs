//! Authentication request handlers.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{AppendHeaders, IntoResponse, Response};
use kart_core::auth::csrf::CSRF_HEADER;
use kart_core::auth::session::NewAccount;
use kart_core::models::auth::{Identity, PublicUser};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    AckResponse, ForgotPasswordRequest, LoginRequest, RefreshRequest, RegisterRequest,
    ResetPasswordRequest, VerifyEmailRequest,
};
use crate::services::auth::{self, IssuedSession};
use crate::services::cookies::{clear_cookies, set_cookie_headers};

fn session_response(issued: IssuedSession) -> Response {
    (
        AppendHeaders(set_cookie_headers(issued.cookies)),
        [(CSRF_HEADER, issued.csrf_token)],
        Json(issued.body),
    )
        .into_response()
}

/// `POST /auth/login`: authenticate with username + password.
pub async fn login_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> AppResult<Response> {
    let session = state.auth.login(&body.username, &body.password).await?;
    let issued = auth::issue_session(&state, session, &headers)?;
    Ok(session_response(issued))
}

/// `POST /auth/register`: create a new account.
pub async fn register_handler(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<PublicUser>)> {
    let user = state
        .auth
        .register(NewAccount {
            username: body.username,
            email: body.email,
            password: body.password,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// `POST /auth/refresh`: rotate the refresh token.
///
/// The `refresh_token` cookie wins; a JSON body is the fallback for clients
/// that cannot hold cookies.
pub async fn refresh_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    let presented = auth::refresh_token_cookie(&headers).or_else(|| {
        serde_json::from_slice::<RefreshRequest>(&body)
            .ok()
            .and_then(|b| b.refresh_token)
    });
    let session = state.auth.refresh(presented.as_deref()).await?;
    let issued = auth::issue_session(&state, session, &headers)?;
    Ok(session_response(issued))
}

/// `POST /auth/logout`: clear session cookies, then revoke the refresh
/// token. Cookies are cleared even when the access token is rejected.
pub async fn logout_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let cleared = AppendHeaders(set_cookie_headers(clear_cookies(
        state.config.auth.secure_cookies,
    )));

    let result = async {
        let identity = auth::resolve_identity(&state, &headers)?;
        state.auth.logout(identity.user_id).await?;
        Ok::<_, AppError>(Json(AckResponse::ok()))
    }
    .await;

    (cleared, result).into_response()
}

/// `GET /auth/profile`: the verified identity, as carried by the token.
pub async fn profile_handler(AuthenticatedUser(identity): AuthenticatedUser) -> Json<Identity> {
    Json(identity)
}

/// `POST /auth/forgot-password`: always acknowledges.
pub async fn forgot_password_handler(
    State(state): State<AppState>,
    Json(body): Json<ForgotPasswordRequest>,
) -> AppResult<Json<AckResponse>> {
    state.action_tokens.request_password_reset(&body.email).await?;
    Ok(Json(AckResponse::ok()))
}

/// `POST /auth/reset-password`
pub async fn reset_password_handler(
    State(state): State<AppState>,
    Json(body): Json<ResetPasswordRequest>,
) -> AppResult<Json<AckResponse>> {
    state
        .action_tokens
        .reset_password(&body.token, &body.new_password)
        .await?;
    Ok(Json(AckResponse::ok()))
}

/// `POST /auth/verify-email/request`: send a verification token to the caller.
pub async fn request_verification_handler(
    State(state): State<AppState>,
    AuthenticatedUser(identity): AuthenticatedUser,
) -> AppResult<Json<AckResponse>> {
    state
        .action_tokens
        .request_email_verification(identity.user_id)
        .await?;
    Ok(Json(AckResponse::ok()))
}

/// `POST /auth/verify-email`
pub async fn verify_email_handler(
    State(state): State<AppState>,
    Json(body): Json<VerifyEmailRequest>,
) -> AppResult<Json<AckResponse>> {
    state.action_tokens.verify_email(&body.token).await?;
    Ok(Json(AckResponse::ok()))
}

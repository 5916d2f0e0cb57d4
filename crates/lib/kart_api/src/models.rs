//! Request and response bodies.
//!
//! Wire names are camelCase except where an existing client expects
//! otherwise.

use kart_core::models::auth::PublicUser;
use serde::{Deserialize, Serialize};

/// JSON error body returned for every failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Body fallback for `/auth/refresh` when the cookie is absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefreshRequest {
    #[serde(default, alias = "refreshToken")]
    pub refresh_token: Option<String>,
}

/// Successful login or refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub user: PublicUser,
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub token_type: String,
    pub csrf_token: String,
    /// Same value as `csrfToken`, for clients reading the snake_case key.
    #[serde(rename = "csrf_token")]
    pub csrf_token_snake: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckResponse {
    pub success: bool,
}

impl AckResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserListResponse {
    pub users: Vec<PublicUser>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub version: String,
    pub store_connected: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_body_accepts_both_spellings() {
        let camel: RefreshRequest = serde_json::from_str(r#"{"refreshToken":"a"}"#).unwrap();
        let snake: RefreshRequest = serde_json::from_str(r#"{"refresh_token":"b"}"#).unwrap();
        let empty: RefreshRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(camel.refresh_token.as_deref(), Some("a"));
        assert_eq!(snake.refresh_token.as_deref(), Some("b"));
        assert!(empty.refresh_token.is_none());
    }
}

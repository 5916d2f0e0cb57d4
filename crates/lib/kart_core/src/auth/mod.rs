//! Authentication and authorization logic.
//!
//! Provides password hashing, JWT management, refresh-token rotation, CSRF
//! token derivation, and the ownership policy shared by every resource
//! endpoint in `kart_api`.

pub mod action_tokens;
pub mod csrf;
pub mod jwt;
pub mod memory;
pub mod password;
pub mod policy;
pub mod queries;
pub mod session;
#[cfg(test)]
mod slow_store;
pub mod store;
pub mod tokens;

use thiserror::Error;

/// Authentication errors.
///
/// Display strings of the credential and token variants are the exact
/// client-facing messages; they must stay uniform across causes.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Forbidden")]
    Forbidden,

    #[error("CSRF token missing or invalid")]
    Csrf,

    #[error("Invalid or expired action token")]
    InvalidActionToken,

    #[error("Hashing error: {0}")]
    Hashing(String),

    #[error("Token error: {0}")]
    TokenError(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

//! Persistence seams for the auth core.
//!
//! The auth core only needs a handful of row-level operations on the user
//! record. `PgStore` backs them with PostgreSQL, `MemoryStore` with a map.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::AuthError;
use crate::models::auth::{NewUser, UserRecord};

/// Single-use action token slots on the user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionTokenKind {
    /// Email verification.
    Verify,
    /// Password reset.
    ForgetPassword,
}

/// User lookups and mutations consumed by the auth core.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Cheap reachability check.
    async fn ping(&self) -> bool;

    async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>, AuthError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, AuthError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, AuthError>;

    /// Insert a user. Duplicate username or email is a `Validation` error.
    async fn create_user(&self, new_user: NewUser) -> Result<UserRecord, AuthError>;

    /// Insert a user as `Role::Admin` if no user exists yet, otherwise with
    /// `new_user.role`. The emptiness check and the insert are one atomic step.
    async fn create_user_bootstrapping_admin(
        &self,
        new_user: NewUser,
    ) -> Result<UserRecord, AuthError>;

    async fn list_users(&self) -> Result<Vec<UserRecord>, AuthError>;

    /// Returns `false` when no row matched.
    async fn delete_user(&self, id: i64) -> Result<bool, AuthError>;

    async fn user_count(&self) -> Result<i64, AuthError>;

    async fn set_password_hash(&self, id: i64, password_hash: &str) -> Result<(), AuthError>;

    async fn mark_verified(&self, id: i64) -> Result<(), AuthError>;

    /// Store a token hash and its expiry in the given slot, replacing any
    /// previous token of that kind.
    async fn set_action_token(
        &self,
        id: i64,
        kind: ActionTokenKind,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError>;

    /// Clear the slot holding `token_hash`, expired or not, and return its
    /// owner as it was before the clear. Of several concurrent callers with
    /// the same hash, at most one gets `Some`.
    async fn take_action_token(
        &self,
        kind: ActionTokenKind,
        token_hash: &str,
    ) -> Result<Option<UserRecord>, AuthError>;
}

/// Per-user refresh-token hash. At most one live hash per user.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Unconditional overwrite; idempotent.
    async fn set_refresh_token_hash(&self, id: i64, token_hash: &str) -> Result<(), AuthError>;

    async fn get_refresh_token_hash(&self, id: i64) -> Result<Option<String>, AuthError>;

    async fn clear_refresh_token_hash(&self, id: i64) -> Result<(), AuthError>;
}

/// Everything the auth core needs from storage.
pub trait AuthStore: UserStore + RefreshTokenStore {}

impl<T: UserStore + RefreshTokenStore> AuthStore for T {}

/// Shared handle used throughout the application.
pub type SharedStore = Arc<dyn AuthStore>;

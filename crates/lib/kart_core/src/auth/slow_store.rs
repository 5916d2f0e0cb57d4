//! Test store that sleeps before every call, so concurrent flows interleave
//! between store operations.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::AuthError;
use super::memory::MemoryStore;
use super::store::{ActionTokenKind, RefreshTokenStore, UserStore};
use crate::models::auth::{NewUser, UserRecord};

pub(crate) struct SlowStore {
    inner: MemoryStore,
    delay: Duration,
}

impl SlowStore {
    pub(crate) fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryStore::new(),
            delay,
        }
    }

    async fn lag(&self) {
        tokio::time::sleep(self.delay).await;
    }
}

#[async_trait]
impl UserStore for SlowStore {
    async fn ping(&self) -> bool {
        self.lag().await;
        self.inner.ping().await
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>, AuthError> {
        self.lag().await;
        self.inner.find_by_id(id).await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, AuthError> {
        self.lag().await;
        self.inner.find_by_username(username).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, AuthError> {
        self.lag().await;
        self.inner.find_by_email(email).await
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserRecord, AuthError> {
        self.lag().await;
        self.inner.create_user(new_user).await
    }

    async fn create_user_bootstrapping_admin(
        &self,
        new_user: NewUser,
    ) -> Result<UserRecord, AuthError> {
        self.lag().await;
        self.inner.create_user_bootstrapping_admin(new_user).await
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>, AuthError> {
        self.lag().await;
        self.inner.list_users().await
    }

    async fn delete_user(&self, id: i64) -> Result<bool, AuthError> {
        self.lag().await;
        self.inner.delete_user(id).await
    }

    async fn user_count(&self) -> Result<i64, AuthError> {
        self.lag().await;
        self.inner.user_count().await
    }

    async fn set_password_hash(&self, id: i64, password_hash: &str) -> Result<(), AuthError> {
        self.lag().await;
        self.inner.set_password_hash(id, password_hash).await
    }

    async fn mark_verified(&self, id: i64) -> Result<(), AuthError> {
        self.lag().await;
        self.inner.mark_verified(id).await
    }

    async fn set_action_token(
        &self,
        id: i64,
        kind: ActionTokenKind,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        self.lag().await;
        self.inner
            .set_action_token(id, kind, token_hash, expires_at)
            .await
    }

    async fn take_action_token(
        &self,
        kind: ActionTokenKind,
        token_hash: &str,
    ) -> Result<Option<UserRecord>, AuthError> {
        self.lag().await;
        self.inner.take_action_token(kind, token_hash).await
    }
}

#[async_trait]
impl RefreshTokenStore for SlowStore {
    async fn set_refresh_token_hash(&self, id: i64, token_hash: &str) -> Result<(), AuthError> {
        self.lag().await;
        self.inner.set_refresh_token_hash(id, token_hash).await
    }

    async fn get_refresh_token_hash(&self, id: i64) -> Result<Option<String>, AuthError> {
        self.lag().await;
        self.inner.get_refresh_token_hash(id).await
    }

    async fn clear_refresh_token_hash(&self, id: i64) -> Result<(), AuthError> {
        self.lag().await;
        self.inner.clear_refresh_token_hash(id).await
    }
}

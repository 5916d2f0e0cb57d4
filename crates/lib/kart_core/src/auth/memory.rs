//! In-memory store for tests and `--memory-store` development runs.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::AuthError;
use super::store::{ActionTokenKind, RefreshTokenStore, UserStore};
use crate::models::auth::{NewUser, Role, UserRecord};

#[derive(Debug, Default)]
struct Inner {
    users: BTreeMap<i64, UserRecord>,
    next_id: i64,
}

impl Inner {
    fn insert(&mut self, new_user: NewUser) -> Result<UserRecord, AuthError> {
        let taken = self.users.values().any(|u| {
            u.username == new_user.username || u.email.eq_ignore_ascii_case(&new_user.email)
        });
        if taken {
            return Err(AuthError::Validation(
                "Username or email already registered".into(),
            ));
        }
        self.next_id += 1;
        let record = UserRecord {
            id: self.next_id,
            username: new_user.username,
            email: new_user.email,
            password_hash: new_user.password_hash,
            role: new_user.role,
            is_verified: false,
            refresh_token_hash: None,
            verify_token: None,
            verify_token_expiry: None,
            forget_password_token: None,
            forget_password_token_expiry: None,
            created_at: Utc::now(),
        };
        self.users.insert(record.id, record.clone());
        Ok(record)
    }
}

fn stored_token(user: &UserRecord, kind: ActionTokenKind) -> Option<&str> {
    match kind {
        ActionTokenKind::Verify => user.verify_token.as_deref(),
        ActionTokenKind::ForgetPassword => user.forget_password_token.as_deref(),
    }
}

type Slot<'a> = (&'a mut Option<String>, &'a mut Option<DateTime<Utc>>);

fn slot(user: &mut UserRecord, kind: ActionTokenKind) -> Slot<'_> {
    match kind {
        ActionTokenKind::Verify => (&mut user.verify_token, &mut user.verify_token_expiry),
        ActionTokenKind::ForgetPassword => (
            &mut user.forget_password_token,
            &mut user.forget_password_token_expiry,
        ),
    }
}

/// Map-backed user store. Every mutation happens under one write lock, the
/// in-process equivalent of a single-statement row update.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn update<F>(&self, id: i64, f: F) -> Result<(), AuthError>
    where
        F: FnOnce(&mut UserRecord) + Send,
    {
        let mut inner = self.inner.write().await;
        if let Some(user) = inner.users.get_mut(&id) {
            f(user);
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn ping(&self) -> bool {
        true
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>, AuthError> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, AuthError> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, AuthError> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserRecord, AuthError> {
        self.inner.write().await.insert(new_user)
    }

    async fn create_user_bootstrapping_admin(
        &self,
        mut new_user: NewUser,
    ) -> Result<UserRecord, AuthError> {
        let mut inner = self.inner.write().await;
        if inner.users.is_empty() {
            new_user.role = Role::Admin;
        }
        inner.insert(new_user)
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>, AuthError> {
        Ok(self.inner.read().await.users.values().cloned().collect())
    }

    async fn delete_user(&self, id: i64) -> Result<bool, AuthError> {
        Ok(self.inner.write().await.users.remove(&id).is_some())
    }

    async fn user_count(&self) -> Result<i64, AuthError> {
        Ok(self.inner.read().await.users.len() as i64)
    }

    async fn set_password_hash(&self, id: i64, password_hash: &str) -> Result<(), AuthError> {
        let password_hash = password_hash.to_string();
        self.update(id, move |u| u.password_hash = password_hash).await
    }

    async fn mark_verified(&self, id: i64) -> Result<(), AuthError> {
        self.update(id, |u| u.is_verified = true).await
    }

    async fn set_action_token(
        &self,
        id: i64,
        kind: ActionTokenKind,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let token_hash = token_hash.to_string();
        self.update(id, move |u| {
            let (token, expiry) = slot(u, kind);
            *token = Some(token_hash);
            *expiry = Some(expires_at);
        })
        .await
    }

    async fn take_action_token(
        &self,
        kind: ActionTokenKind,
        token_hash: &str,
    ) -> Result<Option<UserRecord>, AuthError> {
        let mut inner = self.inner.write().await;
        let Some(user) = inner
            .users
            .values_mut()
            .find(|u| stored_token(u, kind) == Some(token_hash))
        else {
            return Ok(None);
        };
        let before = user.clone();
        let (token, expiry) = slot(user, kind);
        *token = None;
        *expiry = None;
        Ok(Some(before))
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryStore {
    async fn set_refresh_token_hash(&self, id: i64, token_hash: &str) -> Result<(), AuthError> {
        let token_hash = token_hash.to_string();
        self.update(id, move |u| u.refresh_token_hash = Some(token_hash))
            .await
    }

    async fn get_refresh_token_hash(&self, id: i64) -> Result<Option<String>, AuthError> {
        Ok(self
            .inner
            .read()
            .await
            .users
            .get(&id)
            .and_then(|u| u.refresh_token_hash.clone()))
    }

    async fn clear_refresh_token_hash(&self, id: i64) -> Result<(), AuthError> {
        self.update(id, |u| u.refresh_token_hash = None).await
    }
}

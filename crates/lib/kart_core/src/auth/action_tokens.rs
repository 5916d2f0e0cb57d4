//! Single-use, time-limited action tokens: email verification and password
//! reset.
//!
//! Only the SHA-256 of a token is stored. A token past its expiry is treated
//! as absent and cleared when presented.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::{debug, info};

pub use super::store::ActionTokenKind;

use super::AuthError;
use super::password::hash_password;
use super::session::validate_password;
use super::store::SharedStore;
use super::tokens::{generate_token, hash_token};
use crate::models::auth::UserRecord;

/// Email verification token lifetime: 24 hours.
pub const VERIFY_TOKEN_EXPIRY_HOURS: i64 = 24;

/// Password reset token lifetime: 1 hour.
pub const RESET_TOKEN_EXPIRY_HOURS: i64 = 1;

impl ActionTokenKind {
    fn lifetime(self) -> Duration {
        match self {
            ActionTokenKind::Verify => Duration::hours(VERIFY_TOKEN_EXPIRY_HOURS),
            ActionTokenKind::ForgetPassword => Duration::hours(RESET_TOKEN_EXPIRY_HOURS),
        }
    }

    fn expiry_of(self, user: &UserRecord) -> Option<chrono::DateTime<Utc>> {
        match self {
            ActionTokenKind::Verify => user.verify_token_expiry,
            ActionTokenKind::ForgetPassword => user.forget_password_token_expiry,
        }
    }
}

/// Delivers plaintext action tokens to their owner.
#[async_trait]
pub trait TokenMailer: Send + Sync {
    async fn deliver(
        &self,
        user: &UserRecord,
        kind: ActionTokenKind,
        token: &str,
    ) -> Result<(), AuthError>;
}

/// Development mailer: writes the token to the debug log.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl TokenMailer for LogMailer {
    async fn deliver(
        &self,
        user: &UserRecord,
        kind: ActionTokenKind,
        token: &str,
    ) -> Result<(), AuthError> {
        debug!(user_id = user.id, email = %user.email, ?kind, token, "action token issued");
        Ok(())
    }
}

/// Issues and consumes action tokens.
#[derive(Clone)]
pub struct ActionTokens {
    store: SharedStore,
    mailer: Arc<dyn TokenMailer>,
}

impl ActionTokens {
    pub fn new(store: SharedStore, mailer: Arc<dyn TokenMailer>) -> Self {
        Self { store, mailer }
    }

    async fn issue(&self, user: &UserRecord, kind: ActionTokenKind) -> Result<(), AuthError> {
        let token = generate_token();
        let expires_at = Utc::now() + kind.lifetime();
        self.store
            .set_action_token(user.id, kind, &hash_token(&token), expires_at)
            .await?;
        self.mailer.deliver(user, kind, &token).await
    }

    /// Take a token out of its slot. Expired tokens are cleared and rejected.
    async fn consume(&self, kind: ActionTokenKind, token: &str) -> Result<UserRecord, AuthError> {
        if token.trim().is_empty() {
            return Err(AuthError::InvalidActionToken);
        }
        let user = self
            .store
            .take_action_token(kind, &hash_token(token.trim()))
            .await?
            .ok_or(AuthError::InvalidActionToken)?;

        match kind.expiry_of(&user) {
            Some(expiry) if expiry > Utc::now() => Ok(user),
            _ => {
                debug!(user_id = user.id, ?kind, "expired action token presented");
                Err(AuthError::InvalidActionToken)
            }
        }
    }

    /// Send a verification token to an authenticated user.
    pub async fn request_email_verification(&self, user_id: i64) -> Result<(), AuthError> {
        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::Validation("User not found".into()))?;
        if user.is_verified {
            return Err(AuthError::Validation("Email already verified".into()));
        }
        self.issue(&user, ActionTokenKind::Verify).await
    }

    /// Send a reset token if the email is known. Unknown addresses succeed
    /// silently so the endpoint cannot be used to enumerate accounts.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        match self.store.find_by_email(email.trim()).await? {
            Some(user) => self.issue(&user, ActionTokenKind::ForgetPassword).await,
            None => {
                debug!("password reset requested for unknown email");
                Ok(())
            }
        }
    }

    /// Mark the token owner's email as verified.
    pub async fn verify_email(&self, token: &str) -> Result<(), AuthError> {
        let user = self.consume(ActionTokenKind::Verify, token).await?;
        self.store.mark_verified(user.id).await?;
        info!(user_id = user.id, "email verified");
        Ok(())
    }

    /// Set a new password and revoke the owner's refresh token.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AuthError> {
        validate_password(new_password)?;
        let user = self.consume(ActionTokenKind::ForgetPassword, token).await?;
        let password_hash = hash_password(new_password).await?;
        self.store.set_password_hash(user.id, &password_hash).await?;
        self.store.clear_refresh_token_hash(user.id).await?;
        info!(user_id = user.id, "password reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::auth::jwt::{TokenIssuer, TokenSettings};
    use crate::auth::memory::MemoryStore;
    use crate::auth::session::{NewAccount, SessionAuthenticator};
    use crate::auth::slow_store::SlowStore;

    /// Captures delivered tokens.
    #[derive(Default)]
    struct Outbox(Mutex<Vec<(i64, ActionTokenKind, String)>>);

    #[async_trait]
    impl TokenMailer for Outbox {
        async fn deliver(
            &self,
            user: &UserRecord,
            kind: ActionTokenKind,
            token: &str,
        ) -> Result<(), AuthError> {
            self.0.lock().unwrap().push((user.id, kind, token.to_string()));
            Ok(())
        }
    }

    impl Outbox {
        fn last(&self) -> String {
            self.0.lock().unwrap().last().unwrap().2.clone()
        }

        fn len(&self) -> usize {
            self.0.lock().unwrap().len()
        }
    }

    async fn setup() -> (SessionAuthenticator, ActionTokens, Arc<Outbox>, i64) {
        setup_with(Arc::new(MemoryStore::new())).await
    }

    async fn setup_with(
        store: SharedStore,
    ) -> (SessionAuthenticator, ActionTokens, Arc<Outbox>, i64) {
        let auth = SessionAuthenticator::new(
            store.clone(),
            TokenIssuer::new(&TokenSettings::new("a", "r")),
        );
        let outbox = Arc::new(Outbox::default());
        let tokens = ActionTokens::new(store, outbox.clone());
        let user = auth
            .register(NewAccount {
                username: "alice".into(),
                email: "alice@example.com".into(),
                password: "password123".into(),
            })
            .await
            .unwrap();
        (auth, tokens, outbox, user.id)
    }

    #[tokio::test]
    async fn verify_email_is_single_use() {
        let (auth, tokens, outbox, id) = setup().await;
        tokens.request_email_verification(id).await.unwrap();
        let token = outbox.last();

        let stored = auth.store().find_by_id(id).await.unwrap().unwrap();
        assert_ne!(stored.verify_token.as_deref(), Some(token.as_str()));
        assert!(stored.verify_token_expiry.is_some());

        tokens.verify_email(&token).await.unwrap();
        assert!(auth.store().find_by_id(id).await.unwrap().unwrap().is_verified);
        assert!(matches!(
            tokens.verify_email(&token).await,
            Err(AuthError::InvalidActionToken)
        ));
    }

    #[tokio::test]
    async fn expired_token_is_treated_as_absent_and_cleared() {
        let (auth, tokens, _outbox, id) = setup().await;
        let token = "expired-token";
        auth.store()
            .set_action_token(
                id,
                ActionTokenKind::ForgetPassword,
                &hash_token(token),
                Utc::now() - Duration::minutes(1),
            )
            .await
            .unwrap();

        assert!(matches!(
            tokens.reset_password(token, "new-password-1").await,
            Err(AuthError::InvalidActionToken)
        ));
        let user = auth.store().find_by_id(id).await.unwrap().unwrap();
        assert!(user.forget_password_token.is_none());
        assert!(user.forget_password_token_expiry.is_none());
    }

    #[tokio::test]
    async fn reset_password_changes_credentials_and_revokes_session() {
        let (auth, tokens, outbox, id) = setup().await;
        let session = auth.login("alice", "password123").await.unwrap();

        tokens
            .request_password_reset("ALICE@example.com")
            .await
            .unwrap();
        tokens
            .reset_password(&outbox.last(), "brand-new-pass")
            .await
            .unwrap();

        assert!(matches!(
            auth.login("alice", "password123").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(auth.login("alice", "brand-new-pass").await.is_ok());
        assert!(auth.refresh(Some(&session.tokens.refresh_token)).await.is_err());
        assert_eq!(
            auth.store()
                .find_by_id(id)
                .await
                .unwrap()
                .unwrap()
                .forget_password_token,
            None
        );
    }

    #[tokio::test]
    async fn reset_for_unknown_email_is_silent() {
        let (_auth, tokens, outbox, _id) = setup().await;
        tokens
            .request_password_reset("nobody@example.com")
            .await
            .unwrap();
        assert_eq!(outbox.len(), 0);
    }

    #[tokio::test]
    async fn weak_new_password_is_rejected_before_consuming() {
        let (_auth, tokens, outbox, _id) = setup().await;
        tokens
            .request_password_reset("alice@example.com")
            .await
            .unwrap();
        let token = outbox.last();
        assert!(matches!(
            tokens.reset_password(&token, "short").await,
            Err(AuthError::Validation(_))
        ));
        assert!(tokens.reset_password(&token, "long-enough").await.is_ok());
    }

    #[tokio::test]
    async fn concurrent_resets_with_one_token_succeed_once() {
        let store: SharedStore = Arc::new(SlowStore::new(std::time::Duration::from_millis(20)));
        let (auth, tokens, outbox, _id) = setup_with(store).await;
        tokens
            .request_password_reset("alice@example.com")
            .await
            .unwrap();
        let token = outbox.last();

        let (first, second) = tokio::join!(
            tokens.reset_password(&token, "first-new-pass"),
            tokens.reset_password(&token, "second-new-pass"),
        );
        let succeeded = [first.is_ok(), second.is_ok()];
        assert_eq!(succeeded.iter().filter(|ok| **ok).count(), 1);
        let rejected = if first.is_ok() { second } else { first };
        assert!(matches!(rejected, Err(AuthError::InvalidActionToken)));

        // Only the winning reset's password took effect.
        let usable = [
            auth.login("alice", "first-new-pass").await.is_ok(),
            auth.login("alice", "second-new-pass").await.is_ok(),
        ];
        assert_eq!(usable, succeeded);
    }
}

//! Session lifecycle: register, login, refresh (with rotation), logout.
//!
//! Only the SHA-256 of the current refresh token is stored, one per user.
//! Every successful refresh overwrites it, so a refresh token is usable once
//! and a second login invalidates the first session's refresh token.

use std::sync::LazyLock;

use tracing::{debug, info, warn};

use super::AuthError;
use super::jwt::TokenIssuer;
use super::password::{BCRYPT_COST, hash_password, verify_password};
use super::store::SharedStore;
use super::tokens::hash_token;
use crate::models::auth::{NewUser, PublicUser, Role, UserRecord};

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Freshly minted token pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    /// Refresh token lifetime in seconds.
    pub refresh_expires_in: i64,
}

/// Result of a successful login or refresh.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: PublicUser,
    pub tokens: TokenPair,
}

/// Registration input.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Hash verified against when the username is unknown, so a miss costs as
/// much as a wrong password.
static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| bcrypt::hash("kart-dummy-password", BCRYPT_COST).ok());

/// Validate a password against the length policy.
pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_account(account: &NewAccount) -> Result<(), AuthError> {
    let username = account.username.as_str();
    let valid_username = (3..=32).contains(&username.chars().count())
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if !valid_username {
        return Err(AuthError::Validation(
            "Username must be 3-32 characters of letters, digits, '_', '-' or '.'".into(),
        ));
    }
    let email = account.email.trim();
    let valid_email = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid_email {
        return Err(AuthError::Validation("Invalid email address".into()));
    }
    validate_password(&account.password)
}

/// Verifies credentials and refresh tokens, issuing rotated token pairs.
#[derive(Clone)]
pub struct SessionAuthenticator {
    store: SharedStore,
    issuer: TokenIssuer,
}

impl SessionAuthenticator {
    pub fn new(store: SharedStore, issuer: TokenIssuer) -> Self {
        Self { store, issuer }
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Create an account. The first account on an empty store becomes admin.
    pub async fn register(&self, account: NewAccount) -> Result<PublicUser, AuthError> {
        validate_account(&account)?;

        if self.store.find_by_username(&account.username).await?.is_some()
            || self.store.find_by_email(account.email.trim()).await?.is_some()
        {
            return Err(AuthError::Validation(
                "Username or email already registered".into(),
            ));
        }

        let password_hash = hash_password(&account.password).await?;
        let record = self
            .store
            .create_user_bootstrapping_admin(NewUser {
                username: account.username,
                email: account.email.trim().to_string(),
                password_hash,
                role: Role::User,
            })
            .await?;

        if record.role.is_admin() {
            info!(user_id = record.id, username = %record.username, "first user granted admin role");
        } else {
            info!(user_id = record.id, username = %record.username, "user registered");
        }
        Ok(record.to_public())
    }

    /// Authenticate with username + password.
    ///
    /// Unknown user, empty input and wrong password all fail with the same
    /// `InvalidCredentials`.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, AuthError> {
        let Some(record) = self.store.find_by_username(username).await? else {
            let password = password.to_owned();
            let _ = tokio::task::spawn_blocking(move || {
                DUMMY_HASH
                    .as_deref()
                    .map(|dummy| bcrypt::verify(password, dummy))
            })
            .await;
            debug!("login failed: unknown username");
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_password(password, &record.password_hash).await? {
            debug!(user_id = record.id, "login failed: wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        let session = self.start_session(&record).await?;
        info!(user_id = record.id, "user logged in");
        Ok(session)
    }

    /// Exchange a refresh token for a new pair. The presented token is
    /// invalidated by the overwrite of the stored hash.
    pub async fn refresh(&self, presented: Option<&str>) -> Result<Session, AuthError> {
        let token = presented
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                debug!("refresh rejected: no token presented");
                AuthError::InvalidRefreshToken
            })?;

        let claims = self.issuer.verify_refresh_token(token).map_err(|e| {
            debug!(error = %e, "refresh rejected: verification failed");
            AuthError::InvalidRefreshToken
        })?;

        let user_id = claims
            .sub
            .as_deref()
            .and_then(|sub| sub.parse::<i64>().ok())
            .ok_or_else(|| {
                debug!("refresh rejected: missing or malformed subject");
                AuthError::InvalidRefreshToken
            })?;

        let stored = self
            .store
            .get_refresh_token_hash(user_id)
            .await?
            .ok_or_else(|| {
                debug!(user_id, "refresh rejected: no stored token");
                AuthError::InvalidRefreshToken
            })?;

        if hash_token(token) != stored {
            warn!(user_id, "refresh rejected: token does not match stored hash");
            return Err(AuthError::InvalidRefreshToken);
        }

        let record = self.store.find_by_id(user_id).await?.ok_or_else(|| {
            debug!(user_id, "refresh rejected: user no longer exists");
            AuthError::InvalidRefreshToken
        })?;

        let session = self.start_session(&record).await?;
        debug!(user_id, "refresh token rotated");
        Ok(session)
    }

    /// Revoke refresh capability. Idempotent.
    pub async fn logout(&self, user_id: i64) -> Result<(), AuthError> {
        self.store.clear_refresh_token_hash(user_id).await?;
        info!(user_id, "user logged out");
        Ok(())
    }

    async fn start_session(&self, record: &UserRecord) -> Result<Session, AuthError> {
        let access_token =
            self.issuer
                .issue_access_token(record.id, &record.username, record.role)?;
        let refresh_token = self.issuer.issue_refresh_token(record.id, &record.username)?;
        self.store
            .set_refresh_token_hash(record.id, &hash_token(&refresh_token))
            .await?;
        Ok(Session {
            user: record.to_public(),
            tokens: TokenPair {
                access_token,
                refresh_token,
                expires_in: self.issuer.access_ttl_secs(),
                refresh_expires_in: self.issuer.refresh_ttl_secs(),
            },
        })
    }
}

//! Auth-related database queries (PostgreSQL).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::AuthError;
use super::store::{ActionTokenKind, RefreshTokenStore, UserStore};
use crate::models::auth::{NewUser, Role, UserRecord};

const USER_COLUMNS: &str = "id, username, email, password_hash, role, is_verified, \
     refresh_token_hash, verify_token, verify_token_expiry, \
     forget_password_token, forget_password_token_expiry, created_at";

/// Raw `users` row; `role` is decoded separately so an unexpected value
/// surfaces as an error instead of a panic.
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    password_hash: String,
    role: String,
    is_verified: bool,
    refresh_token_hash: Option<String>,
    verify_token: Option<String>,
    verify_token_expiry: Option<DateTime<Utc>>,
    forget_password_token: Option<String>,
    forget_password_token_expiry: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for UserRecord {
    type Error = AuthError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<Role>()
            .map_err(|e| AuthError::Internal(format!("user {}: {e}", row.id)))?;
        Ok(UserRecord {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            role,
            is_verified: row.is_verified,
            refresh_token_hash: row.refresh_token_hash,
            verify_token: row.verify_token,
            verify_token_expiry: row.verify_token_expiry,
            forget_password_token: row.forget_password_token,
            forget_password_token_expiry: row.forget_password_token_expiry,
            created_at: row.created_at,
        })
    }
}

/// Advisory lock key held while an insert decides the bootstrap role.
const BOOTSTRAP_LOCK_KEY: i64 = 0x6b61_7274_0001;

fn map_insert_error(e: sqlx::Error) -> AuthError {
    match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AuthError::Validation("Username or email already registered".into())
        }
        other => AuthError::DbError(other),
    }
}

fn into_record(row: Option<UserRow>) -> Result<Option<UserRecord>, AuthError> {
    row.map(UserRecord::try_from).transpose()
}

/// PostgreSQL-backed user and refresh-token store.
#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn find_one(&self, sql: &str, value: &str) -> Result<Option<UserRecord>, AuthError> {
        let row = sqlx::query_as::<_, UserRow>(sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        into_record(row)
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>, AuthError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        into_record(row)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, AuthError> {
        self.find_one(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1"),
            username,
        )
        .await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, AuthError> {
        self.find_one(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"),
            email,
        )
        .await
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserRecord, AuthError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (username, email, password_hash, role) \
             VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
        ))
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(new_user.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_insert_error)?;
        UserRecord::try_from(row)
    }

    async fn create_user_bootstrapping_admin(
        &self,
        new_user: NewUser,
    ) -> Result<UserRecord, AuthError> {
        // Serializes bootstrap inserts so two first registrations cannot
        // both see an empty table.
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(BOOTSTRAP_LOCK_KEY)
            .execute(&mut *tx)
            .await?;
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (username, email, password_hash, role) \
             SELECT $1, $2, $3, \
                 CASE WHEN EXISTS (SELECT 1 FROM users) THEN $4 ELSE 'admin' END \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(new_user.role.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_insert_error)?;
        tx.commit().await?;
        UserRecord::try_from(row)
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>, AuthError> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(UserRecord::try_from).collect()
    }

    async fn delete_user(&self, id: i64) -> Result<bool, AuthError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn user_count(&self) -> Result<i64, AuthError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn set_password_hash(&self, id: i64, password_hash: &str) -> Result<(), AuthError> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_verified(&self, id: i64) -> Result<(), AuthError> {
        sqlx::query("UPDATE users SET is_verified = TRUE, updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_action_token(
        &self,
        id: i64,
        kind: ActionTokenKind,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let sql = match kind {
            ActionTokenKind::Verify => {
                "UPDATE users SET verify_token = $2, verify_token_expiry = $3, \
                 updated_at = now() WHERE id = $1"
            }
            ActionTokenKind::ForgetPassword => {
                "UPDATE users SET forget_password_token = $2, \
                 forget_password_token_expiry = $3, updated_at = now() WHERE id = $1"
            }
        };
        sqlx::query(sql)
            .bind(id)
            .bind(token_hash)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn take_action_token(
        &self,
        kind: ActionTokenKind,
        token_hash: &str,
    ) -> Result<Option<UserRecord>, AuthError> {
        let (token, expiry) = match kind {
            ActionTokenKind::Verify => ("verify_token", "verify_token_expiry"),
            ActionTokenKind::ForgetPassword => {
                ("forget_password_token", "forget_password_token_expiry")
            }
        };
        // The locked CTE row carries the pre-clear slot; a concurrent taker
        // blocks on the lock and then no longer matches.
        let returning = USER_COLUMNS
            .split(", ")
            .map(str::trim)
            .map(|c| {
                if c == token || c == expiry {
                    format!("taken.{c}")
                } else {
                    format!("u.{c}")
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "WITH taken AS ( \
                 SELECT id, {token}, {expiry} FROM users WHERE {token} = $1 FOR UPDATE \
             ) \
             UPDATE users u SET {token} = NULL, {expiry} = NULL, updated_at = now() \
             FROM taken WHERE u.id = taken.id \
             RETURNING {returning}"
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        into_record(row)
    }
}

#[async_trait]
impl RefreshTokenStore for PgStore {
    async fn set_refresh_token_hash(&self, id: i64, token_hash: &str) -> Result<(), AuthError> {
        sqlx::query("UPDATE users SET refresh_token_hash = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_refresh_token_hash(&self, id: i64) -> Result<Option<String>, AuthError> {
        let hash = sqlx::query_scalar::<_, Option<String>>(
            "SELECT refresh_token_hash FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(hash.flatten())
    }

    async fn clear_refresh_token_hash(&self, id: i64) -> Result<(), AuthError> {
        sqlx::query("UPDATE users SET refresh_token_hash = NULL, updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

//! Password hashing via bcrypt.
//!
//! bcrypt is CPU-bound, so both operations run on the blocking pool.

use tokio::task;

use super::AuthError;

/// bcrypt cost factor.
pub(crate) const BCRYPT_COST: u32 = 10;

/// Hash a password with bcrypt (cost 10, fresh salt).
pub async fn hash_password(password: &str) -> Result<String, AuthError> {
    let password = password.to_owned();
    task::spawn_blocking(move || bcrypt::hash(password, BCRYPT_COST))
        .await
        .map_err(|e| AuthError::Hashing(format!("hash task: {e}")))?
        .map_err(|e| AuthError::Hashing(format!("bcrypt hash: {e}")))
}

/// Verify a password against a bcrypt hash.
///
/// Returns `Ok(false)` on mismatch; errors only when the hash itself is
/// unusable.
pub async fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let password = password.to_owned();
    let hash = hash.to_owned();
    task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AuthError::Hashing(format!("verify task: {e}")))?
        .map_err(|e| AuthError::Hashing(format!("bcrypt verify: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_is_self_describing_and_salted() {
        let a = hash_password("correct horse").await.unwrap();
        let b = hash_password("correct horse").await.unwrap();
        assert!(a.starts_with("$2b$10$"), "unexpected hash: {a}");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn verify_accepts_match_and_rejects_mismatch() {
        let hash = hash_password("s3cret-pass").await.unwrap();
        assert!(verify_password("s3cret-pass", &hash).await.unwrap());
        assert!(!verify_password("wrong", &hash).await.unwrap());
        assert!(!verify_password("", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn malformed_hash_is_a_hashing_error_without_plaintext() {
        let err = verify_password("plaintext-value", "not-a-hash")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Hashing(_)));
        assert!(!err.to_string().contains("plaintext-value"));
    }
}

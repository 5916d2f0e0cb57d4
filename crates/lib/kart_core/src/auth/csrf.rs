//! Double-submit CSRF tokens bound to the cookie session.
//!
//! The token is an HMAC of the session identifier, so the server keeps no
//! per-session state: it recomputes the expected value on each request.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use super::AuthError;

type HmacSha256 = Hmac<Sha256>;

/// Name of the request/response header carrying the token.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Derives and checks CSRF tokens from a server secret.
#[derive(Clone)]
pub struct CsrfGuard {
    secret: Vec<u8>,
}

impl CsrfGuard {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    /// `hex(sha256(access_token_cookie)) + user_agent`.
    pub fn session_identifier(access_token_cookie: &str, user_agent: &str) -> String {
        let digest = Sha256::digest(access_token_cookie.as_bytes());
        format!("{digest:x}{user_agent}")
    }

    fn mac(&self, session_id: &str) -> Result<HmacSha256, AuthError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| AuthError::Internal(format!("csrf hmac key: {e}")))?;
        mac.update(session_id.as_bytes());
        Ok(mac)
    }

    /// Token for the given session identifier.
    pub fn generate(&self, session_id: &str) -> Result<String, AuthError> {
        let tag = self.mac(session_id)?.finalize().into_bytes();
        Ok(URL_SAFE_NO_PAD.encode(tag))
    }

    /// Check a client-echoed token against the session identifier in
    /// constant time. Missing, undecodable and mismatched tokens all fail
    /// with `AuthError::Csrf`.
    pub fn validate(&self, session_id: &str, presented: Option<&str>) -> Result<(), AuthError> {
        let presented = presented.filter(|t| !t.is_empty()).ok_or(AuthError::Csrf)?;
        let raw = URL_SAFE_NO_PAD
            .decode(presented)
            .map_err(|_| AuthError::Csrf)?;
        self.mac(session_id)?
            .verify_slice(&raw)
            .map_err(|_| AuthError::Csrf)
    }
}

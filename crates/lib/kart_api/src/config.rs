//! API server configuration.
//!
//! Built once at boot and passed by value into the router; nothing below this
//! layer reads the environment.

use std::path::{Path, PathBuf};

use kart_core::auth::jwt::TokenSettings;
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use tracing::{info, warn};

/// Default fixed-window budget for rate-limited routes.
pub const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u32 = 10;
/// Default fixed-window length for rate-limited routes.
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Secrets and cookie policy for the auth core.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub tokens: TokenSettings,
    pub csrf_secret: String,
    /// `Secure` attribute on auth cookies; off only in local development.
    pub secure_cookies: bool,
    /// Origins allowed to make credentialed cross-origin requests.
    pub allowed_origins: Vec<String>,
}

impl AuthConfig {
    /// Production defaults around explicit secrets.
    pub fn new(
        access_secret: impl Into<String>,
        refresh_secret: impl Into<String>,
        csrf_secret: impl Into<String>,
    ) -> Self {
        Self {
            tokens: TokenSettings::new(access_secret, refresh_secret),
            csrf_secret: csrf_secret.into(),
            secure_cookies: true,
            allowed_origins: Vec::new(),
        }
    }
}

/// Fixed-window rate limit applied to routes flagged in the route table.
#[derive(Clone, Copy, Debug)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_secs: u64,
    /// Key clients by `x-real-ip` / `x-forwarded-for` instead of the socket
    /// peer. Only safe behind a proxy that overwrites those headers.
    pub trust_proxy_headers: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_RATE_LIMIT_MAX_REQUESTS,
            window_secs: DEFAULT_RATE_LIMIT_WINDOW_SECS,
            trust_proxy_headers: false,
        }
    }
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub database_url: String,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                         | Default                           |
    /// |----------------------------------|-----------------------------------|
    /// | `BIND_ADDR`                      | `127.0.0.1:3100`                  |
    /// | `DATABASE_URL`                   | `postgres://localhost:5432/kart`  |
    /// | `JWT_ACCESS_SECRET` / `JWT_SECRET` | generated & persisted to file   |
    /// | `JWT_REFRESH_SECRET`             | generated & persisted to file     |
    /// | `CSRF_SECRET`                    | generated & persisted to file     |
    /// | `APP_ENV`                        | `production`                      |
    /// | `CORS_ORIGINS`                   | none (comma-separated)            |
    /// | `RATE_LIMIT_MAX_REQUESTS`        | `10`                              |
    /// | `RATE_LIMIT_WINDOW_SECS`         | `60`                              |
    /// | `TRUST_PROXY_HEADERS`            | `false`                           |
    pub fn from_env() -> Self {
        let app_env = std::env::var("APP_ENV").unwrap_or_else(|_| "production".into());

        let mut auth = AuthConfig::new(
            resolve_secret(&["JWT_ACCESS_SECRET", "JWT_SECRET"], "jwt-access-secret"),
            resolve_secret(&["JWT_REFRESH_SECRET"], "jwt-refresh-secret"),
            resolve_secret(&["CSRF_SECRET"], "csrf-secret"),
        );
        auth.secure_cookies = !is_local_env(&app_env);
        auth.allowed_origins = std::env::var("CORS_ORIGINS")
            .map(|v| parse_origins(&v))
            .unwrap_or_default();

        let defaults = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            max_requests: env_parse("RATE_LIMIT_MAX_REQUESTS").unwrap_or(defaults.max_requests),
            window_secs: env_parse("RATE_LIMIT_WINDOW_SECS").unwrap_or(defaults.window_secs),
            trust_proxy_headers: env_parse("TRUST_PROXY_HEADERS")
                .unwrap_or(defaults.trust_proxy_headers),
        };

        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3100".into()),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/kart".into()),
            auth,
            rate_limit,
        }
    }
}

/// `true` for environments where cookies may travel over plain HTTP.
pub fn is_local_env(app_env: &str) -> bool {
    matches!(
        app_env.trim().to_ascii_lowercase().as_str(),
        "development" | "dev" | "local" | "test"
    )
}

/// Split a comma-separated origin list, dropping blanks.
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable environment value");
            None
        }
    }
}

/// Resolve a secret: first non-empty env var in `keys` → persisted file.
pub fn resolve_secret(keys: &[&str], file_name: &str) -> String {
    for key in keys {
        if let Ok(secret) = std::env::var(key)
            && !secret.is_empty()
        {
            return secret;
        }
    }
    load_or_create_secret(&secret_path(file_name))
}

/// Read a secret from `path`, generating and persisting one if absent.
pub fn load_or_create_secret(path: &Path) -> String {
    if let Ok(existing) = std::fs::read_to_string(path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    match std::fs::write(path, &secret) {
        Ok(()) => info!(path = %path.display(), "generated new secret"),
        Err(e) => warn!(path = %path.display(), error = %e, "could not persist generated secret"),
    }
    secret
}

/// Path to a persisted secret file.
fn secret_path(file_name: &str) -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("kart")
        .join(file_name)
}

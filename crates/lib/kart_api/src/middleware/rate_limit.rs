//! Fixed-window rate limiter for routes flagged in the route table.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, MatchedPath, Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use dashmap::DashMap;
use tracing::warn;

use crate::AppState;
use crate::config::RateLimitConfig;
use crate::error::AppError;
use crate::routes;

#[derive(Debug)]
struct Window {
    requests: u32,
    started: Instant,
}

/// Per-key request counters.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    trust_proxy_headers: bool,
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests,
            window: Duration::from_secs(config.window_secs),
            trust_proxy_headers: config.trust_proxy_headers,
            windows: DashMap::new(),
        }
    }

    /// Count a request against `key`. Returns `false` once the window's
    /// budget is spent.
    pub fn check(&self, key: &str) -> bool {
        let mut entry = self.windows.entry(key.to_owned()).or_insert_with(|| Window {
            requests: 0,
            started: Instant::now(),
        });
        if entry.started.elapsed() >= self.window {
            entry.requests = 0;
            entry.started = Instant::now();
        }
        if entry.requests >= self.max_requests {
            return false;
        }
        entry.requests += 1;
        true
    }

    /// Drop windows that have fully elapsed.
    pub fn prune(&self) {
        self.windows.retain(|_, w| w.started.elapsed() < self.window);
    }
}

/// Client address. The socket peer, unless proxy headers are trusted, in
/// which case `x-real-ip` and then the first `x-forwarded-for` hop win.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy_headers: bool) -> String {
    let peer_ip = || peer.map(|addr| addr.ip().to_string());
    if !trust_proxy_headers {
        return peer_ip().unwrap_or_else(|| "unknown".into());
    }
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
    };
    header("x-real-ip")
        .or_else(|| header("x-forwarded-for"))
        .or_else(peer_ip)
        .unwrap_or_else(|| "unknown".into())
}

pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(path) = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
    else {
        return Ok(next.run(request).await);
    };
    if !routes::lookup(request.method(), &path).rate_limited {
        return Ok(next.run(request).await);
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0);
    let ip = client_ip(
        request.headers(),
        peer,
        state.rate_limiter.trust_proxy_headers,
    );
    if !state.rate_limiter.check(&format!("{ip} {path}")) {
        warn!(%ip, %path, "rate limit exceeded");
        return Err(AppError::TooManyRequests);
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn limiter(max_requests: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            max_requests,
            window_secs,
            trust_proxy_headers: false,
        })
    }

    #[test]
    fn budget_is_per_key() {
        let limiter = limiter(2, 60);
        assert!(limiter.check("a"));
        assert!(limiter.check("a"));
        assert!(!limiter.check("a"));
        assert!(limiter.check("b"));
    }

    #[test]
    fn window_resets_after_elapsing() {
        let limiter = limiter(1, 0);
        assert!(limiter.check("a"));
        // A zero-length window has always elapsed.
        assert!(limiter.check("a"));
    }

    #[test]
    fn prune_drops_elapsed_windows() {
        let limiter = limiter(1, 0);
        limiter.check("a");
        limiter.prune();
        assert!(limiter.windows.is_empty());
    }

    #[test]
    fn client_ip_ignores_proxy_headers_by_default() {
        let peer: SocketAddr = "10.0.0.9:4000".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("3.3.3.3"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("1.1.1.1"));
        assert_eq!(client_ip(&headers, Some(peer), false), "10.0.0.9");
        assert_eq!(client_ip(&headers, None, false), "unknown");
    }

    #[test]
    fn trusted_proxy_headers_take_precedence() {
        let peer: SocketAddr = "10.0.0.9:4000".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, Some(peer), true), "10.0.0.9");
        assert_eq!(client_ip(&headers, None, true), "unknown");

        headers.insert("x-forwarded-for", HeaderValue::from_static("1.1.1.1, 2.2.2.2"));
        assert_eq!(client_ip(&headers, Some(peer), true), "1.1.1.1");

        headers.insert("x-real-ip", HeaderValue::from_static("3.3.3.3"));
        assert_eq!(client_ip(&headers, Some(peer), true), "3.3.3.3");
    }
}

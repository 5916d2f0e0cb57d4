//! Shared harness: router over an in-memory store, request helpers.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE, USER_AGENT};
use axum::http::request::Builder;
use axum::http::{HeaderMap, Request, StatusCode};
use axum_extra::extract::cookie::Cookie;
use kart_api::AppState;
use kart_api::config::{ApiConfig, AuthConfig, RateLimitConfig};
use kart_core::auth::AuthError;
use kart_core::auth::action_tokens::{ActionTokenKind, TokenMailer};
use kart_core::auth::memory::MemoryStore;
use kart_core::auth::store::SharedStore;
use kart_core::models::auth::UserRecord;
use serde_json::{Value, json};
use tower::ServiceExt;

pub const UA: &str = "kart-tests/1.0";
pub const PASSWORD: &str = "correct-horse";

/// Captures delivered action tokens.
#[derive(Default)]
pub struct Outbox {
    sent: Mutex<Vec<(String, ActionTokenKind, String)>>,
}

impl Outbox {
    pub fn last_token(&self, email: &str, kind: ActionTokenKind) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(to, k, _)| to == email && *k == kind)
            .map(|(_, _, token)| token.clone())
    }
}

#[async_trait]
impl TokenMailer for Outbox {
    async fn deliver(
        &self,
        user: &UserRecord,
        kind: ActionTokenKind,
        token: &str,
    ) -> Result<(), AuthError> {
        self.sent
            .lock()
            .unwrap()
            .push((user.email.clone(), kind, token.to_string()));
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub outbox: Arc<Outbox>,
}

pub fn test_config() -> ApiConfig {
    let mut auth = AuthConfig::new("test-access-secret", "test-refresh-secret", "test-csrf-secret");
    auth.secure_cookies = false;
    ApiConfig {
        bind_addr: "127.0.0.1:0".into(),
        database_url: String::new(),
        auth,
        rate_limit: RateLimitConfig {
            max_requests: 1000,
            window_secs: 60,
            trust_proxy_headers: false,
        },
    }
}

pub fn app() -> TestApp {
    app_with(test_config())
}

pub fn app_with(config: ApiConfig) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let outbox = Arc::new(Outbox::default());
    let shared: SharedStore = store.clone();
    let state = AppState::new(shared, config, outbox.clone());
    TestApp {
        router: kart_api::router(state),
        store,
        outbox,
    }
}

pub fn req(method: &str, uri: &str) -> Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(USER_AGENT, UA)
}

pub fn bearer(builder: Builder, access_token: &str) -> Builder {
    builder.header(AUTHORIZATION, format!("Bearer {access_token}"))
}

pub fn with_cookie(builder: Builder, name: &str, value: &str) -> Builder {
    builder.header(COOKIE, format!("{name}={value}"))
}

pub fn json_body(builder: Builder, body: Value) -> Request<Body> {
    builder
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn empty(builder: Builder) -> Request<Body> {
    builder.body(Body::empty()).unwrap()
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub json: Value,
}

impl TestResponse {
    pub fn set_cookies(&self) -> Vec<Cookie<'static>> {
        self.headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| Cookie::parse(v.to_str().unwrap().to_owned()).unwrap())
            .collect()
    }

    pub fn cookie(&self, name: &str) -> Option<Cookie<'static>> {
        self.set_cookies().into_iter().find(|c| c.name() == name)
    }
}

pub async fn send(app: &TestApp, request: Request<Body>) -> TestResponse {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    TestResponse {
        status,
        headers,
        json,
    }
}

/// Register `username` with the shared test password; returns the new id.
pub async fn register(app: &TestApp, username: &str) -> i64 {
    let res = send(
        app,
        json_body(
            req("POST", "/auth/register"),
            json!({
                "username": username,
                "email": format!("{username}@example.com"),
                "password": PASSWORD,
            }),
        ),
    )
    .await;
    assert_eq!(res.status, StatusCode::CREATED, "register {username}: {}", res.json);
    res.json["id"].as_i64().unwrap()
}

pub struct LoggedIn {
    pub access_token: String,
    pub refresh_token: String,
    pub csrf_token: String,
    pub response: TestResponse,
}

pub async fn login(app: &TestApp, username: &str, password: &str) -> LoggedIn {
    let res = send(
        app,
        json_body(
            req("POST", "/auth/login"),
            json!({ "username": username, "password": password }),
        ),
    )
    .await;
    assert_eq!(res.status, StatusCode::OK, "login {username}: {}", res.json);
    LoggedIn {
        access_token: res.json["accessToken"].as_str().unwrap().to_string(),
        refresh_token: res.json["refreshToken"].as_str().unwrap().to_string(),
        csrf_token: res.json["csrfToken"].as_str().unwrap().to_string(),
        response: res,
    }
}

//! # kart_api
//!
//! HTTP API library for the Kart auth core.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderName, HeaderValue, Method, header};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use kart_core::auth::action_tokens::{ActionTokens, TokenMailer};
use kart_core::auth::csrf::{CSRF_HEADER, CsrfGuard};
use kart_core::auth::jwt::TokenIssuer;
use kart_core::auth::session::SessionAuthenticator;
use kart_core::auth::store::SharedStore;
use sqlx::PgPool;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::handlers::{auth, health, users};
use crate::middleware::rate_limit::RateLimiter;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub config: ApiConfig,
    pub auth: SessionAuthenticator,
    pub csrf: CsrfGuard,
    pub action_tokens: ActionTokens,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Wire the core services around a store and an immutable config.
    pub fn new(store: SharedStore, config: ApiConfig, mailer: Arc<dyn TokenMailer>) -> Self {
        let issuer = TokenIssuer::new(&config.auth.tokens);
        Self {
            auth: SessionAuthenticator::new(store.clone(), issuer),
            csrf: CsrfGuard::new(&config.auth.csrf_secret),
            action_tokens: ActionTokens::new(store.clone(), mailer),
            rate_limiter: Arc::new(RateLimiter::new(config.rate_limit)),
            store,
            config,
        }
    }
}

/// Run embedded database migrations.
///
/// Delegates to `kart_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    kart_core::migrate::migrate(pool).await
}

fn cors_layer(config: &ApiConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .auth
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    let csrf_header = HeaderName::from_static(CSRF_HEADER);

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, csrf_header.clone()])
        .expose_headers([csrf_header])
}

/// Builds the Axum router with all routes and shared state.
///
/// Route layers run outermost-last: rate limit, then CSRF, then identity.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(routes::GET_API_HEALTH, get(health::health_handler))
        .route(routes::POST_AUTH_LOGIN, post(auth::login_handler))
        .route(routes::POST_AUTH_REGISTER, post(auth::register_handler))
        .route(routes::POST_AUTH_REFRESH, post(auth::refresh_handler))
        .route(routes::POST_AUTH_LOGOUT, post(auth::logout_handler))
        .route(routes::GET_AUTH_PROFILE, get(auth::profile_handler))
        .route(
            routes::POST_AUTH_FORGOT_PASSWORD,
            post(auth::forgot_password_handler),
        )
        .route(
            routes::POST_AUTH_RESET_PASSWORD,
            post(auth::reset_password_handler),
        )
        .route(
            routes::POST_AUTH_VERIFY_EMAIL_REQUEST,
            post(auth::request_verification_handler),
        )
        .route(
            routes::POST_AUTH_VERIFY_EMAIL,
            post(auth::verify_email_handler),
        )
        .route(routes::USERS, get(users::list_users_handler))
        .route(
            routes::USER_BY_ID,
            get(users::get_user_handler).delete(users::delete_user_handler),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::auth::require_identity,
        ))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::csrf::csrf_protect,
        ))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config))
        .with_state(state)
}

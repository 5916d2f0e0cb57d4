//! Kart auth API server binary.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use kart_api::config::ApiConfig;
use kart_core::auth::action_tokens::LogMailer;
use kart_core::auth::memory::MemoryStore;
use kart_core::auth::queries::PgStore;
use kart_core::auth::store::SharedStore;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

/// CLI arguments. Flags override the matching environment configuration.
#[derive(Parser, Debug)]
#[command(name = "kart_api_server", about = "Kart auth API server")]
struct Args {
    /// Port to listen on; keeps the host from `BIND_ADDR`.
    #[arg(long)]
    port: Option<u16>,

    /// PostgreSQL connection URL.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,

    /// Keep users in process memory instead of PostgreSQL. Development only.
    #[arg(long, default_value_t = false)]
    memory_store: bool,
}

fn override_port(bind_addr: &str, port: u16) -> String {
    match bind_addr.rsplit_once(':') {
        Some((host, _)) => format!("{host}:{port}"),
        None => format!("{bind_addr}:{port}"),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,kart_api=debug,kart_core=debug".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = ApiConfig::from_env();
    if let Some(port) = args.port {
        config.bind_addr = override_port(&config.bind_addr, port);
    }
    if let Some(url) = args.database_url {
        config.database_url = url;
    }

    let store: SharedStore = if args.memory_store {
        warn!("using in-memory store; all users are lost on exit");
        Arc::new(MemoryStore::new())
    } else {
        info!(max_connections = args.max_connections, "configuring connection pool");
        let pool = PgPoolOptions::new()
            .max_connections(args.max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&config.database_url)
            .await?;

        info!("running database migrations");
        kart_api::migrate(&pool).await?;
        Arc::new(PgStore::new(pool))
    };

    if config.auth.allowed_origins.is_empty() {
        info!("no CORS origins configured; cross-origin requests are refused");
    }

    let state = kart_api::AppState::new(store, config.clone(), Arc::new(LogMailer));

    let limiter = state.rate_limiter.clone();
    let prune_every = Duration::from_secs(config.rate_limit.window_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(prune_every);
        loop {
            ticker.tick().await;
            limiter.prune();
        }
    });

    let app = kart_api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, secure_cookies = config.auth.secure_cookies, "REST API listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("server stopped");
    Ok(())
}

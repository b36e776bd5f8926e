// =============================================================================
// Trade Review Backend — Main Entry Point
// =============================================================================
//
// Read-only adapter between backtest artifacts on disk and the charting
// frontend. Serves canonical bars, indicator series and flag-annotated
// trades over plain GET endpoints; never writes anything back.

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod engine;
mod runtime_config;
mod source;
mod types;

use std::net::SocketAddr;

use anyhow::Context;
use axum::http::{header, HeaderValue, Method};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::runtime_config::RuntimeConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("trade_review_backend=debug,tower_http=debug,axum=debug")
        }))
        .init();

    let config_path =
        std::env::var("TRADE_REVIEW_CONFIG").unwrap_or_else(|_| "trade_review.json".to_string());
    let mut config = RuntimeConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load config, using defaults");
        RuntimeConfig::default()
    });

    // Env overrides for the paths that differ between dev machines.
    if let Ok(dir) = std::env::var("TRADE_REVIEW_DATA_DIR") {
        config.data_dir = dir.into();
    }
    if let Ok(bind) = std::env::var("TRADE_REVIEW_BIND") {
        config.bind = bind;
    }

    info!(
        data_dir = %config.data_dir.display(),
        source_timezone = %config.source_timezone,
        collapse_mode = %config.collapse_mode,
        "configuration resolved"
    );

    // ── 2. Shared state & router ─────────────────────────────────────────
    let cors_origin = HeaderValue::from_str(&config.cors_origin)
        .with_context(|| format!("invalid CORS origin '{}'", config.cors_origin))?;
    let cors = CorsLayer::new()
        .allow_origin(cors_origin)
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(false)
        .expose_headers(Any);

    let bind = config.bind.clone();
    let state = AppState::new(config);
    let app = api::rest::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // ── 3. Serve ─────────────────────────────────────────────────────────
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address '{bind}'"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("backend listening on http://{addr}");

    axum::serve(listener, app)
        .await
        .context("backend server exited")?;

    Ok(())
}

//! webhook-daemon entry point.
//!
//! This file is intentionally thin: it loads settings, connects the pool,
//! spawns the worker poll loop and stale reaper, and starts the HTTP server.
//! All route handlers live in `routes.rs`; all shared state lives in
//! `state.rs`.

use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};
use webhook_daemon::{routes, state};
use webhook_downstream::HttpDownstream;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let settings = webhook_config::load().context("failed to load settings")?;

    let pool = webhook_store::connect(&settings.database_url)
        .await
        .context("failed to connect to database")?;
    webhook_store::migrate(&pool).await.context("migration failed")?;

    let downstream = HttpDownstream::new(settings.downstream_url.clone());
    tokio::spawn(webhook_worker::run_poll_loop(
        pool.clone(),
        downstream,
        settings.worker.clone(),
    ));
    tokio::spawn(webhook_worker::run_reaper(
        pool.clone(),
        settings.worker.stale_processing_threshold,
    ));

    let shared = Arc::new(state::AppState::new(pool));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    info!("webhook-daemon listening on http://{}", settings.daemon_addr);

    axum::serve(
        tokio::net::TcpListener::bind(settings.daemon_addr).await?,
        app,
    )
    .await
    .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// CORS: allow only localhost origins (dashboard dev servers).
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}

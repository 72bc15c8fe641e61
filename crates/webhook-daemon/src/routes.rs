//! Axum router and all HTTP handlers for webhook-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. All handlers are `pub(crate)` so the scenario tests in
//! `tests/` can compose the router directly.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::{info, warn};
use webhook_schemas::{IngestOutcome, WebhookRecord};

use crate::{
    api_types::{ErrorResponse, HealthResponse, WebhookRequest, WebhookResponse},
    state::AppState,
};

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/webhook", post(webhook))
        .route("/api/events", get(list_events))
        .route("/api/audit", get(list_audit))
        .route("/api/processing", get(list_processing))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /webhook — the single ingest entrypoint
// ---------------------------------------------------------------------------

pub(crate) async fn webhook(
    State(st): State<Arc<AppState>>,
    Json(body): Json<WebhookRequest>,
) -> Response {
    let record = WebhookRecord {
        event_id: body.event_id.clone(),
        event_type: body.event_type,
        occurred_at: body.occurred_at,
        payload: body.payload,
    };

    match webhook_ingestor::ingest(&st.pool, record).await {
        Ok(outcome) => {
            let (status, message) = match outcome {
                IngestOutcome::Accepted => ("accepted", "event accepted"),
                IngestOutcome::Deduplicated => ("deduplicated", "duplicate delivery ignored"),
                IngestOutcome::Conflict => {
                    ("conflict", "event_id already exists with a different payload")
                }
            };
            info!(event_id = %body.event_id, status, "webhook processed");
            (
                StatusCode::OK,
                Json(WebhookResponse {
                    status,
                    message: message.to_string(),
                    event_id: body.event_id,
                }),
            )
                .into_response()
        }
        Err(err) => {
            warn!(event_id = %body.event_id, error = %err, "ingest failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: err.to_string(),
                }),
            )
                .into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// Read-only dashboard API — convenience views, not core contract
// ---------------------------------------------------------------------------

pub(crate) async fn list_events(State(st): State<Arc<AppState>>) -> Response {
    match webhook_store::list_recent_events(&st.pool, 50).await {
        Ok(events) => Json(events).into_response(),
        Err(err) => storage_error(err),
    }
}

pub(crate) async fn list_audit(State(st): State<Arc<AppState>>) -> Response {
    match webhook_store::list_recent_audit(&st.pool, 100).await {
        Ok(entries) => Json(entries).into_response(),
        Err(err) => storage_error(err),
    }
}

pub(crate) async fn list_processing(State(st): State<Arc<AppState>>) -> Response {
    match webhook_store::list_recent_processing(&st.pool, 50).await {
        Ok(states) => Json(states).into_response(),
        Err(err) => storage_error(err),
    }
}

fn storage_error(err: anyhow::Error) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

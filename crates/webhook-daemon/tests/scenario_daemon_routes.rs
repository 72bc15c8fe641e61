//! In-process scenario tests for webhook-daemon HTTP endpoints.
//!
//! These tests spin up the Axum router **without** binding a TCP socket.
//! Each test calls `routes::build_router` and drives it via
//! `tower::ServiceExt::oneshot` — no network I/O beyond the database.

use std::sync::Arc;

use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::json;
use sqlx::PgPool;
use tower::ServiceExt; // oneshot
use webhook_daemon::{routes, state};

async fn pool() -> Option<PgPool> {
    webhook_testkit::db_pool().await
}

fn make_router(pool: PgPool) -> axum::Router {
    let st = Arc::new(state::AppState::new(pool));
    routes::build_router(st)
}

async fn call(router: axum::Router, req: Request<axum::body::Body>) -> (StatusCode, bytes::Bytes) {
    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    (status, body)
}

fn parse_json(b: bytes::Bytes) -> serde_json::Value {
    serde_json::from_slice(&b).expect("body is not valid JSON")
}

fn webhook_request(event_id: &str, payload: serde_json::Value) -> Request<axum::body::Body> {
    let body = json!({
        "event_id": event_id,
        "event_type": "order.created",
        "occurred_at": "2026-01-01T00:00:00Z",
        "payload": payload,
    });
    Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
#[ignore = "requires WEBHOOK_DATABASE_URL; run: WEBHOOK_DATABASE_URL=postgres://... cargo test -p webhook-daemon -- --ignored"]
async fn health_returns_200_ok_true() {
    let Some(pool) = pool().await else {
        panic!("DB tests require WEBHOOK_DATABASE_URL");
    };
    let req = Request::builder()
        .method("GET")
        .uri("/v1/health")
        .body(axum::body::Body::empty())
        .unwrap();

    let (status, body) = call(make_router(pool), req).await;
    assert_eq!(status, StatusCode::OK);

    let json = parse_json(body);
    assert_eq!(json["ok"], true);
    assert_eq!(json["service"], "webhook-daemon");
}

#[tokio::test]
#[ignore = "requires WEBHOOK_DATABASE_URL; run: WEBHOOK_DATABASE_URL=postgres://... cargo test -p webhook-daemon -- --ignored"]
async fn webhook_first_post_is_accepted_second_is_deduplicated() {
    let Some(pool) = pool().await else {
        panic!("DB tests require WEBHOOK_DATABASE_URL");
    };
    let id = format!("d1-{}", std::process::id());

    let (status, body) = call(
        make_router(pool.clone()),
        webhook_request(&id, json!({"amount": 100})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["status"], "accepted");
    assert_eq!(json["event_id"], id);

    let (status, body) = call(
        make_router(pool.clone()),
        webhook_request(&id, json!({"amount": 100})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse_json(body)["status"], "deduplicated");
}

#[tokio::test]
#[ignore = "requires WEBHOOK_DATABASE_URL; run: WEBHOOK_DATABASE_URL=postgres://... cargo test -p webhook-daemon -- --ignored"]
async fn webhook_conflicting_payload_returns_conflict() {
    let Some(pool) = pool().await else {
        panic!("DB tests require WEBHOOK_DATABASE_URL");
    };
    let id = format!("d2-{}", std::process::id());

    let (_, _) = call(
        make_router(pool.clone()),
        webhook_request(&id, json!({"amount": 100})),
    )
    .await;

    let (status, body) = call(
        make_router(pool.clone()),
        webhook_request(&id, json!({"amount": 200})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse_json(body)["status"], "conflict");
}

#[tokio::test]
#[ignore = "requires WEBHOOK_DATABASE_URL; run: WEBHOOK_DATABASE_URL=postgres://... cargo test -p webhook-daemon -- --ignored"]
async fn dashboard_views_return_200() {
    let Some(pool) = pool().await else {
        panic!("DB tests require WEBHOOK_DATABASE_URL");
    };
    let id = format!("d3-{}", std::process::id());
    let _ = call(
        make_router(pool.clone()),
        webhook_request(&id, json!({"amount": 1})),
    )
    .await;

    for uri in ["/api/events", "/api/audit", "/api/processing"] {
        let req = Request::builder()
            .method("GET")
            .uri(uri)
            .body(axum::body::Body::empty())
            .unwrap();
        let (status, body) = call(make_router(pool.clone()), req).await;
        assert_eq!(status, StatusCode::OK, "{uri} should return 200");
        let json = parse_json(body);
        assert!(json.is_array(), "{uri} should return a JSON array");
    }
}

#[tokio::test]
#[ignore = "requires WEBHOOK_DATABASE_URL; run: WEBHOOK_DATABASE_URL=postgres://... cargo test -p webhook-daemon -- --ignored"]
async fn unknown_route_returns_404() {
    let Some(pool) = pool().await else {
        panic!("DB tests require WEBHOOK_DATABASE_URL");
    };
    let req = Request::builder()
        .method("GET")
        .uri("/does_not_exist")
        .body(axum::body::Body::empty())
        .unwrap();

    let (status, _) = call(make_router(pool), req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

//! Scenario: ingest resolves repeats to {accepted, deduplicated, conflict}.
//!
//! All tests skip gracefully when `WEBHOOK_DATABASE_URL` is not set.

use anyhow::Result;
use serde_json::json;
use webhook_ingestor::ingest;
use webhook_schemas::IngestOutcome;

#[tokio::test]
#[ignore = "requires WEBHOOK_DATABASE_URL; run: WEBHOOK_DATABASE_URL=postgres://... cargo test -p webhook-ingestor -- --ignored"]
async fn s1_idempotent_flood() -> Result<()> {
    let Some(pool) = webhook_testkit::db_pool().await else {
        panic!("DB tests require WEBHOOK_DATABASE_URL");
    };
    let id = format!("e1-{}", std::process::id());

    let first = ingest(&pool, webhook_testkit::record(&id, json!({"a": 1}))).await?;
    assert_eq!(first, IngestOutcome::Accepted);

    for _ in 0..9 {
        let outcome = ingest(&pool, webhook_testkit::record(&id, json!({"a": 1}))).await?;
        assert_eq!(outcome, IngestOutcome::Deduplicated);
    }

    let events = webhook_store::list_recent_events(&pool, 1000).await?;
    assert_eq!(events.iter().filter(|e| e.event_id == id).count(), 1);

    Ok(())
}

#[tokio::test]
#[ignore = "requires WEBHOOK_DATABASE_URL; run: WEBHOOK_DATABASE_URL=postgres://... cargo test -p webhook-ingestor -- --ignored"]
async fn s2_payload_conflict() -> Result<()> {
    let Some(pool) = webhook_testkit::db_pool().await else {
        panic!("DB tests require WEBHOOK_DATABASE_URL");
    };
    let id = format!("e2-{}", std::process::id());

    let first = ingest(&pool, webhook_testkit::record(&id, json!({"v": 1}))).await?;
    assert_eq!(first, IngestOutcome::Accepted);

    let second = ingest(&pool, webhook_testkit::record(&id, json!({"v": 2}))).await?;
    assert_eq!(second, IngestOutcome::Conflict);

    let stored = webhook_store::fetch_event(&pool, &id).await?.unwrap();
    assert_eq!(
        stored.payload_hash,
        webhook_hasher::hash(&json!({"v": 1})).to_vec()
    );

    Ok(())
}

#[tokio::test]
#[ignore = "requires WEBHOOK_DATABASE_URL; run: WEBHOOK_DATABASE_URL=postgres://... cargo test -p webhook-ingestor -- --ignored"]
async fn s5_key_order_equivalence() -> Result<()> {
    let Some(pool) = webhook_testkit::db_pool().await else {
        panic!("DB tests require WEBHOOK_DATABASE_URL");
    };
    let id = format!("e4-{}", std::process::id());

    ingest(&pool, webhook_testkit::record(&id, json!({"a": 1, "b": 2}))).await?;
    let second = ingest(&pool, webhook_testkit::record(&id, json!({"b": 2, "a": 1}))).await?;
    assert_eq!(second, IngestOutcome::Deduplicated);

    Ok(())
}

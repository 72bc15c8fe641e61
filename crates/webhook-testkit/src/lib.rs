//! Shared scenario-test building blocks: a DB pool bootstrap gated on
//! `WEBHOOK_DATABASE_URL`, record builders, and scripted `Downstream` doubles.
//! Other crates' `tests/` directories depend on this rather than
//! reimplementing the same fixtures.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use sqlx::PgPool;
use webhook_downstream::{DeliveryOutcome, Downstream};
use webhook_schemas::WebhookRecord;

/// Connect using `WEBHOOK_DATABASE_URL` and apply migrations, or `None` if
/// the env var is unset. Scenario tests that need Postgres should early-out
/// (with a panic explaining the required env var) when this returns `None`.
pub async fn db_pool() -> Option<PgPool> {
    let url = std::env::var(webhook_store::ENV_DB_URL).ok()?;
    let pool = webhook_store::connect(&url).await.ok()?;
    webhook_store::migrate(&pool).await.ok()?;
    Some(pool)
}

/// Build a `WebhookRecord` with the given id and payload; other fields are
/// filled with deterministic test defaults.
pub fn record(event_id: &str, payload: Value) -> WebhookRecord {
    WebhookRecord {
        event_id: event_id.to_string(),
        event_type: "test.event".to_string(),
        occurred_at: Utc::now(),
        payload,
    }
}

/// Insert `record` directly via the Store, bypassing the Ingestor's audit
/// trail. Used to seed `processing_state` rows for Worker-focused tests.
pub async fn seed_pending(pool: &PgPool, record: WebhookRecord) {
    let payload_hash = webhook_hasher::hash(&record.payload).to_vec();
    let new_event = webhook_store::NewEvent {
        event_id: record.event_id,
        event_type: record.event_type,
        occurred_at: record.occurred_at,
        payload: record.payload,
        payload_hash,
    };
    webhook_store::insert_if_absent(pool, &new_event)
        .await
        .expect("seed_pending insert failed");
}

/// A scripted `Downstream`: fails the first `fail_count` deliveries, then
/// always succeeds. Clone-shared counter so multiple concurrent callers
/// observe the same script.
#[derive(Clone)]
pub struct ScriptedDownstream {
    attempts: Arc<AtomicUsize>,
    fail_count: usize,
}

impl ScriptedDownstream {
    pub fn new(fail_count: usize) -> Self {
        Self {
            attempts: Arc::new(AtomicUsize::new(0)),
            fail_count,
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Downstream for ScriptedDownstream {
    async fn deliver(&self, _event_id: &str, _timeout: Duration) -> DeliveryOutcome {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_count {
            DeliveryOutcome::TransientFailure {
                reason: "scripted failure".to_string(),
            }
        } else {
            DeliveryOutcome::Ok
        }
    }
}

/// A `Downstream` that always fails.
pub struct AlwaysFails;

impl Downstream for AlwaysFails {
    async fn deliver(&self, _event_id: &str, _timeout: Duration) -> DeliveryOutcome {
        DeliveryOutcome::TransientFailure {
            reason: "always fails".to_string(),
        }
    }
}

/// A `Downstream` that always succeeds, counting how many times it was
/// invoked — useful for asserting mutual exclusion under concurrency.
#[derive(Clone)]
pub struct CountingSuccess {
    calls: Arc<AtomicUsize>,
    delay: Duration,
}

impl CountingSuccess {
    pub fn new(delay: Duration) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            delay,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Downstream for CountingSuccess {
    async fn deliver(&self, _event_id: &str, _timeout: Duration) -> DeliveryOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        DeliveryOutcome::Ok
    }
}

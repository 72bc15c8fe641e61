//! Accepts a validated webhook record, resolves idempotency, and hands the
//! event off to the Worker (advisory — the polling loop is authoritative).

use anyhow::{Context, Result};
use sqlx::PgPool;
use webhook_schemas::{AuditAction, AuditOutcome, IngestOutcome, WebhookRecord};
use webhook_store::{InsertOutcome, NewEvent};

/// Resolve one inbound webhook to `{accepted | deduplicated | conflict}`,
/// writing an audit row for every branch along the way.
pub async fn ingest(pool: &PgPool, record: WebhookRecord) -> Result<IngestOutcome> {
    webhook_audit::record(
        pool,
        &record.event_id,
        AuditAction::EventReceived,
        AuditOutcome::Pending,
        Some(format!("type: {}", record.event_type)),
    )
    .await;

    let payload_hash = webhook_hasher::hash(&record.payload).to_vec();

    let new_event = NewEvent {
        event_id: record.event_id.clone(),
        event_type: record.event_type.clone(),
        occurred_at: record.occurred_at,
        payload: record.payload.clone(),
        payload_hash: payload_hash.clone(),
    };

    let outcome = webhook_store::insert_if_absent(pool, &new_event)
        .await
        .with_context(|| format!("insert_if_absent failed for event_id={}", record.event_id))?;

    match outcome {
        InsertOutcome::Inserted => {
            webhook_audit::record(
                pool,
                &record.event_id,
                AuditAction::EventInserted,
                AuditOutcome::Success,
                Some("event stored in database".to_string()),
            )
            .await;
            tracing::info!(event_id = %record.event_id, "webhook accepted");
            Ok(IngestOutcome::Accepted)
        }
        InsertOutcome::Exists(existing) => {
            if existing.payload_hash == payload_hash {
                webhook_audit::record(
                    pool,
                    &record.event_id,
                    AuditAction::EventDeduped,
                    AuditOutcome::Success,
                    Some("duplicate ignored".to_string()),
                )
                .await;
                tracing::info!(event_id = %record.event_id, "webhook deduplicated");
                Ok(IngestOutcome::Deduplicated)
            } else {
                let msg = format!(
                    "event {} already exists with a different payload",
                    record.event_id
                );
                webhook_audit::record(
                    pool,
                    &record.event_id,
                    AuditAction::ConflictDetected,
                    AuditOutcome::Failure,
                    Some(msg.clone()),
                )
                .await;
                tracing::warn!(event_id = %record.event_id, "{msg}");
                Ok(IngestOutcome::Conflict)
            }
        }
    }
}


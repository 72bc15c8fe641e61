//! Transactional persistence for the webhook ingestion spine.
//!
//! Three tables — `events`, `processing_state`, `audit_log` — as described in
//! the data model. The Store owns all rows; every other crate reaches them
//! only through the functions here.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Row, Transaction};
use webhook_schemas::{AuditAction, AuditEntry, AuditOutcome, Event, ProcessingState, ProcessingStatus};

pub const ENV_DB_URL: &str = "WEBHOOK_DATABASE_URL";

/// Connect to Postgres using `WEBHOOK_DATABASE_URL`.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")
}

/// Test helper: connect using `WEBHOOK_DATABASE_URL` and ensure migrations
/// are applied.
pub async fn testkit_db_pool() -> Result<PgPool> {
    let pool = connect_from_env().await?;
    migrate(&pool).await?;
    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Event insertion — idempotency resolution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub event_id: String,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub payload: Value,
    pub payload_hash: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum InsertOutcome {
    Inserted,
    Exists(Event),
}

/// Attempt to insert both the Event and its ProcessingState atomically.
///
/// On a unique-constraint collision on `event_id` the insert loses the race
/// and the existing Event is fetched (for hash comparison by the caller).
/// Exactly one concurrent caller for a given `event_id` observes `Inserted`.
pub async fn insert_if_absent(pool: &PgPool, new_event: &NewEvent) -> Result<InsertOutcome> {
    let mut tx = pool.begin().await.context("begin insert_if_absent tx")?;

    let inserted: Option<(String,)> = sqlx::query_as(
        r#"
        insert into events (event_id, event_type, occurred_at, payload, payload_hash)
        values ($1, $2, $3, $4, $5)
        on conflict (event_id) do nothing
        returning event_id
        "#,
    )
    .bind(&new_event.event_id)
    .bind(&new_event.event_type)
    .bind(new_event.occurred_at)
    .bind(&new_event.payload)
    .bind(&new_event.payload_hash)
    .fetch_optional(&mut *tx)
    .await
    .context("insert event failed")?;

    if inserted.is_none() {
        tx.rollback().await.context("rollback after event race")?;
        let existing = fetch_event(pool, &new_event.event_id)
            .await?
            .ok_or_else(|| {
                anyhow::anyhow!("event {} vanished after insert race", new_event.event_id)
            })?;
        return Ok(InsertOutcome::Exists(existing));
    }

    sqlx::query(
        r#"
        insert into processing_state (event_id, status, attempt_count)
        values ($1, 'pending', 0)
        "#,
    )
    .bind(&new_event.event_id)
    .execute(&mut *tx)
    .await
    .context("insert processing_state failed")?;

    tx.commit().await.context("commit insert_if_absent tx")?;
    Ok(InsertOutcome::Inserted)
}

pub async fn fetch_event(pool: &PgPool, event_id: &str) -> Result<Option<Event>> {
    let row = sqlx::query(
        r#"
        select event_id, event_type, occurred_at, payload, payload_hash, created_at
        from events
        where event_id = $1
        "#,
    )
    .bind(event_id)
    .fetch_optional(pool)
    .await
    .context("fetch_event failed")?;

    let Some(row) = row else { return Ok(None) };
    Ok(Some(row_to_event(row)?))
}

fn row_to_event(row: sqlx::postgres::PgRow) -> Result<Event> {
    Ok(Event {
        event_id: row.try_get("event_id")?,
        event_type: row.try_get("event_type")?,
        occurred_at: row.try_get("occurred_at")?,
        payload: row.try_get("payload")?,
        payload_hash: row.try_get("payload_hash")?,
        created_at: row.try_get("created_at")?,
    })
}

// ---------------------------------------------------------------------------
// Claim / lock primitives — mutual exclusion between concurrent workers
// ---------------------------------------------------------------------------

/// Advisory, non-locking discovery of events eligible for a processing
/// attempt: `status = 'pending'` and `not_before` (if set) already elapsed.
pub async fn claim_pending(pool: &PgPool, limit: i64) -> Result<Vec<String>> {
    let rows = sqlx::query(
        r#"
        select event_id
        from processing_state
        where status = 'pending'
          and (not_before is null or not_before <= now())
        order by event_id
        limit $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("claim_pending failed")?;

    rows.into_iter()
        .map(|r| r.try_get::<String, _>("event_id").map_err(Into::into))
        .collect()
}

/// Acquire an exclusive row lock on `processing_state` for `event_id`, but
/// only if its status is `pending` or `failed`. Returns `None` otherwise
/// (another worker owns it, or it is already terminal). The lock is held
/// until `tx` commits or aborts.
pub async fn lock_for_attempt(
    tx: &mut Transaction<'_, Postgres>,
    event_id: &str,
) -> Result<Option<ProcessingState>> {
    let row = sqlx::query(
        r#"
        select event_id, status, attempt_count, last_attempt_at, completed_at,
               error_message, not_before, created_at, updated_at
        from processing_state
        where event_id = $1
          and status in ('pending', 'failed')
        for update
        "#,
    )
    .bind(event_id)
    .fetch_optional(&mut **tx)
    .await
    .context("lock_for_attempt failed")?;

    let Some(row) = row else { return Ok(None) };
    Ok(Some(row_to_state(row)?))
}

fn row_to_state(row: sqlx::postgres::PgRow) -> Result<ProcessingState> {
    Ok(ProcessingState {
        event_id: row.try_get("event_id")?,
        status: ProcessingStatus::parse(&row.try_get::<String, _>("status")?)?,
        attempt_count: row.try_get("attempt_count")?,
        last_attempt_at: row.try_get("last_attempt_at")?,
        completed_at: row.try_get("completed_at")?,
        error_message: row.try_get("error_message")?,
        not_before: row.try_get("not_before")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// A full replacement of the mutable fields of a locked `processing_state`
/// row. The caller must hold the row lock (via `lock_for_attempt` on the
/// same transaction) before calling this.
#[derive(Debug, Clone)]
pub struct StatePatch {
    pub status: ProcessingStatus,
    pub attempt_count: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub not_before: Option<DateTime<Utc>>,
}

pub async fn update_state(
    tx: &mut Transaction<'_, Postgres>,
    event_id: &str,
    patch: &StatePatch,
) -> Result<()> {
    sqlx::query(
        r#"
        update processing_state
        set status          = $2,
            attempt_count    = $3,
            last_attempt_at  = $4,
            completed_at     = $5,
            error_message    = $6,
            not_before       = $7,
            updated_at       = now()
        where event_id = $1
        "#,
    )
    .bind(event_id)
    .bind(patch.status.as_str())
    .bind(patch.attempt_count)
    .bind(patch.last_attempt_at)
    .bind(patch.completed_at)
    .bind(&patch.error_message)
    .bind(patch.not_before)
    .execute(&mut **tx)
    .await
    .context("update_state failed")?;
    Ok(())
}

pub async fn fetch_processing_state(
    pool: &PgPool,
    event_id: &str,
) -> Result<Option<ProcessingState>> {
    let row = sqlx::query(
        r#"
        select event_id, status, attempt_count, last_attempt_at, completed_at,
               error_message, not_before, created_at, updated_at
        from processing_state
        where event_id = $1
        "#,
    )
    .bind(event_id)
    .fetch_optional(pool)
    .await
    .context("fetch_processing_state failed")?;

    let Some(row) = row else { return Ok(None) };
    Ok(Some(row_to_state(row)?))
}

// ---------------------------------------------------------------------------
// Stale-processing reaper — recovers claims abandoned by a crashed worker
// ---------------------------------------------------------------------------

/// Reset `processing` rows whose `last_attempt_at` is older than
/// `threshold_seconds` back to `pending`, so a crashed worker's claim is
/// eventually released. `attempt_count` is never decremented (it is
/// strictly monotonic across an event's lifetime). Writes a `ProcessingError`
/// audit row for each reaped event, so the decision log still accounts for
/// every transition even though no worker observed this one directly.
pub async fn reap_stale_processing(pool: &PgPool, threshold_seconds: i64) -> Result<u64> {
    let rows = sqlx::query(
        r#"
        update processing_state
        set status = 'pending',
            updated_at = now()
        where status = 'processing'
          and last_attempt_at < now() - make_interval(secs => $1)
        returning event_id
        "#,
    )
    .bind(threshold_seconds as f64)
    .fetch_all(pool)
    .await
    .context("reap_stale_processing failed")?;

    for row in &rows {
        let event_id: String = row.try_get("event_id")?;
        let entry = AuditEntry::new(
            event_id,
            AuditAction::ProcessingError,
            AuditOutcome::Failure,
            Some(format!(
                "reclaimed from processing after exceeding {threshold_seconds}s without a heartbeat"
            )),
        );
        append_audit(pool, &entry).await?;
    }

    Ok(rows.len() as u64)
}

// ---------------------------------------------------------------------------
// Audit log
// ---------------------------------------------------------------------------

/// Insert one audit row. Commits independently of any surrounding state
/// transaction: a later rollback still preserves the attempted decision.
pub async fn append_audit(pool: &PgPool, entry: &AuditEntry) -> Result<()> {
    sqlx::query(
        r#"
        insert into audit_log (timestamp, event_id, action, details, success)
        values ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(entry.timestamp)
    .bind(&entry.event_id)
    .bind(entry.action.as_str())
    .bind(&entry.details)
    .bind(entry.success.as_str())
    .execute(pool)
    .await
    .context("append_audit failed")?;
    Ok(())
}

pub async fn list_recent_audit(pool: &PgPool, limit: i64) -> Result<Vec<AuditEntry>> {
    let rows = sqlx::query(
        r#"
        select timestamp, event_id, action, details, success
        from audit_log
        order by timestamp desc
        limit $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("list_recent_audit failed")?;

    rows.into_iter()
        .map(|row| {
            let action_str: String = row.try_get("action")?;
            let success_str: String = row.try_get("success")?;
            Ok(AuditEntry {
                timestamp: row.try_get("timestamp")?,
                event_id: row.try_get("event_id")?,
                action: parse_action(&action_str)?,
                details: row.try_get("details")?,
                success: parse_outcome(&success_str)?,
            })
        })
        .collect()
}

fn parse_action(s: &str) -> Result<webhook_schemas::AuditAction> {
    use webhook_schemas::AuditAction::*;
    Ok(match s {
        "event_received" => EventReceived,
        "event_inserted" => EventInserted,
        "event_deduped" => EventDeduped,
        "conflict_detected" => ConflictDetected,
        "processing_attempt_started" => ProcessingAttemptStarted,
        "processing_succeeded" => ProcessingSucceeded,
        "processing_attempt_failed" => ProcessingAttemptFailed,
        "retry_scheduled" => RetryScheduled,
        "processing_abandoned" => ProcessingAbandoned,
        "processing_failed_permanently" => ProcessingFailedPermanently,
        "processing_error" => ProcessingError,
        other => anyhow::bail!("invalid audit action: {other}"),
    })
}

fn parse_outcome(s: &str) -> Result<AuditOutcome> {
    Ok(match s {
        "success" => AuditOutcome::Success,
        "failure" => AuditOutcome::Failure,
        "pending" => AuditOutcome::Pending,
        other => anyhow::bail!("invalid audit outcome: {other}"),
    })
}

// ---------------------------------------------------------------------------
// Dashboard read views (§6 "Read-only dashboard API")
// ---------------------------------------------------------------------------

pub async fn list_recent_events(pool: &PgPool, limit: i64) -> Result<Vec<Event>> {
    let rows = sqlx::query(
        r#"
        select event_id, event_type, occurred_at, payload, payload_hash, created_at
        from events
        order by created_at desc
        limit $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("list_recent_events failed")?;

    rows.into_iter().map(row_to_event).collect()
}

pub async fn list_recent_processing(pool: &PgPool, limit: i64) -> Result<Vec<ProcessingState>> {
    let rows = sqlx::query(
        r#"
        select event_id, status, attempt_count, last_attempt_at, completed_at,
               error_message, not_before, created_at, updated_at
        from processing_state
        order by updated_at desc
        limit $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("list_recent_processing failed")?;

    rows.into_iter().map(row_to_state).collect()
}

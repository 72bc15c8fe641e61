//! Polls `processing_state` for claimable events and drives each through the
//! five-step attempt procedure (lock, terminal check, mark processing,
//! deliver, commit outcome), generic over the downstream collaborator.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::Semaphore;
use webhook_downstream::{DeliveryOutcome, Downstream};
use webhook_retry::RetryConfig;
use webhook_schemas::{AuditAction, AuditOutcome, ProcessingStatus};
use webhook_store::StatePatch;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub poll_interval: Duration,
    pub concurrency: usize,
    pub downstream_timeout: Duration,
    pub stale_processing_threshold: Duration,
    pub retry: RetryConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            concurrency: 10,
            downstream_timeout: Duration::from_secs(10),
            stale_processing_threshold: Duration::from_secs(60),
            retry: RetryConfig::default(),
        }
    }
}

/// Run the five-step procedure for a single claimed `event_id`. A `None`
/// lock result (lost the race, or the row is no longer pending/failed) is
/// not an error — it means another worker already owns the attempt.
pub async fn process_event<D: Downstream>(
    pool: &PgPool,
    downstream: &D,
    event_id: &str,
    cfg: &WorkerConfig,
) -> Result<()> {
    let mut tx1 = pool.begin().await.context("begin attempt tx")?;
    let Some(state) = webhook_store::lock_for_attempt(&mut tx1, event_id).await? else {
        tx1.rollback().await.context("rollback no-op attempt tx")?;
        return Ok(());
    };

    if webhook_retry::is_terminal(state.attempt_count as u32, &cfg.retry) {
        webhook_store::update_state(
            &mut tx1,
            event_id,
            &StatePatch {
                status: ProcessingStatus::Failed,
                attempt_count: state.attempt_count,
                last_attempt_at: state.last_attempt_at,
                completed_at: None,
                error_message: Some("maximum retry attempts exceeded".to_string()),
                not_before: None,
            },
        )
        .await?;
        tx1.commit().await.context("commit abandon tx")?;
        webhook_audit::record(
            pool,
            event_id,
            AuditAction::ProcessingAbandoned,
            AuditOutcome::Failure,
            Some(format!("abandoned after {} attempts", state.attempt_count)),
        )
        .await;
        return Ok(());
    }

    let attempt_num = state.attempt_count + 1;
    let attempt_started_at = Utc::now();
    webhook_store::update_state(
        &mut tx1,
        event_id,
        &StatePatch {
            status: ProcessingStatus::Processing,
            attempt_count: attempt_num,
            last_attempt_at: Some(attempt_started_at),
            completed_at: None,
            error_message: None,
            not_before: None,
        },
    )
    .await?;
    tx1.commit().await.context("commit attempt-started tx")?;
    webhook_audit::record(
        pool,
        event_id,
        AuditAction::ProcessingAttemptStarted,
        AuditOutcome::Pending,
        Some(format!("attempt {attempt_num}")),
    )
    .await;

    let outcome = downstream.deliver(event_id, cfg.downstream_timeout).await;

    let mut tx2 = pool.begin().await.context("begin outcome tx")?;
    match outcome {
        DeliveryOutcome::Ok => {
            webhook_store::update_state(
                &mut tx2,
                event_id,
                &StatePatch {
                    status: ProcessingStatus::Completed,
                    attempt_count: attempt_num,
                    last_attempt_at: Some(attempt_started_at),
                    completed_at: Some(Utc::now()),
                    error_message: None,
                    not_before: None,
                },
            )
            .await?;
            tx2.commit().await.context("commit success tx")?;
            webhook_audit::record(
                pool,
                event_id,
                AuditAction::ProcessingSucceeded,
                AuditOutcome::Success,
                Some(format!("delivered on attempt {attempt_num}")),
            )
            .await;
        }
        DeliveryOutcome::TransientFailure { reason } => {
            webhook_audit::record(
                pool,
                event_id,
                AuditAction::ProcessingAttemptFailed,
                AuditOutcome::Failure,
                Some(reason.clone()),
            )
            .await;

            if webhook_retry::is_terminal(attempt_num as u32, &cfg.retry) {
                webhook_store::update_state(
                    &mut tx2,
                    event_id,
                    &StatePatch {
                        status: ProcessingStatus::Failed,
                        attempt_count: attempt_num,
                        last_attempt_at: Some(attempt_started_at),
                        completed_at: None,
                        error_message: Some(reason.clone()),
                        not_before: None,
                    },
                )
                .await?;
                tx2.commit().await.context("commit terminal-failure tx")?;
                webhook_audit::record(
                    pool,
                    event_id,
                    AuditAction::ProcessingFailedPermanently,
                    AuditOutcome::Failure,
                    Some(reason),
                )
                .await;
            } else {
                let delay = webhook_retry::backoff(attempt_num as u32, &cfg.retry);
                let not_before = Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::seconds(60));
                webhook_store::update_state(
                    &mut tx2,
                    event_id,
                    &StatePatch {
                        status: ProcessingStatus::Pending,
                        attempt_count: attempt_num,
                        last_attempt_at: Some(attempt_started_at),
                        completed_at: None,
                        error_message: Some(reason.clone()),
                        not_before: Some(not_before),
                    },
                )
                .await?;
                tx2.commit().await.context("commit retry-scheduled tx")?;
                webhook_audit::record(
                    pool,
                    event_id,
                    AuditAction::RetryScheduled,
                    AuditOutcome::Pending,
                    Some(format!("retry in {delay:?}: {reason}")),
                )
                .await;
            }
        }
    }

    Ok(())
}

/// Claim a batch of eligible events and drive them concurrently, bounded by
/// `cfg.concurrency`. Returns once every claimed event has finished its
/// attempt (success, failure, or reschedule) for this tick.
pub async fn run_once<D: Downstream + 'static>(
    pool: &PgPool,
    downstream: Arc<D>,
    cfg: &WorkerConfig,
) -> Result<()> {
    let ids = webhook_store::claim_pending(pool, cfg.concurrency as i64 * 4).await?;
    if ids.is_empty() {
        return Ok(());
    }

    let semaphore = Arc::new(Semaphore::new(cfg.concurrency));
    let mut handles = Vec::with_capacity(ids.len());
    for id in ids {
        let permit = semaphore.clone().acquire_owned().await?;
        let pool = pool.clone();
        let downstream = downstream.clone();
        let cfg = cfg.clone();
        handles.push(tokio::spawn(async move {
            let _permit = permit;
            if let Err(err) = process_event(&pool, downstream.as_ref(), &id, &cfg).await {
                tracing::error!(event_id = %id, error = %err, "process_event failed");
            }
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }
    Ok(())
}

/// Drive the reaper on startup, then every `stale_processing_threshold`.
pub async fn run_reaper(pool: PgPool, threshold: Duration) {
    loop {
        match webhook_store::reap_stale_processing(&pool, threshold.as_secs() as i64).await {
            Ok(0) => {}
            Ok(n) => tracing::warn!(reclaimed = n, "reaped stale processing rows"),
            Err(err) => tracing::error!(error = %err, "reap_stale_processing failed"),
        }
        tokio::time::sleep(threshold).await;
    }
}

/// The long-running poll loop: claim, drive, sleep, repeat. Runs forever;
/// intended to be spawned as its own task by the daemon.
pub async fn run_poll_loop<D: Downstream + 'static>(pool: PgPool, downstream: D, cfg: WorkerConfig) {
    let downstream = Arc::new(downstream);
    loop {
        if let Err(err) = run_once(&pool, downstream.clone(), &cfg).await {
            tracing::error!(error = %err, "worker poll tick failed");
        }
        tokio::time::sleep(cfg.poll_interval).await;
    }
}


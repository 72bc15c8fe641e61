//! Plain data types shared across the webhook ingestion spine.
//!
//! No I/O lives here: this crate is the vocabulary every other crate in the
//! workspace talks in (`Event`, `ProcessingState`, `AuditEntry`, ...).

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// WebhookRecord — validated inbound input
// ---------------------------------------------------------------------------

/// A validated inbound webhook record. The HTTP frame is responsible for
/// shape validation; by the time this reaches the core it is well-typed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookRecord {
    pub event_id: String,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub payload: Value,
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// Immutable record of a received webhook; `event_id` is unique and the
/// payload is never mutated after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub payload: Value,
    pub payload_hash: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// ProcessingState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ProcessingStatus::Pending),
            "processing" => Ok(ProcessingStatus::Processing),
            "completed" => Ok(ProcessingStatus::Completed),
            "failed" => Ok(ProcessingStatus::Failed),
            other => Err(anyhow!("invalid processing status: {other}")),
        }
    }
}

/// Mutable per-event state driving the retry state machine: current status,
/// attempt count, and the `not_before` gate that holds a failed attempt back
/// until its backoff window elapses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingState {
    pub event_id: String,
    pub status: ProcessingStatus,
    pub attempt_count: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub not_before: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// AuditEntry
// ---------------------------------------------------------------------------

/// Closed action vocabulary for the append-only audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    EventReceived,
    EventInserted,
    EventDeduped,
    ConflictDetected,
    ProcessingAttemptStarted,
    ProcessingSucceeded,
    ProcessingAttemptFailed,
    RetryScheduled,
    ProcessingAbandoned,
    ProcessingFailedPermanently,
    ProcessingError,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::EventReceived => "event_received",
            AuditAction::EventInserted => "event_inserted",
            AuditAction::EventDeduped => "event_deduped",
            AuditAction::ConflictDetected => "conflict_detected",
            AuditAction::ProcessingAttemptStarted => "processing_attempt_started",
            AuditAction::ProcessingSucceeded => "processing_succeeded",
            AuditAction::ProcessingAttemptFailed => "processing_attempt_failed",
            AuditAction::RetryScheduled => "retry_scheduled",
            AuditAction::ProcessingAbandoned => "processing_abandoned",
            AuditAction::ProcessingFailedPermanently => "processing_failed_permanently",
            AuditAction::ProcessingError => "processing_error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditOutcome {
    Success,
    Failure,
    Pending,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Success => "success",
            AuditOutcome::Failure => "failure",
            AuditOutcome::Pending => "pending",
        }
    }
}

/// Append-only decision log entry; rows are never updated or deleted, only
/// inserted as each decision is made.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub event_id: String,
    pub action: AuditAction,
    pub details: Option<String>,
    pub success: AuditOutcome,
}

impl AuditEntry {
    pub fn new(
        event_id: impl Into<String>,
        action: AuditAction,
        success: AuditOutcome,
        details: Option<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            event_id: event_id.into(),
            action,
            details,
            success,
        }
    }
}

// ---------------------------------------------------------------------------
// IngestOutcome
// ---------------------------------------------------------------------------

/// The three-way decision the ingestor resolves for an inbound webhook: a
/// new event, a repeat of one already stored with the same payload, or a
/// repeat whose payload disagrees with what's on record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestOutcome {
    Accepted,
    Deduplicated,
    Conflict,
}

impl IngestOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestOutcome::Accepted => "accepted",
            IngestOutcome::Deduplicated => "deduplicated",
            IngestOutcome::Conflict => "conflict",
        }
    }
}

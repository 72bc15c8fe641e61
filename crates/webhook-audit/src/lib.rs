//! Thin façade over `webhook_store::append_audit`.
//!
//! Audit writes describe *attempted* decisions, not only successful ones, so
//! a write failure here must never abort the surrounding business decision:
//! we log and swallow, preferring a missing audit row to a failed business
//! decision.

use sqlx::PgPool;
use webhook_schemas::{AuditAction, AuditEntry, AuditOutcome};

/// Record one audit entry. Never returns an error to the caller: a Store
/// failure here is logged via `tracing::warn!` and otherwise ignored.
pub async fn record(
    pool: &PgPool,
    event_id: &str,
    action: AuditAction,
    success: AuditOutcome,
    details: Option<String>,
) {
    let entry = AuditEntry::new(event_id, action, success, details);
    if let Err(err) = webhook_store::append_audit(pool, &entry).await {
        tracing::warn!(
            event_id,
            action = action.as_str(),
            error = %err,
            "audit write failed; business decision proceeds regardless"
        );
    }
}

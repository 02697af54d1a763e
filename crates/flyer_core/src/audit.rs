//! crates/flyer_core/src/audit.rs
//!
//! Best-effort edit history writes.

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use crate::domain::{EditAction, EditHistoryEntry};
use crate::ports::AuditLog;

/// Appends a history entry. A failed write is logged and never aborts the caller.
pub async fn record(
    audit: &dyn AuditLog,
    flyer_id: Uuid,
    user_id: Uuid,
    action: EditAction,
    details: serde_json::Value,
) {
    let entry = EditHistoryEntry {
        id: Uuid::new_v4(),
        flyer_id,
        user_id,
        action,
        details,
        created_at: Utc::now(),
    };
    if let Err(e) = audit.append_history(&entry).await {
        warn!(
            flyer_id = %flyer_id,
            action = action.as_str(),
            "Failed to write edit history: {}",
            e
        );
    }
}

//! Durable records of pending local mutations.

use crate::kinds::{EntityKind, SyncAction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One pending local mutation awaiting remote acknowledgement.
///
/// # Invariants
///
/// - At most one item exists per (kind, entity_id); a later enqueue
///   replaces the pending item's snapshot/action instead of appending
/// - `created_at` is preserved across replacements so FIFO ordering
///   reflects the first unsynced change
/// - The item is destroyed on success, on 404-on-delete, or when
///   `retry_count` reaches the configured maximum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Queue item id.
    pub id: Uuid,
    /// Entity kind this mutation belongs to.
    pub kind: EntityKind,
    /// Local entity id.
    pub entity_id: Uuid,
    /// Pending action.
    pub action: SyncAction,
    /// Wire snapshot of the entity at enqueue time.
    pub snapshot: Value,
    /// Number of failed push attempts so far.
    pub retry_count: u32,
    /// Error message from the most recent failed attempt.
    pub last_error: Option<String>,
    /// When the first unsynced change was enqueued.
    pub created_at: DateTime<Utc>,
}

impl QueueItem {
    /// Creates a new queue item for a local mutation.
    pub fn new(kind: EntityKind, entity_id: Uuid, action: SyncAction, snapshot: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            entity_id,
            action,
            snapshot,
            retry_count: 0,
            last_error: None,
            created_at: Utc::now(),
        }
    }

    /// Replaces the pending action/snapshot, keeping identity and
    /// `created_at`. A delete overrides a pending upsert this way.
    pub fn replace(&mut self, action: SyncAction, snapshot: Value) {
        self.action = action;
        self.snapshot = snapshot;
    }

    /// Records a failed attempt and returns the new retry count.
    pub fn record_failure(&mut self, error: impl Into<String>) -> u32 {
        self.retry_count += 1;
        self.last_error = Some(error.into());
        self.retry_count
    }
}

//! Conflict records and resolution strategies.

use crate::kinds::EntityKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Strategy for resolving a version conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Newest wall-clock `updated_at` wins.
    LastWriteWins,
    /// Local snapshot always wins.
    KeepLocal,
    /// Server snapshot always wins.
    AcceptRemote,
}

impl Default for ResolutionStrategy {
    fn default() -> Self {
        ResolutionStrategy::LastWriteWins
    }
}

/// Which side a resolution picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictWinner {
    /// The local snapshot is kept and resubmitted.
    Local,
    /// The server snapshot overwrites the local row.
    Server,
}

/// A version conflict between a pending local change and the server.
///
/// Created when the server reports a version ahead of the local one
/// while a local mutation is still queued; marked resolved once a
/// strategy has been applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    /// Entity kind.
    pub kind: EntityKind,
    /// Local entity id.
    pub entity_id: Uuid,
    /// Version the local row was based on.
    pub local_version: i64,
    /// Version the server currently holds.
    pub server_version: i64,
    /// Pending local snapshot.
    pub local_snapshot: Value,
    /// Server snapshot.
    pub server_snapshot: Value,
    /// When the conflict was resolved, if it has been.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    /// Strategy that resolved it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<ResolutionStrategy>,
    /// Winning side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<ConflictWinner>,
}

impl Conflict {
    /// Creates an unresolved conflict.
    pub fn new(
        kind: EntityKind,
        entity_id: Uuid,
        local_version: i64,
        server_version: i64,
        local_snapshot: Value,
        server_snapshot: Value,
    ) -> Self {
        Self {
            kind,
            entity_id,
            local_version,
            server_version,
            local_snapshot,
            server_snapshot,
            resolved_at: None,
            strategy: None,
            winner: None,
        }
    }

    /// Marks the conflict resolved with the given strategy and winner.
    pub fn resolve(&mut self, strategy: ResolutionStrategy, winner: ConflictWinner) {
        self.strategy = Some(strategy);
        self.winner = Some(winner);
        self.resolved_at = Some(Utc::now());
    }

    /// Returns true once a strategy has been applied.
    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }
}

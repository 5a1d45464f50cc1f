//! Wire messages exchanged with the remote API.

use crate::kinds::{EntityKind, SyncAction};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// HTTP status for a successful operation.
pub const STATUS_OK: u16 = 200;
/// HTTP status for a missing remote entity.
pub const STATUS_NOT_FOUND: u16 = 404;
/// HTTP status for a version conflict.
pub const STATUS_CONFLICT: u16 = 409;

/// Returns true for statuses worth retrying (5xx, timeout, throttle).
pub fn is_transient_status(status: u16) -> bool {
    status >= 500 || status == 408 || status == 429
}

/// One remote entity as returned by fetch-all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEntity {
    /// Entity kind.
    pub kind: EntityKind,
    /// Server-side entity id.
    pub id: Uuid,
    /// Server version of the entity.
    pub version: i64,
    /// Opaque entity payload.
    pub payload: Value,
}

/// Response to a fetch-all hydration request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchAllResponse {
    /// All entities for the requesting user.
    pub items: Vec<WireEntity>,
    /// Total item count as reported by the server.
    pub count: usize,
}

/// Acknowledgement data on a successful push.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PushAck {
    /// Server-assigned version after the push.
    pub version: i64,
    /// Server-side id, present on first push of a new entity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<Uuid>,
}

/// Conflict details returned when a push hits a version mismatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushConflict {
    /// Version the server currently holds.
    pub server_version: i64,
    /// Server snapshot of the entity.
    pub server_snapshot: Value,
}

/// Response to a single-entity push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushResponse {
    /// Whether the push was accepted.
    pub success: bool,
    /// Acknowledgement data (present on success).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<PushAck>,
    /// Conflict details (present on a version mismatch).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict: Option<PushConflict>,
    /// Error message (present on failure).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// HTTP status code of the response.
    pub status_code: u16,
}

impl PushResponse {
    /// Creates a successful push response.
    pub fn ok(version: i64, server_id: Option<Uuid>) -> Self {
        Self {
            success: true,
            data: Some(PushAck { version, server_id }),
            conflict: None,
            error: None,
            status_code: STATUS_OK,
        }
    }

    /// Creates a version-conflict response carrying the server snapshot.
    pub fn conflict(server_version: i64, server_snapshot: Value) -> Self {
        Self {
            success: false,
            data: None,
            conflict: Some(PushConflict {
                server_version,
                server_snapshot,
            }),
            error: None,
            status_code: STATUS_CONFLICT,
        }
    }

    /// Creates a failed push response.
    pub fn error(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            conflict: None,
            error: Some(message.into()),
            status_code,
        }
    }

    /// Returns true if this response signals a version conflict.
    pub fn is_conflict(&self) -> bool {
        self.status_code == STATUS_CONFLICT || self.conflict.is_some()
    }
}

/// Response to a delete request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteResponse {
    /// Whether the delete was accepted.
    pub success: bool,
    /// HTTP status code of the response.
    pub status_code: u16,
}

impl DeleteResponse {
    /// Creates a successful delete response.
    pub fn ok() -> Self {
        Self {
            success: true,
            status_code: STATUS_OK,
        }
    }

    /// Creates a 404 response (entity already absent remotely).
    pub fn not_found() -> Self {
        Self {
            success: false,
            status_code: STATUS_NOT_FOUND,
        }
    }

    /// Creates a failed delete response.
    pub fn error(status_code: u16) -> Self {
        Self {
            success: false,
            status_code,
        }
    }

    /// Returns true if the delete intent is satisfied — either the
    /// server accepted it or the entity was already gone.
    pub fn is_satisfied(&self) -> bool {
        self.success || self.status_code == STATUS_NOT_FOUND
    }
}

/// One batched mutation inside a bulk-sync request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkItem {
    /// Queue item id, echoed back in the matching result.
    pub item_id: Uuid,
    /// Local entity id.
    pub entity_id: Uuid,
    /// Pending action.
    pub action: SyncAction,
    /// Wire snapshot.
    pub snapshot: Value,
}

/// A bulk-sync request grouping mutations by entity kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkSyncRequest {
    /// Batched mutations keyed by kind.
    pub items_by_kind: BTreeMap<EntityKind, Vec<BulkItem>>,
}

impl BulkSyncRequest {
    /// Total number of batched items.
    pub fn len(&self) -> usize {
        self.items_by_kind.values().map(Vec::len).sum()
    }

    /// Returns true if the request carries no items.
    pub fn is_empty(&self) -> bool {
        self.items_by_kind.values().all(Vec::is_empty)
    }
}

/// Per-item outcome inside a bulk-sync response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkItemResult {
    /// Queue item id this result refers to.
    pub item_id: Uuid,
    /// Whether the item was accepted.
    pub success: bool,
    /// HTTP-equivalent status for the item.
    pub status_code: u16,
    /// Server-assigned version (present on success of an upsert).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    /// Server-side id, present on first push of a new entity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<Uuid>,
    /// Conflict details (present on a version mismatch).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict: Option<PushConflict>,
    /// Error message (present on failure).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response to a bulk-sync request.
///
/// `results` is required by this engine; servers that return only the
/// aggregate counters are treated as a degraded mode by the cycle
/// executor, never optimistically acknowledged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkSyncResponse {
    /// Per-item results keyed by `item_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<BulkItemResult>>,
    /// Number of accepted items.
    pub success_count: u32,
    /// Number of version conflicts.
    pub conflict_count: u32,
    /// Number of rejected items.
    pub error_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::well_known;
    use serde_json::json;

    #[test]
    fn transient_status_classification() {
        assert!(is_transient_status(500));
        assert!(is_transient_status(503));
        assert!(is_transient_status(408));
        assert!(is_transient_status(429));
        assert!(!is_transient_status(STATUS_OK));
        assert!(!is_transient_status(STATUS_NOT_FOUND));
        assert!(!is_transient_status(STATUS_CONFLICT));
        assert!(!is_transient_status(400));
    }

    #[test]
    fn push_response_constructors() {
        let ok = PushResponse::ok(3, None);
        assert!(ok.success);
        assert_eq!(ok.data.unwrap().version, 3);
        assert!(!ok.is_conflict());

        let conflict = PushResponse::conflict(5, json!({"v": 5}));
        assert!(!conflict.success);
        assert!(conflict.is_conflict());
        assert_eq!(conflict.status_code, STATUS_CONFLICT);

        let err = PushResponse::error(502, "bad gateway");
        assert!(!err.success);
        assert!(!err.is_conflict());
        assert_eq!(err.error.as_deref(), Some("bad gateway"));
    }

    #[test]
    fn delete_404_is_satisfied() {
        assert!(DeleteResponse::ok().is_satisfied());
        assert!(DeleteResponse::not_found().is_satisfied());
        assert!(!DeleteResponse::error(500).is_satisfied());
    }

    #[test]
    fn bulk_request_counts_across_kinds() {
        let mut request = BulkSyncRequest::default();
        assert!(request.is_empty());

        let item = |entity_id| BulkItem {
            item_id: Uuid::new_v4(),
            entity_id,
            action: SyncAction::Upsert,
            snapshot: json!({}),
        };
        request
            .items_by_kind
            .entry(well_known::NOTES)
            .or_default()
            .push(item(Uuid::new_v4()));
        request
            .items_by_kind
            .entry(well_known::TASKS)
            .or_default()
            .extend([item(Uuid::new_v4()), item(Uuid::new_v4())]);

        assert_eq!(request.len(), 3);
        assert!(!request.is_empty());
    }

    #[test]
    fn push_response_json_shape() {
        // Optional fields are omitted, not null, so older servers can
        // parse acknowledgements without schema churn.
        let json = serde_json::to_value(PushResponse::ok(2, None)).unwrap();
        assert_eq!(json["success"], json!(true));
        assert_eq!(json["data"]["version"], json!(2));
        assert!(json.get("conflict").is_none());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn bulk_response_results_optional_on_decode() {
        let aggregate_only: BulkSyncResponse =
            serde_json::from_value(json!({"success_count": 4, "conflict_count": 0, "error_count": 1}))
                .unwrap();
        assert!(aggregate_only.results.is_none());
        assert_eq!(aggregate_only.success_count, 4);
    }
}

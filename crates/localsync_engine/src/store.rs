//! Local storage collaborator interface.
//!
//! The engine does not own a persistence schema; it consumes a small
//! contract over whatever durable store the application uses. The only
//! requirements are the queue table primitives and the per-entity sync
//! metadata below. An in-memory implementation ships for tests and
//! lightweight embedding.

use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use localsync_protocol::{EntityKind, QueueItem};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// A generic local row with the sync metadata the engine needs.
///
/// Domain fields stay opaque in `fields`; adapters translate between
/// this shape and the wire payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Local entity id.
    pub id: Uuid,
    /// Server-side id, set after the first acknowledged push.
    pub server_id: Option<Uuid>,
    /// Monotonic version, authoritative value comes from the server.
    pub version: i64,
    /// Wall-clock time of the last local change.
    pub updated_at: DateTime<Utc>,
    /// When the row was last acknowledged by the server.
    pub synced_at: Option<DateTime<Utc>>,
    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,
    /// Opaque domain fields.
    pub fields: Value,
}

impl EntityRecord {
    /// Creates a fresh local record at version 1.
    pub fn new(id: Uuid, fields: Value) -> Self {
        Self {
            id,
            server_id: None,
            version: 1,
            updated_at: Utc::now(),
            synced_at: None,
            deleted_at: None,
            fields,
        }
    }

    /// Returns true if the row is soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Durable entity storage plus the sync queue table.
///
/// Implementations must be safe for concurrent access from the UI path
/// and the sync path. All methods are synchronous; the engine never
/// holds a store call open across a network await.
pub trait LocalStore: Send + Sync {
    /// Inserts or overwrites a queue item by its id.
    fn put_queue_item(&self, item: QueueItem) -> EngineResult<()>;

    /// Looks up the pending item for an entity, if any.
    fn get_queue_item(&self, kind: &EntityKind, entity_id: Uuid)
        -> EngineResult<Option<QueueItem>>;

    /// Returns all pending items in FIFO order by `created_at`.
    fn queued_items(&self) -> EngineResult<Vec<QueueItem>>;

    /// Removes a queue item.
    fn remove_queue_item(&self, item_id: Uuid) -> EngineResult<()>;

    /// Number of pending queue items.
    fn queue_len(&self) -> EngineResult<usize>;

    /// Reads an entity row.
    fn get_entity(&self, kind: &EntityKind, id: Uuid) -> EngineResult<Option<EntityRecord>>;

    /// Writes an entity row.
    fn put_entity(&self, kind: &EntityKind, record: EntityRecord) -> EngineResult<()>;

    /// Marks an entity acknowledged by the server.
    ///
    /// `version` of `None` keeps the current version (delete
    /// acknowledgements carry no new version). Missing rows are a
    /// no-op so a purged local row cannot fail an acknowledgement.
    fn mark_synced(
        &self,
        kind: &EntityKind,
        id: Uuid,
        version: Option<i64>,
        server_id: Option<Uuid>,
    ) -> EngineResult<()>;

    /// Overwrites an entity row with server state, already marked synced.
    fn apply_remote(&self, kind: &EntityKind, record: EntityRecord) -> EngineResult<()>;

    /// Returns all entity rows (hydration/status queries).
    fn all_entities(&self) -> EngineResult<Vec<(EntityKind, EntityRecord)>>;
}

/// An in-memory store for tests and lightweight embedding.
#[derive(Default)]
pub struct MemoryStore {
    entities: RwLock<HashMap<(EntityKind, Uuid), EntityRecord>>,
    queue: RwLock<Vec<QueueItem>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStore for MemoryStore {
    fn put_queue_item(&self, item: QueueItem) -> EngineResult<()> {
        let mut queue = self.queue.write();
        if let Some(existing) = queue.iter_mut().find(|q| q.id == item.id) {
            *existing = item;
        } else {
            queue.push(item);
        }
        Ok(())
    }

    fn get_queue_item(
        &self,
        kind: &EntityKind,
        entity_id: Uuid,
    ) -> EngineResult<Option<QueueItem>> {
        Ok(self
            .queue
            .read()
            .iter()
            .find(|q| &q.kind == kind && q.entity_id == entity_id)
            .cloned())
    }

    fn queued_items(&self) -> EngineResult<Vec<QueueItem>> {
        let mut items = self.queue.read().clone();
        items.sort_by_key(|q| q.created_at);
        Ok(items)
    }

    fn remove_queue_item(&self, item_id: Uuid) -> EngineResult<()> {
        self.queue.write().retain(|q| q.id != item_id);
        Ok(())
    }

    fn queue_len(&self) -> EngineResult<usize> {
        Ok(self.queue.read().len())
    }

    fn get_entity(&self, kind: &EntityKind, id: Uuid) -> EngineResult<Option<EntityRecord>> {
        Ok(self.entities.read().get(&(kind.clone(), id)).cloned())
    }

    fn put_entity(&self, kind: &EntityKind, record: EntityRecord) -> EngineResult<()> {
        self.entities
            .write()
            .insert((kind.clone(), record.id), record);
        Ok(())
    }

    fn mark_synced(
        &self,
        kind: &EntityKind,
        id: Uuid,
        version: Option<i64>,
        server_id: Option<Uuid>,
    ) -> EngineResult<()> {
        let mut entities = self.entities.write();
        if let Some(record) = entities.get_mut(&(kind.clone(), id)) {
            if let Some(version) = version {
                record.version = version;
            }
            if server_id.is_some() {
                record.server_id = server_id;
            }
            record.synced_at = Some(Utc::now());
        }
        Ok(())
    }

    fn apply_remote(&self, kind: &EntityKind, mut record: EntityRecord) -> EngineResult<()> {
        record.synced_at = Some(Utc::now());
        self.entities
            .write()
            .insert((kind.clone(), record.id), record);
        Ok(())
    }

    fn all_entities(&self) -> EngineResult<Vec<(EntityKind, EntityRecord)>> {
        Ok(self
            .entities
            .read()
            .iter()
            .map(|((kind, _), record)| (kind.clone(), record.clone()))
            .collect())
    }
}

/// Maps an opaque store failure into `EngineError::Store`.
pub fn store_err(e: impl std::fmt::Display) -> EngineError {
    EngineError::store(e.to_string())
}

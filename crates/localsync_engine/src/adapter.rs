//! Per-kind entity adapters.
//!
//! The engine is generic over domain entity types: one adapter per kind
//! translates between the local row shape and the wire payload, and
//! ranks the kind in the dependency order used when draining the queue.
//! This replaces per-domain copies of the engine with a single generic
//! one.

use crate::error::{EngineError, EngineResult};
use crate::store::EntityRecord;
use chrono::{DateTime, Utc};
use localsync_protocol::EntityKind;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Translates one entity kind between local rows and wire payloads.
pub trait EntityAdapter: Send + Sync {
    /// The kind this adapter handles.
    fn kind(&self) -> EntityKind;

    /// Dependency rank for queue ordering; parent kinds (referenced by
    /// others via foreign keys) must rank lower than their children.
    fn dependency_rank(&self) -> u32 {
        100
    }

    /// Builds the wire payload for a local row.
    fn to_wire(&self, record: &EntityRecord) -> EngineResult<Value>;

    /// Rebuilds a local row from a wire payload.
    fn from_wire(&self, payload: &Value) -> EngineResult<EntityRecord>;
}

/// Registry of adapters keyed by entity kind.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<EntityKind, Arc<dyn EntityAdapter>>,
}

impl AdapterRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter, replacing any previous one for the kind.
    pub fn register(&mut self, adapter: Arc<dyn EntityAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    /// Looks up the adapter for a kind.
    pub fn get(&self, kind: &EntityKind) -> Option<&Arc<dyn EntityAdapter>> {
        self.adapters.get(kind)
    }

    /// Like `get`, but returns an error for unregistered kinds.
    pub fn require(&self, kind: &EntityKind) -> EngineResult<&Arc<dyn EntityAdapter>> {
        self.get(kind)
            .ok_or_else(|| EngineError::UnknownKind(kind.clone()))
    }

    /// Dependency rank for a kind; unknown kinds sort last.
    pub fn rank_of(&self, kind: &EntityKind) -> u32 {
        self.get(kind)
            .map_or(u32::MAX, |adapter| adapter.dependency_rank())
    }

    /// All registered kinds.
    pub fn kinds(&self) -> impl Iterator<Item = &EntityKind> {
        self.adapters.keys()
    }
}

/// A pass-through adapter for kinds whose rows are plain JSON objects.
///
/// Sync metadata (`id`, `version`, `updated_at`, `deleted_at`) is
/// carried as top-level payload fields alongside the domain fields.
/// Covers the stock domain kinds; richer domains implement
/// `EntityAdapter` directly.
pub struct JsonAdapter {
    kind: EntityKind,
    rank: u32,
}

impl JsonAdapter {
    /// Creates a pass-through adapter with the default rank.
    pub fn new(kind: EntityKind) -> Self {
        Self { kind, rank: 100 }
    }

    /// Sets the dependency rank.
    pub fn with_rank(mut self, rank: u32) -> Self {
        self.rank = rank;
        self
    }
}

const META_FIELDS: [&str; 4] = ["id", "version", "updated_at", "deleted_at"];

impl EntityAdapter for JsonAdapter {
    fn kind(&self) -> EntityKind {
        self.kind.clone()
    }

    fn dependency_rank(&self) -> u32 {
        self.rank
    }

    fn to_wire(&self, record: &EntityRecord) -> EngineResult<Value> {
        let mut map = match &record.fields {
            Value::Object(fields) => fields.clone(),
            other => {
                return Err(EngineError::Protocol(format!(
                    "{} record fields must be a JSON object, got {other}",
                    self.kind
                )))
            }
        };

        map.insert("id".into(), Value::String(record.id.to_string()));
        map.insert("version".into(), Value::from(record.version));
        map.insert(
            "updated_at".into(),
            Value::String(record.updated_at.to_rfc3339()),
        );
        if let Some(deleted_at) = record.deleted_at {
            map.insert("deleted_at".into(), Value::String(deleted_at.to_rfc3339()));
        }

        Ok(Value::Object(map))
    }

    fn from_wire(&self, payload: &Value) -> EngineResult<EntityRecord> {
        let map = payload.as_object().ok_or_else(|| {
            EngineError::Protocol(format!("{} payload must be a JSON object", self.kind))
        })?;

        let id = map
            .get("id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| {
                EngineError::Protocol(format!("{} payload missing entity id", self.kind))
            })?;

        let version = map.get("version").and_then(Value::as_i64).unwrap_or(1);

        let updated_at = parse_timestamp(map, "updated_at").ok_or_else(|| {
            EngineError::Protocol(format!("{} payload missing updated_at", self.kind))
        })?;
        let deleted_at = parse_timestamp(map, "deleted_at");

        let fields: Map<String, Value> = map
            .iter()
            .filter(|(key, _)| !META_FIELDS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(EntityRecord {
            id,
            server_id: None,
            version,
            updated_at,
            synced_at: None,
            deleted_at,
            fields: Value::Object(fields),
        })
    }
}

fn parse_timestamp(map: &Map<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    map.get(key)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

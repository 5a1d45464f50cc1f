//! Entity kind and sync action identifiers.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Identifies a domain entity type (alarms, notes, tasks, ...).
///
/// Kinds are opaque to the engine; adapters registered by the caller
/// give each kind its wire mapping and dependency rank.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKind(Cow<'static, str>);

impl EntityKind {
    /// Creates a kind from a static name.
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Creates a kind from an owned name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    /// Returns the kind name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind names used by the stock domain adapters.
pub mod well_known {
    use super::EntityKind;

    /// Alarm definitions.
    pub const ALARMS: EntityKind = EntityKind::from_static("alarms");
    /// Countdown timers.
    pub const TIMERS: EntityKind = EntityKind::from_static("timers");
    /// Free-form notes.
    pub const NOTES: EntityKind = EntityKind::from_static("notes");
    /// Task items.
    pub const TASKS: EntityKind = EntityKind::from_static("tasks");
    /// Habit completion records.
    pub const HABIT_RECORDS: EntityKind = EntityKind::from_static("habit_records");
    /// Recording metadata.
    pub const RECORDINGS: EntityKind = EntityKind::from_static("recordings");
    /// Conversation objects.
    pub const CONVERSATIONS: EntityKind = EntityKind::from_static("conversations");
}

/// The kind of pending mutation a queue item carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    /// Create or update the entity remotely.
    Upsert,
    /// Soft-delete the entity remotely.
    Delete,
}

impl SyncAction {
    /// Returns true if this action removes the entity.
    pub fn is_delete(&self) -> bool {
        matches!(self, SyncAction::Delete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_equality_across_construction() {
        assert_eq!(well_known::NOTES, EntityKind::new("notes"));
        assert_ne!(well_known::NOTES, well_known::TASKS);
    }

    #[test]
    fn kind_serializes_as_bare_string() {
        let json = serde_json::to_string(&well_known::ALARMS).unwrap();
        assert_eq!(json, "\"alarms\"");

        let back: EntityKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, well_known::ALARMS);
    }

    #[test]
    fn action_serialization() {
        assert_eq!(
            serde_json::to_string(&SyncAction::Upsert).unwrap(),
            "\"upsert\""
        );
        assert_eq!(
            serde_json::to_string(&SyncAction::Delete).unwrap(),
            "\"delete\""
        );
        assert!(SyncAction::Delete.is_delete());
        assert!(!SyncAction::Upsert.is_delete());
    }
}

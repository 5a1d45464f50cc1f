//! # localsync Protocol
//!
//! Protocol types for the localsync engine.
//!
//! This crate provides:
//! - `EntityKind` and `SyncAction` identifiers
//! - `QueueItem` for pending local mutations
//! - Wire messages (fetch-all, push, delete, bulk-sync)
//! - `Conflict` records and resolution strategies
//!
//! This is a pure protocol crate with no I/O. All wire messages are
//! plain `serde` types; the remote contract is a versioned JSON/HTTP
//! API carrying a `version` field on every mutable payload.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod conflict;
mod kinds;
mod messages;
mod queue_item;

pub use conflict::{Conflict, ConflictWinner, ResolutionStrategy};
pub use kinds::{well_known, EntityKind, SyncAction};
pub use messages::{
    is_transient_status, BulkItem, BulkItemResult, BulkSyncRequest, BulkSyncResponse,
    DeleteResponse, FetchAllResponse, PushAck, PushConflict, PushResponse, WireEntity, STATUS_CONFLICT,
    STATUS_NOT_FOUND, STATUS_OK,
};
pub use queue_item::QueueItem;

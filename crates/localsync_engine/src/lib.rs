//! # localsync Engine
//!
//! A local-first background sync engine. The application reads and
//! writes its own durable store and never waits on the network; this
//! crate reconciles those local mutations with an authoritative remote
//! API when connectivity allows.
//!
//! ## Architecture
//!
//! - [`SyncQueue`]: durable outbound mutations, deduplicated per
//!   entity, drained in dependency order with a bounded retry budget.
//! - [`SyncEngine`]: the scheduling loop. Periodic cycles with failure
//!   backoff, manual [`SyncEngine::sync_now`], cooperative shutdown,
//!   and at most one cycle in flight per engine.
//! - [`ConflictResolver`]: picks a winner when a push hits a version
//!   mismatch; last-write-wins by wall-clock `updated_at` by default.
//! - Collaborator seams: [`LocalStore`] for persistence,
//!   [`RemoteClient`] for the wire, [`EntityAdapter`] per entity kind,
//!   [`SyncObserver`] for events.
//!
//! [`MemoryStore`], [`MockRemote`] and [`JsonAdapter`] ship in the
//! crate so embedders and tests do not have to re-implement the seams.
//!
//! ## Example
//!
//! ```
//! use localsync_engine::{
//!     AdapterRegistry, EngineConfig, JsonAdapter, MemoryStore, MockRemote, SyncEngine,
//! };
//! use localsync_protocol::{well_known, SyncAction};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), localsync_engine::EngineError> {
//! let mut registry = AdapterRegistry::new();
//! registry.register(Arc::new(JsonAdapter::new(well_known::NOTES)));
//!
//! let engine = SyncEngine::new(
//!     EngineConfig::new(),
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(MockRemote::new()),
//!     registry,
//! );
//! engine.set_account(uuid::Uuid::new_v4());
//!
//! let note_id = uuid::Uuid::new_v4();
//! engine.queue().enqueue(
//!     well_known::NOTES,
//!     note_id,
//!     SyncAction::Upsert,
//!     serde_json::json!({
//!         "id": note_id.to_string(),
//!         "version": 1,
//!         "updated_at": "2026-08-20T12:00:00Z",
//!         "title": "hello"
//!     }),
//! )?;
//!
//! assert!(engine.sync_now().await?);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod config;
mod conflict;
mod cycle;
mod engine;
mod error;
mod http;
mod observer;
mod queue;
mod remote;
mod store;

pub use adapter::{AdapterRegistry, EntityAdapter, JsonAdapter};
pub use config::{BackoffConfig, EngineConfig};
pub use conflict::ConflictResolver;
pub use cycle::CycleReport;
pub use engine::{SyncEngine, SyncStats};
pub use error::{EngineError, EngineResult};
pub use http::{HttpBackend, HttpRemote, HttpReply};
pub use observer::{NullObserver, SyncObserver};
pub use queue::{FailureOutcome, SyncQueue};
pub use remote::{upsert_snapshot, MockRemote, RemoteCall, RemoteClient};
pub use store::{store_err, EntityRecord, LocalStore, MemoryStore};

// Re-exported so embedders depend on one crate.
pub use localsync_protocol::{
    Conflict, ConflictWinner, EntityKind, QueueItem, ResolutionStrategy, SyncAction,
};

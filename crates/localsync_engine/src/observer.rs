//! Sync event observer.
//!
//! The engine reports cycle outcomes and resolved conflicts through a
//! constructor-injected observer instead of a global notification sink,
//! keeping it decoupled from any specific notification mechanism.

use crate::cycle::CycleReport;
use crate::error::EngineError;
use localsync_protocol::Conflict;

/// Receives sync engine events. All methods default to no-ops.
pub trait SyncObserver: Send + Sync {
    /// A sync cycle completed.
    fn on_success(&self, _report: &CycleReport) {}

    /// A sync cycle failed.
    fn on_error(&self, _error: &EngineError) {}

    /// A version conflict was resolved.
    fn on_conflict_resolved(&self, _conflict: &Conflict) {}
}

/// An observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl SyncObserver for NullObserver {}

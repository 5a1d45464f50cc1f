//! Conflict resolution.

use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use localsync_protocol::{Conflict, ConflictWinner, ResolutionStrategy};
use serde_json::Value;

/// Applies a resolution strategy to version conflicts.
///
/// Resolution is a pure function of the two snapshots: re-resolving the
/// same inputs always yields the same winner.
#[derive(Debug, Clone, Copy)]
pub struct ConflictResolver {
    strategy: ResolutionStrategy,
}

impl ConflictResolver {
    /// Creates a resolver with the given strategy.
    pub fn new(strategy: ResolutionStrategy) -> Self {
        Self { strategy }
    }

    /// The configured strategy.
    pub fn strategy(&self) -> ResolutionStrategy {
        self.strategy
    }

    /// Picks a winner and marks the conflict resolved.
    ///
    /// Last-write-wins compares wall-clock `updated_at` (not version
    /// numbers, which can tie after concurrent offline edits). Equal
    /// timestamps resolve to the server, which is authoritative. A
    /// snapshot without a parseable `updated_at` is a resolution
    /// failure, reported as a protocol error.
    pub fn resolve(&self, conflict: &mut Conflict) -> EngineResult<ConflictWinner> {
        let winner = match self.strategy {
            ResolutionStrategy::KeepLocal => ConflictWinner::Local,
            ResolutionStrategy::AcceptRemote => ConflictWinner::Server,
            ResolutionStrategy::LastWriteWins => {
                let local = snapshot_updated_at(&conflict.local_snapshot)?;
                let server = snapshot_updated_at(&conflict.server_snapshot)?;
                if local > server {
                    ConflictWinner::Local
                } else {
                    ConflictWinner::Server
                }
            }
        };

        conflict.resolve(self.strategy, winner);
        Ok(winner)
    }
}

/// Reads the wall-clock `updated_at` from an opaque snapshot.
pub(crate) fn snapshot_updated_at(snapshot: &Value) -> EngineResult<DateTime<Utc>> {
    snapshot
        .get("updated_at")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| EngineError::Protocol("snapshot missing or malformed updated_at".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use localsync_protocol::well_known;
    use proptest::prelude::*;
    use serde_json::json;
    use uuid::Uuid;

    fn conflict_at(local: &str, server: &str) -> Conflict {
        Conflict::new(
            well_known::NOTES,
            Uuid::new_v4(),
            3,
            5,
            json!({"updated_at": local, "title": "local"}),
            json!({"updated_at": server, "title": "server"}),
        )
    }

    #[test]
    fn newer_local_wins() {
        let resolver = ConflictResolver::new(ResolutionStrategy::LastWriteWins);
        let mut conflict = conflict_at("2026-08-20T12:00:00Z", "2026-08-20T11:00:00Z");

        assert_eq!(resolver.resolve(&mut conflict).unwrap(), ConflictWinner::Local);
        assert!(conflict.is_resolved());
    }

    #[test]
    fn newer_server_wins() {
        let resolver = ConflictResolver::new(ResolutionStrategy::LastWriteWins);
        let mut conflict = conflict_at("2026-08-20T11:00:00Z", "2026-08-20T12:00:00Z");

        assert_eq!(
            resolver.resolve(&mut conflict).unwrap(),
            ConflictWinner::Server
        );
    }

    #[test]
    fn tie_goes_to_server() {
        let resolver = ConflictResolver::new(ResolutionStrategy::LastWriteWins);
        let mut conflict = conflict_at("2026-08-20T12:00:00Z", "2026-08-20T12:00:00Z");

        assert_eq!(
            resolver.resolve(&mut conflict).unwrap(),
            ConflictWinner::Server
        );
    }

    #[test]
    fn fixed_strategies_ignore_timestamps() {
        let mut conflict = conflict_at("2026-08-20T12:00:00Z", "2026-08-20T11:00:00Z");
        assert_eq!(
            ConflictResolver::new(ResolutionStrategy::AcceptRemote)
                .resolve(&mut conflict)
                .unwrap(),
            ConflictWinner::Server
        );

        let mut conflict = conflict_at("2026-08-20T11:00:00Z", "2026-08-20T12:00:00Z");
        assert_eq!(
            ConflictResolver::new(ResolutionStrategy::KeepLocal)
                .resolve(&mut conflict)
                .unwrap(),
            ConflictWinner::Local
        );
    }

    #[test]
    fn malformed_updated_at_is_resolution_failure() {
        let resolver = ConflictResolver::new(ResolutionStrategy::LastWriteWins);
        let mut conflict = Conflict::new(
            well_known::NOTES,
            Uuid::new_v4(),
            1,
            2,
            json!({"title": "no timestamp"}),
            json!({"updated_at": "2026-08-20T12:00:00Z"}),
        );

        assert!(resolver.resolve(&mut conflict).is_err());
        assert!(!conflict.is_resolved());
    }

    proptest! {
        // LWW is deterministic: the larger timestamp always wins and
        // re-resolution of the same inputs agrees with itself.
        #[test]
        fn lww_winner_is_larger_timestamp(local_secs in 0i64..4_000_000_000, server_secs in 0i64..4_000_000_000) {
            let local = Utc.timestamp_opt(local_secs, 0).unwrap().to_rfc3339();
            let server = Utc.timestamp_opt(server_secs, 0).unwrap().to_rfc3339();
            let resolver = ConflictResolver::new(ResolutionStrategy::LastWriteWins);

            let mut first = conflict_at(&local, &server);
            let mut second = conflict_at(&local, &server);
            let w1 = resolver.resolve(&mut first).unwrap();
            let w2 = resolver.resolve(&mut second).unwrap();

            prop_assert_eq!(w1, w2);
            if local_secs > server_secs {
                prop_assert_eq!(w1, ConflictWinner::Local);
            } else {
                prop_assert_eq!(w1, ConflictWinner::Server);
            }
        }
    }
}

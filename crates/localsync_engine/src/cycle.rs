//! Sync cycle execution.
//!
//! One cycle drains up to `batch_size` queue items in dependency order
//! and interprets the remote's per-item responses. Item failures never
//! abort the cycle; only store failures do.

use crate::engine::Inner;
use crate::error::{EngineError, EngineResult};
use crate::queue::FailureOutcome;
use crate::remote::RemoteClient;
use crate::store::LocalStore;
use localsync_protocol::{
    is_transient_status, BulkItem, BulkItemResult, BulkSyncRequest, Conflict, ConflictWinner,
    DeleteResponse, PushAck, PushResponse, QueueItem, SyncAction, STATUS_NOT_FOUND,
};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

/// Outcome of one sync cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Upserts acknowledged by the server.
    pub pushed: u64,
    /// Deletes acknowledged (including 404-as-success).
    pub deleted: u64,
    /// Version conflicts resolved.
    pub conflicts: u64,
    /// Items that failed this cycle (retained or abandoned).
    pub failed: u64,
    /// Items dropped after exhausting their retry budget.
    pub abandoned: u64,
    /// Wall time the cycle took.
    pub duration: Duration,
}

impl CycleReport {
    /// Returns true if no item failed.
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

impl<S: LocalStore, R: RemoteClient> Inner<S, R> {
    /// Runs one cycle. An empty queue is a normal no-op.
    ///
    /// Callers must hold the cycle lock; see `run_guarded_cycle`.
    pub(crate) async fn run_cycle(&self, user_id: Uuid) -> EngineResult<CycleReport> {
        let start = Instant::now();
        let mut report = CycleReport::default();

        let items = self.queue.dequeue_batch(self.config.batch_size)?;
        if items.is_empty() {
            report.duration = start.elapsed();
            return Ok(report);
        }

        debug!(count = items.len(), bulk = self.config.use_bulk, "processing sync batch");

        if self.config.use_bulk {
            self.run_bulk(user_id, &items, &mut report).await?;
        } else {
            for item in &items {
                // shutdown is only honored between items, so the
                // in-flight request always completes
                if self.shutdown.load(Ordering::SeqCst) {
                    debug!("shutdown requested, ending cycle early");
                    break;
                }
                self.process_item(user_id, item, &mut report).await?;
            }
        }

        report.duration = start.elapsed();
        Ok(report)
    }

    /// Bounds one remote call by the configured request timeout.
    ///
    /// A timeout maps to [`EngineError::Timeout`], which is retryable,
    /// so a hung request costs one attempt instead of stalling the
    /// whole loop.
    pub(crate) async fn call_remote<T>(
        &self,
        fut: impl Future<Output = EngineResult<T>>,
    ) -> EngineResult<T> {
        match tokio::time::timeout(self.config.request_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout),
        }
    }

    /// The id the server knows this entity by.
    ///
    /// The server assigns its own id on first push; deletes must target
    /// that id or they 404 against a row that still exists remotely.
    /// Falls back to the local id for rows never acknowledged.
    fn remote_id(&self, item: &QueueItem) -> EngineResult<Uuid> {
        Ok(self
            .store
            .get_entity(&item.kind, item.entity_id)?
            .and_then(|record| record.server_id)
            .unwrap_or(item.entity_id))
    }

    async fn process_item(
        &self,
        user_id: Uuid,
        item: &QueueItem,
        report: &mut CycleReport,
    ) -> EngineResult<()> {
        match item.action {
            SyncAction::Delete => {
                let target = self.remote_id(item)?;
                match self
                    .call_remote(self.remote.delete(&item.kind, target, true))
                    .await
                {
                    Ok(response) => self.handle_delete_response(item, &response, report),
                    Err(e) if e.is_retryable() => {
                        self.note_item_failure(item, &e.to_string(), report)
                    }
                    Err(e) => self.drop_item(item, &e.to_string(), report),
                }
            }
            SyncAction::Upsert => {
                match self
                    .call_remote(self.remote.push(&item.kind, &item.snapshot, user_id))
                    .await
                {
                    Ok(response) => self.handle_push_response(item, response, report),
                    Err(e) if e.is_retryable() => {
                        self.note_item_failure(item, &e.to_string(), report)
                    }
                    Err(e) => self.drop_item(item, &e.to_string(), report),
                }
            }
        }
    }

    /// Sends the whole batch in one round trip and applies per-item
    /// results. A response without a results array is a degraded mode:
    /// items are kept for retry, never optimistically acknowledged.
    async fn run_bulk(
        &self,
        user_id: Uuid,
        items: &[QueueItem],
        report: &mut CycleReport,
    ) -> EngineResult<()> {
        let mut request = BulkSyncRequest::default();
        for item in items {
            // deletes travel under the server's id, same as the
            // per-item path
            let entity_id = match item.action {
                SyncAction::Delete => self.remote_id(item)?,
                SyncAction::Upsert => item.entity_id,
            };
            request
                .items_by_kind
                .entry(item.kind.clone())
                .or_default()
                .push(BulkItem {
                    item_id: item.id,
                    entity_id,
                    action: item.action,
                    snapshot: item.snapshot.clone(),
                });
        }

        let response = match self
            .call_remote(self.remote.bulk_sync(user_id, request))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let message = e.to_string();
                for item in items {
                    self.note_item_failure(item, &message, report)?;
                }
                return Ok(());
            }
        };

        let Some(results) = response.results else {
            warn!(
                success_count = response.success_count,
                error_count = response.error_count,
                "bulk response omitted per-item results; degraded mode, keeping items queued"
            );
            for item in items {
                self.note_item_failure(item, "bulk response omitted per-item results", report)?;
            }
            return Ok(());
        };

        let by_id: HashMap<Uuid, BulkItemResult> =
            results.into_iter().map(|r| (r.item_id, r)).collect();

        for item in items {
            let Some(result) = by_id.get(&item.id) else {
                self.note_item_failure(item, "bulk response missing result for item", report)?;
                continue;
            };

            match item.action {
                SyncAction::Delete => {
                    let response = DeleteResponse {
                        success: result.success,
                        status_code: result.status_code,
                    };
                    self.handle_delete_response(item, &response, report)?;
                }
                SyncAction::Upsert => {
                    let response = if result.success {
                        let Some(version) = result.version else {
                            self.note_item_failure(item, "bulk result missing version", report)?;
                            continue;
                        };
                        PushResponse {
                            success: true,
                            data: Some(PushAck {
                                version,
                                server_id: result.server_id,
                            }),
                            conflict: None,
                            error: None,
                            status_code: result.status_code,
                        }
                    } else {
                        PushResponse {
                            success: false,
                            data: None,
                            conflict: result.conflict.clone(),
                            error: result.error.clone(),
                            status_code: result.status_code,
                        }
                    };
                    self.handle_push_response(item, response, report)?;
                }
            }
        }

        Ok(())
    }

    fn handle_delete_response(
        &self,
        item: &QueueItem,
        response: &DeleteResponse,
        report: &mut CycleReport,
    ) -> EngineResult<()> {
        if response.is_satisfied() {
            if response.status_code == STATUS_NOT_FOUND {
                // already absent remotely, the delete intent is met
                debug!(kind = %item.kind, entity_id = %item.entity_id, "delete target already gone, acknowledging");
            }
            self.store.mark_synced(&item.kind, item.entity_id, None, None)?;
            self.queue.mark_success(item.id)?;
            report.deleted += 1;
            Ok(())
        } else if is_transient_status(response.status_code) {
            self.note_item_failure(
                item,
                &format!("delete failed with status {}", response.status_code),
                report,
            )
        } else {
            self.drop_item(
                item,
                &format!("delete rejected with status {}", response.status_code),
                report,
            )
        }
    }

    fn handle_push_response(
        &self,
        item: &QueueItem,
        response: PushResponse,
        report: &mut CycleReport,
    ) -> EngineResult<()> {
        if response.success {
            let Some(ack) = response.data else {
                return self.note_item_failure(item, "push response missing ack data", report);
            };
            self.store
                .mark_synced(&item.kind, item.entity_id, Some(ack.version), ack.server_id)?;
            self.queue.mark_success(item.id)?;
            report.pushed += 1;
            Ok(())
        } else if response.is_conflict() {
            self.handle_conflict(item, response, report)
        } else if is_transient_status(response.status_code) {
            let message = response
                .error
                .unwrap_or_else(|| format!("push failed with status {}", response.status_code));
            self.note_item_failure(item, &message, report)
        } else {
            let message = response
                .error
                .unwrap_or_else(|| format!("push rejected with status {}", response.status_code));
            self.drop_item(item, &message, report)
        }
    }

    fn handle_conflict(
        &self,
        item: &QueueItem,
        response: PushResponse,
        report: &mut CycleReport,
    ) -> EngineResult<()> {
        let Some(remote) = response.conflict else {
            return self.drop_item(item, "conflict response without server snapshot", report);
        };

        let local_version = item.snapshot.get("version").and_then(Value::as_i64).unwrap_or(0);
        let mut conflict = Conflict::new(
            item.kind.clone(),
            item.entity_id,
            local_version,
            remote.server_version,
            item.snapshot.clone(),
            remote.server_snapshot.clone(),
        );

        let winner = match self.resolver.resolve(&mut conflict) {
            Ok(winner) => winner,
            Err(e) => {
                return self.drop_item(item, &format!("conflict resolution failed: {e}"), report)
            }
        };

        match winner {
            ConflictWinner::Server => {
                let adapter = match self.registry.require(&item.kind) {
                    Ok(adapter) => adapter,
                    Err(e) => return self.drop_item(item, &e.to_string(), report),
                };
                let mut record = match adapter.from_wire(&remote.server_snapshot) {
                    Ok(record) => record,
                    Err(e) => {
                        return self.drop_item(
                            item,
                            &format!("malformed server snapshot: {e}"),
                            report,
                        )
                    }
                };
                record.version = remote.server_version;
                if let Some(existing) = self.store.get_entity(&item.kind, item.entity_id)? {
                    record.server_id = existing.server_id;
                }
                self.store.apply_remote(&item.kind, record)?;
                self.queue.mark_success(item.id)?;
                debug!(kind = %item.kind, entity_id = %item.entity_id, version = remote.server_version, "conflict resolved, server snapshot applied");
            }
            ConflictWinner::Local => {
                let mut snapshot = item.snapshot.clone();
                let Value::Object(map) = &mut snapshot else {
                    return self.drop_item(item, "local snapshot is not a JSON object", report);
                };
                // resubmit against the server version as the expected base
                map.insert("version".into(), Value::from(remote.server_version));
                let outcome = self.queue.requeue_with_base(
                    item,
                    snapshot,
                    "version conflict, resubmitting against server version",
                )?;
                if outcome == FailureOutcome::Abandoned {
                    report.abandoned += 1;
                }
                debug!(kind = %item.kind, entity_id = %item.entity_id, base = remote.server_version, "conflict resolved, local snapshot resubmitted");
            }
        }

        self.conflict_count.fetch_add(1, Ordering::SeqCst);
        report.conflicts += 1;
        self.notify_conflict(&conflict);
        Ok(())
    }

    /// Records a transient item failure (bounded retry).
    fn note_item_failure(
        &self,
        item: &QueueItem,
        error: &str,
        report: &mut CycleReport,
    ) -> EngineResult<()> {
        if self.queue.mark_failure(item, error)? == FailureOutcome::Abandoned {
            report.abandoned += 1;
        }
        report.failed += 1;
        self.error_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Drops an item with a permanent error. The local row stays
    /// unsynced and can be re-enqueued by a manual force resync.
    fn drop_item(
        &self,
        item: &QueueItem,
        reason: &str,
        report: &mut CycleReport,
    ) -> EngineResult<()> {
        warn!(kind = %item.kind, entity_id = %item.entity_id, reason, "dropping queue item");
        self.store.remove_queue_item(item.id)?;
        report.failed += 1;
        self.error_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

//! Logical sync queue over the local store's queue table.
//!
//! Dedup, dependency ordering, and bounded-retry bookkeeping live here;
//! durability is the store's concern.

use crate::adapter::AdapterRegistry;
use crate::error::EngineResult;
use crate::store::LocalStore;
use localsync_protocol::{EntityKind, QueueItem, SyncAction};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Outcome of recording a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// The item stays queued for another attempt.
    Retained {
        /// Failed attempts so far.
        retry_count: u32,
    },
    /// The retry budget is exhausted and the item was dropped.
    Abandoned,
}

/// Logical view over the durable mutation queue.
pub struct SyncQueue<S> {
    store: Arc<S>,
    registry: Arc<AdapterRegistry>,
    max_retries: u32,
}

impl<S: LocalStore> SyncQueue<S> {
    /// Creates a queue view over the given store.
    pub fn new(store: Arc<S>, registry: Arc<AdapterRegistry>, max_retries: u32) -> Self {
        Self {
            store,
            registry,
            max_retries,
        }
    }

    /// Enqueues a pending mutation.
    ///
    /// Idempotent per (kind, entity_id): an existing item has its
    /// snapshot/action replaced instead of a second item appearing, so
    /// a delete overrides a pending upsert.
    pub fn enqueue(
        &self,
        kind: EntityKind,
        entity_id: Uuid,
        action: SyncAction,
        snapshot: Value,
    ) -> EngineResult<()> {
        if let Some(mut existing) = self.store.get_queue_item(&kind, entity_id)? {
            debug!(kind = %kind, %entity_id, ?action, "replacing pending queue item");
            existing.replace(action, snapshot);
            self.store.put_queue_item(existing)
        } else {
            self.store
                .put_queue_item(QueueItem::new(kind, entity_id, action, snapshot))
        }
    }

    /// Returns up to `limit` items in dependency order.
    ///
    /// Parent kinds (lower adapter rank) sort before children, then
    /// FIFO by creation time, so a child row is never pushed before the
    /// row its foreign key points at exists server-side.
    pub fn dequeue_batch(&self, limit: usize) -> EngineResult<Vec<QueueItem>> {
        let mut items = self.store.queued_items()?;
        items.sort_by_key(|item| (self.registry.rank_of(&item.kind), item.created_at));
        items.truncate(limit);
        Ok(items)
    }

    /// Removes an acknowledged item.
    pub fn mark_success(&self, item_id: Uuid) -> EngineResult<()> {
        self.store.remove_queue_item(item_id)
    }

    /// Records a failed attempt.
    ///
    /// Once the retry budget is exhausted the item is dropped and
    /// logged as abandoned, so one bad record cannot stall the queue.
    pub fn mark_failure(&self, item: &QueueItem, error: &str) -> EngineResult<FailureOutcome> {
        // Re-read so bookkeeping survives snapshot replacement races
        let mut current = self
            .store
            .get_queue_item(&item.kind, item.entity_id)?
            .unwrap_or_else(|| item.clone());

        let retry_count = current.record_failure(error);
        if retry_count >= self.max_retries {
            warn!(
                kind = %current.kind,
                entity_id = %current.entity_id,
                retry_count,
                error,
                "abandoning queue item after exhausting retries"
            );
            self.store.remove_queue_item(current.id)?;
            Ok(FailureOutcome::Abandoned)
        } else {
            debug!(
                kind = %current.kind,
                entity_id = %current.entity_id,
                retry_count,
                error,
                "queue item failed, will retry"
            );
            self.store.put_queue_item(current)?;
            Ok(FailureOutcome::Retained { retry_count })
        }
    }

    /// Replaces an item's snapshot for conflict resubmission.
    ///
    /// Counts as a failed attempt so repeated conflicts stay bounded by
    /// the same retry budget.
    pub fn requeue_with_base(
        &self,
        item: &QueueItem,
        snapshot: Value,
        error: &str,
    ) -> EngineResult<FailureOutcome> {
        let mut current = self
            .store
            .get_queue_item(&item.kind, item.entity_id)?
            .unwrap_or_else(|| item.clone());
        let action = current.action;
        current.replace(action, snapshot);
        self.store.put_queue_item(current)?;
        self.mark_failure(item, error)
    }

    /// Number of pending items.
    pub fn len(&self) -> EngineResult<usize> {
        self.store.queue_len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> EngineResult<bool> {
        Ok(self.store.queue_len()? == 0)
    }

    /// All pending items in dependency order.
    pub fn status(&self) -> EngineResult<Vec<QueueItem>> {
        self.dequeue_batch(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::JsonAdapter;
    use crate::store::MemoryStore;
    use localsync_protocol::well_known;
    use serde_json::json;

    fn queue_with_ranks() -> SyncQueue<MemoryStore> {
        let mut registry = AdapterRegistry::new();
        // habit definitions are parents of habit records
        registry.register(Arc::new(JsonAdapter::new(well_known::TASKS).with_rank(10)));
        registry.register(Arc::new(
            JsonAdapter::new(well_known::HABIT_RECORDS).with_rank(50),
        ));
        registry.register(Arc::new(JsonAdapter::new(well_known::NOTES)));
        SyncQueue::new(Arc::new(MemoryStore::new()), Arc::new(registry), 3)
    }

    #[test]
    fn enqueue_dedups_per_entity() {
        let queue = queue_with_ranks();
        let entity_id = Uuid::new_v4();

        queue
            .enqueue(
                well_known::NOTES,
                entity_id,
                SyncAction::Upsert,
                json!({"title": "first"}),
            )
            .unwrap();
        queue
            .enqueue(
                well_known::NOTES,
                entity_id,
                SyncAction::Upsert,
                json!({"title": "second"}),
            )
            .unwrap();

        let items = queue.dequeue_batch(10).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].snapshot, json!({"title": "second"}));
    }

    #[test]
    fn delete_overrides_pending_upsert() {
        let queue = queue_with_ranks();
        let entity_id = Uuid::new_v4();

        queue
            .enqueue(
                well_known::NOTES,
                entity_id,
                SyncAction::Upsert,
                json!({"title": "draft"}),
            )
            .unwrap();
        queue
            .enqueue(well_known::NOTES, entity_id, SyncAction::Delete, json!({}))
            .unwrap();

        let items = queue.dequeue_batch(10).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].action, SyncAction::Delete);
    }

    #[test]
    fn dequeue_orders_parents_before_children() {
        let queue = queue_with_ranks();

        // enqueue the child kind first; ordering must still put the
        // parent kind at an equal-or-earlier index
        queue
            .enqueue(
                well_known::HABIT_RECORDS,
                Uuid::new_v4(),
                SyncAction::Upsert,
                json!({"day": "2026-08-20"}),
            )
            .unwrap();
        queue
            .enqueue(
                well_known::TASKS,
                Uuid::new_v4(),
                SyncAction::Upsert,
                json!({"title": "parent"}),
            )
            .unwrap();

        let items = queue.dequeue_batch(10).unwrap();
        assert_eq!(items[0].kind, well_known::TASKS);
        assert_eq!(items[1].kind, well_known::HABIT_RECORDS);
    }

    #[test]
    fn dequeue_is_fifo_within_rank() {
        let queue = queue_with_ranks();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        queue
            .enqueue(well_known::NOTES, first, SyncAction::Upsert, json!({"n": 1}))
            .unwrap();
        queue
            .enqueue(well_known::NOTES, second, SyncAction::Upsert, json!({"n": 2}))
            .unwrap();

        let items = queue.dequeue_batch(10).unwrap();
        assert_eq!(items[0].entity_id, first);
        assert_eq!(items[1].entity_id, second);
    }

    #[test]
    fn bounded_retry_drops_after_exact_budget() {
        let queue = queue_with_ranks();
        let entity_id = Uuid::new_v4();
        queue
            .enqueue(well_known::NOTES, entity_id, SyncAction::Upsert, json!({}))
            .unwrap();
        let item = queue.dequeue_batch(1).unwrap().remove(0);

        // max_retries is 3: two failures retained, third abandons
        assert_eq!(
            queue.mark_failure(&item, "timeout").unwrap(),
            FailureOutcome::Retained { retry_count: 1 }
        );
        assert_eq!(
            queue.mark_failure(&item, "timeout").unwrap(),
            FailureOutcome::Retained { retry_count: 2 }
        );
        assert_eq!(
            queue.mark_failure(&item, "timeout").unwrap(),
            FailureOutcome::Abandoned
        );
        assert_eq!(queue.len().unwrap(), 0);
    }

    #[test]
    fn requeue_with_base_replaces_snapshot_and_counts_attempt() {
        let queue = queue_with_ranks();
        let entity_id = Uuid::new_v4();
        queue
            .enqueue(
                well_known::NOTES,
                entity_id,
                SyncAction::Upsert,
                json!({"version": 3}),
            )
            .unwrap();
        let item = queue.dequeue_batch(1).unwrap().remove(0);

        let outcome = queue
            .requeue_with_base(&item, json!({"version": 5}), "version conflict")
            .unwrap();
        assert_eq!(outcome, FailureOutcome::Retained { retry_count: 1 });

        let items = queue.dequeue_batch(1).unwrap();
        assert_eq!(items[0].snapshot, json!({"version": 5}));
        assert_eq!(items[0].retry_count, 1);
    }
}

//! Remote API collaborator interface.

use crate::error::EngineResult;
use localsync_protocol::{
    BulkSyncRequest, BulkSyncResponse, DeleteResponse, FetchAllResponse, PushResponse,
};
use localsync_protocol::{EntityKind, SyncAction};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// Network operations against the authoritative server.
///
/// This trait abstracts the wire layer so different transports (HTTP,
/// loopback, mock for testing) can back the engine. Futures are `Send`
/// so the engine's background task can be spawned onto a runtime.
pub trait RemoteClient: Send + Sync {
    /// Fetches all entities for a user (initial hydration).
    fn fetch_all(&self, user_id: Uuid)
        -> impl Future<Output = EngineResult<FetchAllResponse>> + Send;

    /// Pushes one entity payload.
    fn push(
        &self,
        kind: &EntityKind,
        payload: &Value,
        user_id: Uuid,
    ) -> impl Future<Output = EngineResult<PushResponse>> + Send;

    /// Deletes one entity (soft delete when `soft` is set).
    fn delete(
        &self,
        kind: &EntityKind,
        entity_id: Uuid,
        soft: bool,
    ) -> impl Future<Output = EngineResult<DeleteResponse>> + Send;

    /// Sends a batch of mutations in one round trip.
    fn bulk_sync(
        &self,
        user_id: Uuid,
        request: BulkSyncRequest,
    ) -> impl Future<Output = EngineResult<BulkSyncResponse>> + Send;

    /// Reachability check; usable without an account context.
    fn ping(&self) -> impl Future<Output = bool> + Send;
}

/// A recorded call made against [`MockRemote`].
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    /// A push of one payload.
    Push(EntityKind, Value),
    /// A delete for one entity.
    Delete(EntityKind, Uuid, bool),
    /// A bulk request as sent.
    Bulk(BulkSyncRequest),
    /// A fetch-all hydration request.
    FetchAll,
}

/// A scripted remote for tests.
///
/// Responses are queued per operation and consumed in order; when a
/// queue runs dry the mock answers with a plain success so happy-path
/// tests stay short.
#[derive(Default)]
pub struct MockRemote {
    online: AtomicBool,
    fetch_all_response: Mutex<Option<FetchAllResponse>>,
    push_responses: Mutex<VecDeque<PushResponse>>,
    delete_responses: Mutex<VecDeque<DeleteResponse>>,
    bulk_responses: Mutex<VecDeque<BulkSyncResponse>>,
    calls: Mutex<Vec<RemoteCall>>,
}

impl MockRemote {
    /// Creates an online mock with no scripted responses.
    pub fn new() -> Self {
        let remote = Self::default();
        remote.online.store(true, Ordering::SeqCst);
        remote
    }

    /// Sets whether the reachability check succeeds.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Sets the fetch-all response.
    pub fn set_fetch_all(&self, response: FetchAllResponse) {
        *self.fetch_all_response.lock() = Some(response);
    }

    /// Queues the next push response.
    pub fn queue_push(&self, response: PushResponse) {
        self.push_responses.lock().push_back(response);
    }

    /// Queues the next delete response.
    pub fn queue_delete(&self, response: DeleteResponse) {
        self.delete_responses.lock().push_back(response);
    }

    /// Queues the next bulk-sync response.
    pub fn queue_bulk(&self, response: BulkSyncResponse) {
        self.bulk_responses.lock().push_back(response);
    }

    /// All calls made so far, in order.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().clone()
    }

    fn record(&self, call: RemoteCall) {
        self.calls.lock().push(call);
    }
}

impl RemoteClient for MockRemote {
    async fn fetch_all(&self, _user_id: Uuid) -> EngineResult<FetchAllResponse> {
        self.record(RemoteCall::FetchAll);
        Ok(self
            .fetch_all_response
            .lock()
            .clone()
            .unwrap_or_default())
    }

    async fn push(
        &self,
        kind: &EntityKind,
        payload: &Value,
        _user_id: Uuid,
    ) -> EngineResult<PushResponse> {
        self.record(RemoteCall::Push(kind.clone(), payload.clone()));
        Ok(self
            .push_responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| PushResponse::ok(1, None)))
    }

    async fn delete(
        &self,
        kind: &EntityKind,
        entity_id: Uuid,
        soft: bool,
    ) -> EngineResult<DeleteResponse> {
        self.record(RemoteCall::Delete(kind.clone(), entity_id, soft));
        Ok(self
            .delete_responses
            .lock()
            .pop_front()
            .unwrap_or_else(DeleteResponse::ok))
    }

    async fn bulk_sync(
        &self,
        _user_id: Uuid,
        request: BulkSyncRequest,
    ) -> EngineResult<BulkSyncResponse> {
        self.record(RemoteCall::Bulk(request.clone()));
        Ok(self.bulk_responses.lock().pop_front().unwrap_or_default())
    }

    async fn ping(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// Builds an upsert snapshot the way callers of the engine do: domain
/// fields plus the sync metadata the wire contract requires.
pub fn upsert_snapshot(entity_id: Uuid, version: i64, updated_at: &str, fields: Value) -> Value {
    let mut snapshot = fields;
    if let Value::Object(map) = &mut snapshot {
        map.insert("id".into(), Value::String(entity_id.to_string()));
        map.insert("version".into(), Value::from(version));
        map.insert("updated_at".into(), Value::String(updated_at.to_string()));
    }
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use localsync_protocol::well_known;
    use serde_json::json;

    #[tokio::test]
    async fn scripted_responses_consume_in_order() {
        let remote = MockRemote::new();
        remote.queue_push(PushResponse::ok(2, None));
        remote.queue_push(PushResponse::error(500, "boom"));

        let user = Uuid::new_v4();
        let first = remote
            .push(&well_known::NOTES, &json!({}), user)
            .await
            .unwrap();
        let second = remote
            .push(&well_known::NOTES, &json!({}), user)
            .await
            .unwrap();
        // queue exhausted, falls back to plain success
        let third = remote
            .push(&well_known::NOTES, &json!({}), user)
            .await
            .unwrap();

        assert_eq!(first.data.unwrap().version, 2);
        assert_eq!(second.status_code, 500);
        assert!(third.success);
        assert_eq!(remote.calls().len(), 3);
    }

    #[tokio::test]
    async fn offline_ping() {
        let remote = MockRemote::new();
        assert!(remote.ping().await);
        remote.set_online(false);
        assert!(!remote.ping().await);
    }

    #[test]
    fn upsert_snapshot_injects_metadata() {
        let id = Uuid::new_v4();
        let snapshot = upsert_snapshot(id, 3, "2026-08-20T12:00:00Z", json!({"title": "x"}));
        assert_eq!(snapshot["id"], json!(id.to_string()));
        assert_eq!(snapshot["version"], json!(3));
        assert_eq!(snapshot["title"], json!("x"));
    }
}

//! HTTP transport for the remote API.
//!
//! [`HttpRemote`] speaks the JSON wire contract over any
//! [`HttpBackend`]. The backend is just "send bytes, get status and
//! bytes back", so applications plug in whatever HTTP client they
//! already ship and tests use a scripted backend.

use crate::error::{EngineError, EngineResult};
use crate::remote::RemoteClient;
use localsync_protocol::{
    is_transient_status, BulkSyncRequest, BulkSyncResponse, DeleteResponse, EntityKind,
    FetchAllResponse, PushResponse, STATUS_OK,
};
use serde_json::Value;
use std::future::Future;
use tracing::debug;
use uuid::Uuid;

/// A raw HTTP response.
#[derive(Debug, Clone)]
pub struct HttpReply {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl HttpReply {
    /// Body as lossy UTF-8, for error messages.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Minimal HTTP client surface the transport needs.
///
/// Implementations own connection pooling, TLS, auth headers and the
/// request timeout; transport-level failures (DNS, refused connection,
/// timeout) are reported as retryable [`EngineError::Transport`].
pub trait HttpBackend: Send + Sync {
    /// Performs one request. JSON bodies are already encoded.
    fn request(
        &self,
        method: &'static str,
        url: &str,
        body: Option<Vec<u8>>,
    ) -> impl Future<Output = EngineResult<HttpReply>> + Send;
}

/// [`RemoteClient`] over an HTTP backend.
pub struct HttpRemote<B> {
    base_url: String,
    backend: B,
}

impl<B: HttpBackend> HttpRemote<B> {
    /// Creates a transport rooted at `base_url` (no trailing slash).
    pub fn new(base_url: impl Into<String>, backend: B) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url, backend }
    }

    /// The configured base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn check_transient(reply: &HttpReply) -> EngineResult<()> {
        if is_transient_status(reply.status) {
            return Err(EngineError::Server {
                status: reply.status,
                message: reply.text(),
            });
        }
        Ok(())
    }
}

impl<B: HttpBackend> RemoteClient for HttpRemote<B> {
    async fn fetch_all(&self, user_id: Uuid) -> EngineResult<FetchAllResponse> {
        let url = format!("{}/sync/entities?user_id={user_id}", self.base_url);
        let reply = self.backend.request("GET", &url, None).await?;
        Self::check_transient(&reply)?;
        Ok(serde_json::from_slice(&reply.body)?)
    }

    async fn push(
        &self,
        kind: &EntityKind,
        payload: &Value,
        user_id: Uuid,
    ) -> EngineResult<PushResponse> {
        let url = format!("{}/sync/{kind}?user_id={user_id}", self.base_url);
        let body = serde_json::to_vec(payload)?;
        let reply = self.backend.request("POST", &url, Some(body)).await?;
        Self::check_transient(&reply)?;

        let mut response: PushResponse = serde_json::from_slice(&reply.body)?;
        // the HTTP status is authoritative over whatever the body says
        response.status_code = reply.status;
        Ok(response)
    }

    async fn delete(
        &self,
        kind: &EntityKind,
        entity_id: Uuid,
        soft: bool,
    ) -> EngineResult<DeleteResponse> {
        let url = format!("{}/sync/{kind}/{entity_id}?soft={soft}", self.base_url);
        let reply = self.backend.request("DELETE", &url, None).await?;
        Self::check_transient(&reply)?;

        // delete outcomes are fully described by the status code
        Ok(DeleteResponse {
            success: reply.status == STATUS_OK,
            status_code: reply.status,
        })
    }

    async fn bulk_sync(
        &self,
        user_id: Uuid,
        request: BulkSyncRequest,
    ) -> EngineResult<BulkSyncResponse> {
        let url = format!("{}/sync/bulk?user_id={user_id}", self.base_url);
        let body = serde_json::to_vec(&request)?;
        let reply = self.backend.request("POST", &url, Some(body)).await?;
        Self::check_transient(&reply)?;
        Ok(serde_json::from_slice(&reply.body)?)
    }

    async fn ping(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.backend.request("GET", &url, None).await {
            Ok(reply) => reply.status == STATUS_OK,
            Err(e) => {
                debug!(error = %e, "health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use localsync_protocol::well_known;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct ScriptedBackend {
        replies: Mutex<VecDeque<EngineResult<HttpReply>>>,
        requests: Mutex<Vec<(&'static str, String, Option<Vec<u8>>)>>,
    }

    impl ScriptedBackend {
        fn reply(self, status: u16, body: Value) -> Self {
            self.replies.lock().push_back(Ok(HttpReply {
                status,
                body: serde_json::to_vec(&body).unwrap(),
            }));
            self
        }

        fn fail(self, error: EngineError) -> Self {
            self.replies.lock().push_back(Err(error));
            self
        }

        fn requests(&self) -> Vec<(&'static str, String, Option<Vec<u8>>)> {
            self.requests.lock().clone()
        }
    }

    impl HttpBackend for ScriptedBackend {
        async fn request(
            &self,
            method: &'static str,
            url: &str,
            body: Option<Vec<u8>>,
        ) -> EngineResult<HttpReply> {
            self.requests.lock().push((method, url.to_string(), body));
            self.replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(HttpReply {
                    status: 200,
                    body: b"{}".to_vec(),
                }))
        }
    }

    #[tokio::test]
    async fn push_decodes_envelope_and_keeps_http_status() {
        let backend = ScriptedBackend::default().reply(
            200,
            json!({"success": true, "data": {"version": 4}, "status_code": 0}),
        );
        let remote = HttpRemote::new("https://sync.example/api/", backend);

        let user = Uuid::new_v4();
        let response = remote
            .push(&well_known::NOTES, &json!({"title": "x"}), user)
            .await
            .unwrap();

        assert!(response.success);
        assert_eq!(response.data.unwrap().version, 4);
        assert_eq!(response.status_code, 200);

        let requests = remote.backend.requests();
        assert_eq!(requests[0].0, "POST");
        assert_eq!(
            requests[0].1,
            format!("https://sync.example/api/sync/notes?user_id={user}")
        );
        assert!(requests[0].2.is_some());
    }

    #[tokio::test]
    async fn delete_maps_status_codes() {
        let backend = ScriptedBackend::default().reply(404, json!({}));
        let remote = HttpRemote::new("https://sync.example", backend);

        let response = remote
            .delete(&well_known::TASKS, Uuid::new_v4(), true)
            .await
            .unwrap();

        assert!(!response.success);
        assert_eq!(response.status_code, 404);
        assert!(response.is_satisfied());
    }

    #[tokio::test]
    async fn transient_server_status_is_a_retryable_error() {
        let backend = ScriptedBackend::default().reply(503, json!({"error": "maintenance"}));
        let remote = HttpRemote::new("https://sync.example", backend);

        let err = remote
            .push(&well_known::NOTES, &json!({}), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn ping_is_false_on_transport_error() {
        let backend =
            ScriptedBackend::default().fail(EngineError::transport_retryable("connection refused"));
        let remote = HttpRemote::new("https://sync.example", backend);
        assert!(!remote.ping().await);

        let backend = ScriptedBackend::default().reply(200, json!({"status": "ok"}));
        let remote = HttpRemote::new("https://sync.example", backend);
        assert!(remote.ping().await);
    }

    #[tokio::test]
    async fn fetch_all_decodes_items() {
        let id = Uuid::new_v4();
        let backend = ScriptedBackend::default().reply(
            200,
            json!({
                "items": [{
                    "kind": "notes",
                    "id": id.to_string(),
                    "version": 2,
                    "payload": {"title": "hello"}
                }],
                "count": 1
            }),
        );
        let remote = HttpRemote::new("https://sync.example", backend);

        let response = remote.fetch_all(Uuid::new_v4()).await.unwrap();
        assert_eq!(response.count, 1);
        assert_eq!(response.items[0].kind, well_known::NOTES);
        assert_eq!(response.items[0].version, 2);
    }
}

//! Typed API client
//!
//! Wraps a transport with the backend's response conventions:
//! - 401 tears the session down and fails with `SessionExpired`
//! - other non-2xx statuses become `ApiError::Http` parsed from the body
//! - 204 and empty bodies decode from `null`
//! - a bare `{ "data": ... }` envelope is unwrapped
//!
//! Mutations run one at a time. When an offline queue is attached, a
//! mutation that cannot reach the server is queued instead of failing.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::app::offline_queue::{FlushReport, OfflineQueue, QueuedMutation};
use crate::app::retry::RetryPolicy;
use crate::domain::ports::{ApiRequest, ApiResponse, ApiTransport, Method};
use crate::error::{ApiError, ErrorKind};

/// Keys allowed next to `data` for a body to count as an envelope.
const ENVELOPE_KEYS: &[&str] = &["data", "success", "message", "meta"];

/// Called once per 401 before `SessionExpired` is returned.
#[async_trait]
pub trait SessionExpiryHandler: Send + Sync {
    async fn on_session_expired(&self);
}

#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome<R> {
    Applied(R),
    /// Server unreachable; replayed by a later flush.
    Queued(QueuedMutation),
}

impl<R> MutationOutcome<R> {
    pub fn applied(self) -> Option<R> {
        match self {
            MutationOutcome::Applied(value) => Some(value),
            MutationOutcome::Queued(_) => None,
        }
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, MutationOutcome::Queued(_))
    }
}

pub struct ApiClient<T> {
    transport: T,
    retry: Option<RetryPolicy>,
    mutation_lock: Mutex<()>,
    session_expiry: Option<Arc<dyn SessionExpiryHandler>>,
    offline_queue: Option<OfflineQueue>,
}

impl<T: ApiTransport> ApiClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            retry: None,
            mutation_lock: Mutex::new(()),
            session_expiry: None,
            offline_queue: None,
        }
    }

    /// Retry GET requests with `policy`. Mutations are never retried.
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn with_session_expiry(mut self, handler: Arc<dyn SessionExpiryHandler>) -> Self {
        self.session_expiry = Some(handler);
        self
    }

    pub fn with_offline_queue(mut self, queue: OfflineQueue) -> Self {
        self.offline_queue = Some(queue);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn offline_queue(&self) -> Option<&OfflineQueue> {
        self.offline_queue.as_ref()
    }

    /// Send without decoding. Non-2xx statuses are returned as responses,
    /// except that a retried GET still answering 5xx or 429 after the last
    /// attempt fails with `ApiError::Http`.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        if request.method.is_mutation() {
            let _guard = self.mutation_lock.lock().await;
            return self.transport.send(request).await;
        }

        let Some(policy) = &self.retry else {
            return self.transport.send(request).await;
        };

        let transport = &self.transport;
        let request = &request;
        policy
            .run(move || async move {
                let response = transport.send(request.clone()).await?;
                if is_transient_status(response.status) {
                    return Err(error_from_response(&response));
                }
                Ok(response)
            })
            .await
    }

    pub async fn request<R: DeserializeOwned>(&self, request: ApiRequest) -> Result<R, ApiError> {
        let response = self.send(request).await?;
        self.decode(response).await
    }

    pub async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R, ApiError> {
        self.request(ApiRequest::get(path)).await
    }

    pub async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, ApiError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.request(ApiRequest::post(path).json(body)?).await
    }

    pub async fn put<B, R>(&self, path: &str, body: &B) -> Result<R, ApiError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.request(ApiRequest::new(Method::Put, path).json(body)?)
            .await
    }

    pub async fn patch<B, R>(&self, path: &str, body: &B) -> Result<R, ApiError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.request(ApiRequest::new(Method::Patch, path).json(body)?)
            .await
    }

    pub async fn delete<R: DeserializeOwned>(&self, path: &str) -> Result<R, ApiError> {
        self.request(ApiRequest::delete(path)).await
    }

    /// Send a mutation, queueing it when the server is unreachable and a
    /// queue is attached.
    pub async fn mutate<R: DeserializeOwned>(
        &self,
        request: ApiRequest,
    ) -> Result<MutationOutcome<R>, ApiError> {
        match self.send(request.clone()).await {
            Ok(response) => self.decode(response).await.map(MutationOutcome::Applied),
            Err(e) if e.is_network() => match &self.offline_queue {
                Some(queue) => Ok(MutationOutcome::Queued(queue.enqueue(&request)?)),
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    /// Replay queued mutations while holding the mutation lock.
    pub async fn flush_offline_queue(&self) -> Result<FlushReport, ApiError> {
        let Some(queue) = &self.offline_queue else {
            return Ok(FlushReport::default());
        };
        let _guard = self.mutation_lock.lock().await;
        queue.flush(&self.transport).await
    }

    async fn decode<R: DeserializeOwned>(&self, response: ApiResponse) -> Result<R, ApiError> {
        if response.status == 401 {
            tracing::warn!("Session expired (401)");
            if let Some(handler) = &self.session_expiry {
                handler.on_session_expired().await;
            }
            return Err(ApiError::SessionExpired);
        }

        if !response.is_success() {
            return Err(error_from_response(&response));
        }

        decode_body(&response)
    }
}

fn is_transient_status(status: u16) -> bool {
    status >= 500 || status == 429
}

/// Decode a successful body, treating 204 and blank bodies as `null`.
pub fn decode_body<R: DeserializeOwned>(response: &ApiResponse) -> Result<R, ApiError> {
    let value = if response.status == 204 || response.body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        response.json::<Value>()?
    };

    serde_json::from_value(unwrap_envelope(value))
        .map_err(|e| ApiError::Deserialization(e.to_string()))
}

fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map)
            if map.contains_key("data")
                && map.keys().all(|k| ENVELOPE_KEYS.contains(&k.as_str())) =>
        {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Build an `ApiError::Http` from an error response. Understands
/// `{error: {message, type, details}}`, `{error: "text", message?}` and
/// `{message}`.
pub fn error_from_response(response: &ApiResponse) -> ApiError {
    let body: Option<Value> = serde_json::from_slice(&response.body).ok();
    let text = |v: Option<&Value>| v.and_then(Value::as_str).map(str::to_string);

    let (message, kind, details) = match &body {
        Some(body) => match body.get("error") {
            Some(Value::Object(err)) => (
                text(err.get("message")),
                text(err.get("type")),
                err.get("details").cloned(),
            ),
            Some(Value::String(err)) => (
                text(body.get("message")).or_else(|| Some(err.clone())),
                None,
                body.get("details").cloned(),
            ),
            _ => (text(body.get("message")), None, body.get("details").cloned()),
        },
        None => (
            Some(
                format!("API error: {} {}", response.status, response.status_text)
                    .trim_end()
                    .to_string(),
            ),
            None,
            None,
        ),
    };

    ApiError::Http {
        status: response.status,
        kind: ErrorKind::classify(kind.as_deref(), response.status),
        message: message.unwrap_or_else(|| format!("API error: {}", response.status)),
        details,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::LocalStore;
    use crate::test_utils::ScriptedTransport;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: u32,
    }

    struct CountingExpiry(AtomicU32);

    #[async_trait]
    impl SessionExpiryHandler for CountingExpiry {
        async fn on_session_expired(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn decodes_plain_and_enveloped_bodies() {
        let transport = ScriptedTransport::new();
        transport.push_response(ApiResponse::json_body(200, &json!({"id": 1})));
        transport.push_response(ApiResponse::json_body(
            200,
            &json!({"success": true, "data": {"id": 2}}),
        ));
        let client = ApiClient::new(transport);

        assert_eq!(client.get::<Item>("/api/items/1").await.unwrap(), Item { id: 1 });
        assert_eq!(client.get::<Item>("/api/items/2").await.unwrap(), Item { id: 2 });
    }

    #[tokio::test]
    async fn no_content_decodes_as_unit() {
        let transport = ScriptedTransport::new();
        transport.push_response(ApiResponse::new(204, Vec::new()));
        let client = ApiClient::new(transport);

        let result: Option<Item> = client.delete("/api/items/1").await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn unauthorized_runs_expiry_hook() {
        let transport = ScriptedTransport::new();
        transport.push_response(ApiResponse::json_body(401, &json!({"error": "unauthorized"})));
        let hook = Arc::new(CountingExpiry(AtomicU32::new(0)));
        let client = ApiClient::new(transport).with_session_expiry(hook.clone());

        let err = client.get::<Value>("/api/focus/active").await.unwrap_err();
        assert!(matches!(err, ApiError::SessionExpired));
        assert_eq!(hook.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn parses_nested_error_body() {
        let response = ApiResponse::json_body(
            422,
            &json!({"error": {"message": "Title required", "type": "validation_error",
                              "details": [{"field": "title", "message": "required"}]}}),
        );
        let err = error_from_response(&response);
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "API error: 422 - Title required");
        assert_eq!(err.field_errors().len(), 1);
    }

    #[test]
    fn parses_flat_error_bodies() {
        let err = error_from_response(&ApiResponse::json_body(
            503,
            &json!({"error": "Internal Server Error", "message": "upstream down"}),
        ));
        assert_eq!(err.to_string(), "API error: 503 - upstream down");

        let err = error_from_response(&ApiResponse::json_body(404, &json!({"message": "gone"})));
        assert!(err.is_not_found());

        let err = error_from_response(
            &ApiResponse::new(502, "<html>").with_status_text("Bad Gateway"),
        );
        assert_eq!(err.to_string(), "API error: 502 - API error: 502 Bad Gateway");
    }

    #[tokio::test]
    async fn get_is_retried_with_policy() {
        let transport = ScriptedTransport::new();
        transport.push_error(ApiError::Network("reset".into()));
        transport.push_response(ApiResponse::json_body(200, &json!({"id": 9})));
        let client = ApiClient::new(transport).with_retry(RetryPolicy::new(
            2,
            Duration::from_millis(1),
            Duration::from_millis(1),
        ));

        assert_eq!(client.get::<Item>("/api/items/9").await.unwrap(), Item { id: 9 });
        assert_eq!(client.transport().requests().len(), 2);
    }

    #[tokio::test]
    async fn get_is_retried_on_server_errors_and_rate_limits() {
        let transport = ScriptedTransport::new();
        transport.push_response(ApiResponse::json_body(503, &json!({"error": "unavailable"})));
        transport.push_response(ApiResponse::json_body(429, &json!({"error": "slow down"})));
        transport.push_response(ApiResponse::json_body(200, &json!({"id": 4})));
        let client = ApiClient::new(transport).with_retry(RetryPolicy::new(
            3,
            Duration::from_millis(1),
            Duration::from_millis(1),
        ));

        assert_eq!(client.get::<Item>("/api/items/4").await.unwrap(), Item { id: 4 });
        assert_eq!(client.transport().requests().len(), 3);
    }

    #[tokio::test]
    async fn get_gives_up_after_max_retries() {
        let transport = ScriptedTransport::new();
        for _ in 0..3 {
            transport.push_response(ApiResponse::json_body(502, &json!({"message": "bad gateway"})));
        }
        let client = ApiClient::new(transport).with_retry(RetryPolicy::new(
            2,
            Duration::from_millis(1),
            Duration::from_millis(1),
        ));

        let err = client.get::<Item>("/api/items/5").await.unwrap_err();
        assert_eq!(err.status(), 502);
        assert_eq!(client.transport().requests().len(), 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let transport = ScriptedTransport::new();
        transport.push_response(ApiResponse::json_body(404, &json!({"message": "gone"})));
        let client = ApiClient::new(transport).with_retry(RetryPolicy::new(
            3,
            Duration::from_millis(1),
            Duration::from_millis(1),
        ));

        let err = client.get::<Item>("/api/items/6").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(client.transport().requests().len(), 1);
    }

    #[tokio::test]
    async fn mutations_are_not_retried() {
        let transport = ScriptedTransport::new();
        transport.push_error(ApiError::Network("reset".into()));
        let client = ApiClient::new(transport).with_retry(RetryPolicy::default());

        let result: Result<Value, _> = client.post("/api/items", &json!({})).await;
        assert!(result.unwrap_err().is_network());
        assert_eq!(client.transport().requests().len(), 1);
    }

    #[tokio::test]
    async fn offline_mutation_is_queued() {
        let transport = ScriptedTransport::new();
        transport.set_offline(true);
        let queue = OfflineQueue::new(Arc::new(LocalStore::in_memory()));
        let client = ApiClient::new(transport).with_offline_queue(queue);

        let request = ApiRequest::post("/api/focus").json(&json!({"mode": "focus"})).unwrap();
        let outcome: MutationOutcome<Value> = client.mutate(request).await.unwrap();
        assert!(outcome.is_queued());
        assert_eq!(client.offline_queue().unwrap().pending().unwrap().len(), 1);

        client.transport().set_offline(false);
        client
            .transport()
            .push_response(ApiResponse::json_body(201, &json!({})));
        let report = client.flush_offline_queue().await.unwrap();
        assert_eq!(report.replayed, 1);
        assert_eq!(report.remaining, 0);
    }

    #[tokio::test]
    async fn offline_encrypted_write_is_blocked() {
        let transport = ScriptedTransport::new();
        transport.set_offline(true);
        let queue = OfflineQueue::new(Arc::new(LocalStore::in_memory()));
        let client = ApiClient::new(transport).with_offline_queue(queue);

        let request = ApiRequest::post("/api/ideas").json(&json!({"body": "x"})).unwrap();
        let err = client.mutate::<Value>(request).await.unwrap_err();
        assert!(matches!(err, ApiError::OfflineBlocked(_)));
        assert_eq!(err.status(), 409);
    }
}

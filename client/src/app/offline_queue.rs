//! Offline mutation queue
//!
//! Mutations that fail because the server is unreachable are stored in the
//! key-value store and replayed in order later. Paths carrying end-to-end
//! encrypted content are never queued.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::ports::{ApiRequest, ApiTransport, KeyValueStore, Method};
use crate::error::{ApiError, StorageError};

/// Store key holding the queued mutations
pub const QUEUE_KEY: &str = "offline_mutation_queue";

/// Path prefixes whose writes must never be replayed from local storage.
pub const BLOCKED_PREFIXES: &[&str] = &[
    "/api/infobase",
    "/api/ideas",
    "/api/learn/journal",
    "/api/reference",
    "/api/references",
    "/reference",
    "/references",
];

pub fn is_queueable(request: &ApiRequest) -> bool {
    let path = request.pathname();
    !BLOCKED_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMutation {
    pub id: Uuid,
    pub method: Method,
    pub path: String,
    #[serde(default)]
    pub query: Vec<(String, String)>,
    #[serde(default)]
    pub body: Option<Value>,
    pub queued_at: DateTime<Utc>,
}

impl QueuedMutation {
    fn from_request(request: &ApiRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            method: request.method,
            path: request.path.clone(),
            query: request.query.clone(),
            body: request.body.clone(),
            queued_at: Utc::now(),
        }
    }

    fn to_request(&self) -> ApiRequest {
        let mut request = ApiRequest::new(self.method, self.path.clone());
        request.query = self.query.clone();
        request.body = self.body.clone();
        request
    }
}

/// Result of replaying the queue
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlushReport {
    pub replayed: usize,
    pub dropped: usize,
    pub remaining: usize,
}

#[derive(Clone)]
pub struct OfflineQueue {
    store: Arc<dyn KeyValueStore>,
}

impl OfflineQueue {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn pending(&self) -> Result<Vec<QueuedMutation>, StorageError> {
        match self.store.get(QUEUE_KEY)? {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| {
                StorageError::Corrupt(format!("offline queue: {}", e))
            }),
            None => Ok(Vec::new()),
        }
    }

    /// Append a mutation. Blocked paths are refused with `OfflineBlocked`.
    pub fn enqueue(&self, request: &ApiRequest) -> Result<QueuedMutation, ApiError> {
        if !is_queueable(request) {
            return Err(ApiError::OfflineBlocked(request.pathname().to_string()));
        }

        let entry = QueuedMutation::from_request(request);
        let mut pending = self.pending()?;
        pending.push(entry.clone());
        self.save(&pending)?;

        tracing::info!(
            method = %entry.method,
            path = %entry.path,
            queued = pending.len(),
            "Mutation queued for replay"
        );
        Ok(entry)
    }

    /// Replay queued mutations in order. Stops at the first failure to
    /// reach the server; entries the server rejects with a 4xx are dropped.
    pub async fn flush<T: ApiTransport + ?Sized>(
        &self,
        transport: &T,
    ) -> Result<FlushReport, ApiError> {
        let mut pending = self.pending()?;
        let mut report = FlushReport::default();

        while let Some(entry) = pending.first().cloned() {
            match transport.send(entry.to_request()).await {
                Ok(response) if response.is_success() => {
                    report.replayed += 1;
                }
                Ok(response) if (400..500).contains(&response.status) => {
                    tracing::warn!(
                        path = %entry.path,
                        status = response.status,
                        "Dropping queued mutation rejected by server"
                    );
                    report.dropped += 1;
                }
                Ok(response) => {
                    tracing::warn!(
                        path = %entry.path,
                        status = response.status,
                        "Server error while replaying, keeping queue"
                    );
                    break;
                }
                Err(e) if e.is_network() => {
                    tracing::info!(error = %e, "Still offline, keeping queue");
                    break;
                }
                Err(e) => return Err(e),
            }
            pending.remove(0);
            self.save(&pending)?;
        }

        report.remaining = pending.len();
        Ok(report)
    }

    fn save(&self, pending: &[QueuedMutation]) -> Result<(), StorageError> {
        if pending.is_empty() {
            self.store.remove(QUEUE_KEY)
        } else {
            self.store.set(QUEUE_KEY, &serde_json::to_string(pending)?)
        }
    }
}

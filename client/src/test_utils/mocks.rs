//! Mock implementations of port traits
//!
//! In-memory stand-ins that can be scripted per test and inspected
//! afterwards.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;

use crate::domain::ports::{
    ApiRequest, ApiResponse, ApiTransport, Method, SettingsEvent, SettingsFeed,
};
use crate::error::{ApiError, SyncError};

// ============================================================================
// Scripted Transport
// ============================================================================

/// Transport that answers from a script.
///
/// Queued responses are consumed first, in order. After that, routes
/// registered with [`ScriptedTransport::route`] answer by method and path.
/// Anything else gets a 404. While offline every request fails with a
/// network error.
#[derive(Default)]
pub struct ScriptedTransport {
    queued: Arc<Mutex<VecDeque<Result<ApiResponse, ApiError>>>>,
    routes: Arc<RwLock<Vec<(Method, String, ApiResponse)>>>,
    requests: Arc<RwLock<Vec<ApiRequest>>>,
    offline: AtomicBool,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, response: ApiResponse) {
        self.queued.lock().unwrap().push_back(Ok(response));
    }

    pub fn push_error(&self, error: ApiError) {
        self.queued.lock().unwrap().push_back(Err(error));
    }

    /// Answer every `method path` request with `response`, replacing any
    /// earlier route for the same pair.
    pub fn route(&self, method: Method, path: &str, response: ApiResponse) {
        let mut routes = self.routes.write().unwrap();
        routes.retain(|(m, p, _)| !(*m == method && p == path));
        routes.push((method, path.to_string(), response));
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.read().unwrap().clone()
    }

    pub fn requests_to(&self, method: Method, path: &str) -> usize {
        self.requests
            .read()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.pathname() == path)
            .count()
    }
}

#[async_trait]
impl ApiTransport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        self.requests.write().unwrap().push(request.clone());

        if self.offline.load(Ordering::SeqCst) {
            return Err(ApiError::Network("offline".into()));
        }

        if let Some(next) = self.queued.lock().unwrap().pop_front() {
            return next;
        }

        let routes = self.routes.read().unwrap();
        Ok(routes
            .iter()
            .find(|(m, p, _)| *m == request.method && p == request.pathname())
            .map(|(_, _, response)| response.clone())
            .unwrap_or_else(|| {
                ApiResponse::json_body(404, &serde_json::json!({"error": "not found"}))
            }))
    }
}

// ============================================================================
// Scripted Settings Feed
// ============================================================================

/// Settings feed whose connections are driven by the test.
///
/// Each successful `connect` hands the test the sending half through
/// [`ScriptedSettingsFeed::take_connection`]; dropping it closes the
/// connection.
#[derive(Default)]
pub struct ScriptedSettingsFeed {
    refuse: AtomicBool,
    connects: Mutex<u32>,
    connections: Mutex<VecDeque<mpsc::Sender<Result<SettingsEvent, SyncError>>>>,
}

impl ScriptedSettingsFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed that refuses every connection attempt
    pub fn refusing() -> Self {
        let feed = Self::default();
        feed.refuse.store(true, Ordering::SeqCst);
        feed
    }

    pub fn connect_count(&self) -> u32 {
        *self.connects.lock().unwrap()
    }

    pub fn take_connection(&self) -> Option<mpsc::Sender<Result<SettingsEvent, SyncError>>> {
        self.connections.lock().unwrap().pop_front()
    }
}

#[async_trait]
impl SettingsFeed for ScriptedSettingsFeed {
    async fn connect(
        &self,
    ) -> Result<mpsc::Receiver<Result<SettingsEvent, SyncError>>, SyncError> {
        *self.connects.lock().unwrap() += 1;
        if self.refuse.load(Ordering::SeqCst) {
            return Err(SyncError::Connect("connection refused".into()));
        }
        let (tx, rx) = mpsc::channel(16);
        self.connections.lock().unwrap().push_back(tx);
        Ok(rx)
    }
}

//! Mock implementations of port traits

use async_trait::async_trait;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use std::collections::HashSet;
use std::sync::RwLock;

use crate::domain::entities::{ForwardRequest, ForwardResponse};
use crate::domain::ports::Upstream;
use crate::error::UpstreamError;

// ============================================================================
// Mock Upstream
// ============================================================================

/// Records every forwarded request. Unless told otherwise each instance
/// answers 200 with `{"instance": i, "path": "..."}`.
#[derive(Default)]
pub struct MockUpstream {
    instances: usize,
    calls: RwLock<Vec<(usize, ForwardRequest)>>,
    failing: RwLock<HashSet<usize>>,
    canned: RwLock<Option<ForwardResponse>>,
}

impl MockUpstream {
    pub fn new(instances: usize) -> Self {
        Self {
            instances,
            ..Self::default()
        }
    }

    /// Make `instance` fail with a connection error
    pub fn fail_instance(&self, instance: usize) {
        self.failing.write().unwrap().insert(instance);
    }

    /// Answer every request with `response`
    pub fn respond_with(&self, response: ForwardResponse) {
        *self.canned.write().unwrap() = Some(response);
    }

    pub fn instances_called(&self) -> Vec<usize> {
        self.calls.read().unwrap().iter().map(|(i, _)| *i).collect()
    }

    pub fn paths_called(&self) -> Vec<String> {
        self.calls
            .read()
            .unwrap()
            .iter()
            .map(|(_, r)| r.path_and_query.clone())
            .collect()
    }

    pub fn last_request(&self) -> Option<ForwardRequest> {
        self.calls.read().unwrap().last().map(|(_, r)| r.clone())
    }
}

#[async_trait]
impl Upstream for MockUpstream {
    fn instance_count(&self) -> usize {
        self.instances
    }

    async fn forward(
        &self,
        instance: usize,
        request: ForwardRequest,
    ) -> Result<ForwardResponse, UpstreamError> {
        if instance >= self.instances {
            return Err(UpstreamError::UnknownInstance(instance));
        }
        let path = request.path_and_query.clone();
        self.calls.write().unwrap().push((instance, request));

        if self.failing.read().unwrap().contains(&instance) {
            return Err(UpstreamError::Unavailable(format!(
                "instance {} refused connection",
                instance
            )));
        }
        if let Some(canned) = self.canned.read().unwrap().clone() {
            return Ok(canned);
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        let body = serde_json::json!({ "instance": instance, "path": path });
        Ok(ForwardResponse {
            status: StatusCode::OK,
            headers,
            body: body.to_string().into(),
        })
    }
}

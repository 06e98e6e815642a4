//! Test fixtures

use axum_test::TestServer;
use std::sync::Arc;

use crate::app::ForwardService;
use crate::handlers::{router, AppState};
use crate::test_utils::MockUpstream;

pub const TEST_SERVICE: &str = "ignition-api";

pub fn test_state(upstream: Arc<MockUpstream>) -> AppState {
    AppState {
        forwarder: Arc::new(ForwardService::new(upstream)),
        service_name: Arc::from(TEST_SERVICE),
    }
}

pub fn test_server(upstream: Arc<MockUpstream>) -> TestServer {
    TestServer::new(router(test_state(upstream))).unwrap()
}

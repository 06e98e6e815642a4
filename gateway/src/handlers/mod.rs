//! HTTP handlers
//!
//! The health check is answered locally; every other request goes to the
//! upstream pool.

pub mod health;
pub mod proxy;

use std::sync::Arc;

use axum::{routing::any, Router};

use crate::app::ForwardService;

pub use health::health;
pub use proxy::{preflight, proxy};

/// State shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub forwarder: Arc<ForwardService>,
    pub service_name: Arc<str>,
}

/// Routes without middleware; `main` adds tracing and rate limiting.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", any(health))
        .route("/health", any(health))
        .fallback(proxy)
        .with_state(state)
}

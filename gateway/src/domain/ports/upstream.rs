//! Upstream port
//!
//! A fixed pool of backend instances addressed by index.

use async_trait::async_trait;

use crate::domain::entities::{ForwardRequest, ForwardResponse};
use crate::error::UpstreamError;

#[async_trait]
pub trait Upstream: Send + Sync {
    /// Number of instances in the pool
    fn instance_count(&self) -> usize;

    /// Send `request` to instance `instance` (`0..instance_count()`).
    /// Any status the instance answers with is a response, not an error.
    async fn forward(
        &self,
        instance: usize,
        request: ForwardRequest,
    ) -> Result<ForwardResponse, UpstreamError>;
}

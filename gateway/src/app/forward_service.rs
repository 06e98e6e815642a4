//! Forwarding service
//!
//! Picks the next instance for every request and hands it to the upstream.
//! The keep-alive task goes through the same rotation so every instance
//! gets pinged in turn.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::app::balancer::RoundRobin;
use crate::domain::entities::{ForwardRequest, ForwardResponse};
use crate::domain::ports::Upstream;
use crate::error::UpstreamError;

pub struct ForwardService {
    upstream: Arc<dyn Upstream>,
    balancer: RoundRobin,
}

impl ForwardService {
    pub fn new(upstream: Arc<dyn Upstream>) -> Self {
        let balancer = RoundRobin::new(upstream.instance_count());
        Self { upstream, balancer }
    }

    pub fn instances(&self) -> usize {
        self.balancer.instances()
    }

    pub async fn forward(&self, request: ForwardRequest) -> Result<ForwardResponse, UpstreamError> {
        let instance = self.balancer.next().ok_or(UpstreamError::NoInstances)?;
        tracing::debug!(
            instance,
            method = %request.method,
            path = %request.path_and_query,
            "Forwarding request"
        );
        self.upstream.forward(instance, request).await
    }

    /// `GET /health` on the next instance.
    pub async fn ping(&self) -> Result<StatusCode, UpstreamError> {
        self.forward(ForwardRequest::health_check())
            .await
            .map(|response| response.status)
    }
}

/// Ping an instance every `interval` until `shutdown` turns true or its
/// sender is dropped. The first ping waits one full interval.
pub async fn run_keep_alive(
    service: Arc<ForwardService>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tracing::info!(at = %chrono::Utc::now().to_rfc3339(), "Keep-alive ping triggered");
                match service.ping().await {
                    Ok(status) => tracing::info!(status = status.as_u16(), "Keep-alive ping successful"),
                    Err(e) => tracing::warn!(error = %e, "Keep-alive ping failed"),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    tracing::debug!("Keep-alive stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockUpstream;

    #[tokio::test]
    async fn forwards_in_rotation() {
        let upstream = Arc::new(MockUpstream::new(2));
        let service = ForwardService::new(upstream.clone());

        for _ in 0..3 {
            service
                .forward(ForwardRequest::new(axum::http::Method::GET, "/api/settings"))
                .await
                .unwrap();
        }

        assert_eq!(upstream.instances_called(), vec![0, 1, 0]);
    }

    #[tokio::test]
    async fn empty_pool_is_an_error() {
        let service = ForwardService::new(Arc::new(MockUpstream::new(0)));
        let result = service.ping().await;
        assert!(matches!(result, Err(UpstreamError::NoInstances)));
    }

    #[tokio::test]
    async fn keep_alive_pings_until_shutdown() {
        let upstream = Arc::new(MockUpstream::new(3));
        let service = Arc::new(ForwardService::new(upstream.clone()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(run_keep_alive(
            service,
            Duration::from_millis(10),
            shutdown_rx,
        ));

        tokio::time::timeout(Duration::from_secs(2), async {
            while upstream.paths_called().len() < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        shutdown_tx.send(true).unwrap();
        tokio_test::assert_ok!(tokio::time::timeout(Duration::from_secs(2), task).await);

        let calls = upstream.instances_called();
        assert_eq!(&calls[..3], &[0, 1, 2]);
        assert!(upstream.paths_called().iter().all(|p| p == "/health"));
    }

    #[tokio::test]
    async fn failed_ping_keeps_running() {
        let upstream = Arc::new(MockUpstream::new(1));
        upstream.fail_instance(0);
        let service = Arc::new(ForwardService::new(upstream.clone()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(run_keep_alive(
            service,
            Duration::from_millis(10),
            shutdown_rx,
        ));

        tokio::time::timeout(Duration::from_secs(2), async {
            while upstream.paths_called().len() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        drop(shutdown_tx);
        tokio_test::assert_ok!(tokio::time::timeout(Duration::from_secs(2), task).await);
    }
}

//! Ignition API Gateway
//!
//! Fronts a small pool of backend instances: answers health checks and CORS
//! preflights itself and forwards everything else round-robin. A background
//! task pings the pool so idle instances stay warm.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tower_governor::GovernorLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod adapters;
mod app;
mod config;
mod domain;
mod error;
mod handlers;

#[cfg(test)]
mod test_utils;

use adapters::HttpUpstream;
use app::{run_keep_alive, ForwardService};
use config::Config;
use handlers::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ignition_gateway=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Ignition gateway...");

    let config = Config::from_env();
    tracing::info!(
        instances = config.upstream_urls.len(),
        upstreams = ?config.upstream_urls,
        "Upstream pool configured"
    );

    let upstream = Arc::new(
        HttpUpstream::new(config.upstream_urls.clone(), config.upstream_timeout)
            .context("Failed to build upstream client")?,
    );
    let forwarder = Arc::new(ForwardService::new(upstream));
    tracing::debug!(instances = forwarder.instances(), "Round-robin ready");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let keep_alive = config.keep_alive.map(|interval| {
        tracing::info!(interval_secs = interval.as_secs(), "Keep-alive enabled");
        tokio::spawn(run_keep_alive(forwarder.clone(), interval, shutdown_rx))
    });

    let state = AppState {
        forwarder,
        service_name: Arc::from(config.service_name.as_str()),
    };

    let mut app = handlers::router(state).layer(TraceLayer::new_for_http());

    // PeerIpKeyExtractor keys on the socket address, hence the connect info below
    if let Some(limit) = config.rate_limit {
        let governor_config = Arc::new(
            GovernorConfigBuilder::default()
                .key_extractor(PeerIpKeyExtractor)
                .per_second(limit.per_second)
                .burst_size(limit.burst)
                .finish()
                .context("Invalid rate limit settings")?,
        );
        tracing::info!(
            per_second = limit.per_second,
            burst = limit.burst,
            "Rate limiting enabled"
        );
        app = app.layer(GovernorLayer {
            config: governor_config,
        });
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    let _ = shutdown_tx.send(true);
    if let Some(task) = keep_alive {
        let _ = task.await;
    }
    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

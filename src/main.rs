//! # GridPulse - Telemetry Server
//!
//! Standalone server exposing the telemetry core's read-only query surface
//! over HTTP, with the background sampling and evaluation ticks running.

use gridpulse::{AggregatorLayer, TelemetryConfig, TelemetryHub};
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from CLI args and .env file
    let config = TelemetryConfig::parse_args();
    config.validate()?;

    let hub = TelemetryHub::new(config.clone());

    // Mirror every log event into the in-memory aggregator alongside the
    // console subscriber
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .with(AggregatorLayer::new(hub.logs().clone()))
        .init();

    // Record panics as critical failures before the process unwinds
    hub.errors().install_panic_hook();

    let tick_handles = hub.start();

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("🚀 GridPulse telemetry server starting on http://{}", addr);
    info!(
        default_rules = config.install_default_rules,
        max_alerts = config.max_alerts,
        max_errors = config.max_errors,
        "telemetry core configured"
    );

    let app = hub.router();
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let shutdown = hub.shutdown_handle();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.wait_for_signal().await })
        .await?;

    // Drain the background ticks before exiting
    hub.stop();
    for handle in tick_handles {
        let _ = handle.await;
    }
    info!("GridPulse telemetry server stopped");

    Ok(())
}

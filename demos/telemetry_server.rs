//! # GridPulse - Telemetry Server Example
//!
//! Minimal server exposing the query surface with background ticks running,
//! equivalent to the `gridpulse` binary with default configuration.

use gridpulse::{AggregatorLayer, TelemetryConfig, TelemetryHub};
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = TelemetryConfig::parse_args();
    config.validate()?;

    let hub = TelemetryHub::new(config.clone());

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .with(AggregatorLayer::new(hub.logs().clone()))
        .init();

    hub.errors().install_panic_hook();
    let _ticks = hub.start();

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("GridPulse query surface listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, hub.router()).await?;

    Ok(())
}

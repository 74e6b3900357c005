//! Ordercast relay binary.
//!
//! Entry point for the event channel and broadcast ingress server.

use anyhow::Context;
use ordercast_relay::{RelayConfig, Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ordercast_relay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = RelayConfig::from_env().context("invalid relay configuration")?;

    tracing::info!(
        "Starting Ordercast relay on {}:{}",
        config.host,
        config.port
    );

    let server = Server::new(config)?;
    server.run(shutdown_signal()).await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

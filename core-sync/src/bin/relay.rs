//! Standalone relay binary.
//!
//! Runs the rendezvous relay on its own, for setups where the host replica
//! should not double as the hub. Usage: `relay [port]` (defaults to 9528, the
//! port replicas assume in development).

use std::net::{Ipv4Addr, SocketAddr};

use anyhow::{Context, Result};
use core_runtime::logging::{init_logging, LoggingConfig};
use core_sync::RelayServer;
use tracing::info;

const DEFAULT_PORT: u16 = 9528;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(LoggingConfig::default())?;

    let port = match std::env::args().nth(1) {
        Some(arg) => arg
            .parse::<u16>()
            .with_context(|| format!("invalid port: {arg}"))?,
        None => DEFAULT_PORT,
    };

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    let relay = RelayServer::bind(addr).await?;
    info!(endpoint = %relay.endpoint(), "relay running, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    relay.shutdown().await;
    Ok(())
}

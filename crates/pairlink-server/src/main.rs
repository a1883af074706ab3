//! Pairlink server binary.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default port
//! pairlink-server
//!
//! # Custom bind address and shorter reconnect grace window
//! pairlink-server --bind 0.0.0.0:8080 --reconnect-grace-secs 120
//! ```

use std::time::Duration;

use clap::Parser;
use pairlink_core::RelayConfig;
use pairlink_server::{Server, ServerRuntimeConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Pairlink signaling relay server
#[derive(Parser, Debug)]
#[command(name = "pairlink-server")]
#[command(about = "Peer-pairing signaling relay")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:3000")]
    bind: String,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Seconds a reconnect intent stays resident before the sweep drops it
    #[arg(long, default_value = "300")]
    reconnect_grace_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Pairlink relay starting");
    tracing::info!("Binding to {}", args.bind);

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        relay: RelayConfig {
            max_connections: args.max_connections,
            reconnect_grace: Duration::from_secs(args.reconnect_grace_secs),
        },
    };

    let server = Server::bind(config).await?;

    tracing::info!("Relay listening on {}", server.local_addr()?);

    server.run().await?;

    Ok(())
}

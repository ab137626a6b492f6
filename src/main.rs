//! chain-rpc-proxy
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ http::server ──▶ proxy::Relay ──▶ Rewrite ──▶ upstream
//!                  │                                  │
//!                  │                     (chain RPC) routing::ChainRouter
//!                  │                                  │ failure
//!                  ◀──── GET …/__rpc_error ◀──────────┘
//!                  (rpc::error_channel echo)
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use chain_rpc_proxy::config::{load_config, ProxyConfig};
use chain_rpc_proxy::lifecycle::{build_server, shutdown_signal, Shutdown};
use chain_rpc_proxy::observability::{logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "chain-rpc-proxy", version, about = "Reverse proxy with multi-chain JSON-RPC routing")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the listener port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config: ProxyConfig = load_config(&args.config)?;
    if let Some(port) = args.port {
        config.listener.port = port;
    }

    logging::init(&config.observability);
    tracing::info!(config = %args.config.display(), "chain-rpc-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let server = build_server(&config)?;
    let listener = server.bind().await?;

    let shutdown = Shutdown::new();
    shutdown.trigger_on(shutdown_signal());

    server.run(listener, shutdown.listener()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

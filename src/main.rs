//! Protocol-aware packet proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────┐
//!                    │                 PACKET PROXY                  │
//!                    │                                               │
//!   Client ─────────▶│  net::listener ──▶ session::run_client        │
//!                    │        │                  │                   │
//!                    │        │          proto::dispatcher           │
//!                    │        │                  │                   │
//!                    │        │        session handlers (per phase)  │
//!                    │        │                  │                   │
//!                    │        │         session::switcher ──────────▶│──▶ Backend
//!                    │        │                  │                   │
//!                    │  ┌─────┴──────────────────┴────────────────┐  │
//!                    │  │          Cross-Cutting Concerns          │  │
//!                    │  │  config   event bus   observability      │  │
//!                    │  │  registry  lifecycle  sync               │  │
//!                    │  └──────────────────────────────────────────┘  │
//!                    └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use packet_proxy::config::loader::load_config;
use packet_proxy::net::listener::Listener;
use packet_proxy::observability::{logging, metrics};
use packet_proxy::proxy::Proxy;
use packet_proxy::session;
use packet_proxy::{ProxyConfig, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "packet-proxy", about = "Protocol-aware packet proxy")]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    logging::init_tracing(&config.observability.log_level);

    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        backends = config.backends.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let listener = Listener::bind(&config.listener).await?;
    let proxy = Proxy::new(config);

    let shutdown = Shutdown::new();
    let mut shutdown_rx = shutdown.subscribe();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            shutdown.trigger();
        }
    });

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer, permit) = match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        tracing::warn!(error = %err, "Accept failed");
                        continue;
                    }
                };
                tracing::debug!(peer = %peer, "Session starting");
                metrics::record_connection_opened();
                let proxy = Arc::clone(&proxy);
                tokio::spawn(async move {
                    session::run_client(proxy, stream).await;
                    metrics::record_connection_closed();
                    drop(permit);
                });
            }
            _ = shutdown_rx.recv() => {
                tracing::info!("Stopped accepting connections");
                break;
            }
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

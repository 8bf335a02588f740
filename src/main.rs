//! SOCKS5 proxy (RFC 1928, no-auth CONNECT only).
//!
//! # Architecture Overview
//!
//! ```text
//!     Client                 ┌──────────────────────────────────────────────┐
//!     ───────────────────────┼─▶ net::listener ──▶ server (task per conn)   │
//!                            │   allow-list          │                      │
//!                            │                       ▼                      │
//!                            │                 socks::handler ──▶ dns cache │
//!                            │                       │             (TTL)    │
//!                            │                       ▼                      │
//!     ◀──────────────────────┼────────────── socks::relay ◀─────────────────┼──── Target
//!                            │                                              │
//!                            │  config · observability · lifecycle          │
//!                            └──────────────────────────────────────────────┘
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use socks_proxy::config::loader::{apply_env_overrides, read_config, ConfigError};
use socks_proxy::config::validation::validate_config;
use socks_proxy::config::ProxyConfig;
use socks_proxy::dns::{DnsCache, SystemResolver};
use socks_proxy::lifecycle::{shutdown_signal, Shutdown};
use socks_proxy::observability::logging::init_logging;
use socks_proxy::observability::metrics::init_metrics;
use socks_proxy::observability::{Emitter, NoopEmitter, PrometheusEmitter};
use socks_proxy::Server;

#[derive(Parser)]
#[command(name = "socks-proxy")]
#[command(about = "SOCKS5 proxy with a caching resolver", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, e.g. 0.0.0.0:7010 or :7010
    #[arg(short, long)]
    bind: Option<String>,

    /// Only accept clients from this address (overrides ALLOWED_IP)
    #[arg(long)]
    allowed_ip: Option<IpAddr>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => ProxyConfig::default(),
    };
    apply_env_overrides(&mut config)?;
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }
    if let Some(ip) = cli.allowed_ip {
        config.listener.allowed_ip = Some(ip);
    }
    validate_config(&config).map_err(ConfigError::Validation)?;

    init_logging(&config.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "socks-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        network = %config.listener.network,
        cache_ttl_secs = config.dns.cache_ttl_secs,
        connect_timeout_secs = config.timeouts.connect_secs,
        idle_timeout_secs = config.timeouts.idle_secs,
        "Configuration loaded"
    );

    let emitter = build_emitter(&config);

    let cache = Arc::new(DnsCache::new(
        Arc::new(SystemResolver),
        Arc::clone(&emitter),
        Duration::from_secs(config.dns.cache_ttl_secs),
    ));
    let sweeper = cache.spawn_sweeper(Duration::from_secs(config.dns.sweep_interval_secs));

    let server = match Server::bind(&config, cache, Arc::clone(&emitter)).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start listener");
            return Err(e.into());
        }
    };

    let shutdown = Shutdown::new();
    let server_task = tokio::spawn(server.run(shutdown.subscribe()));

    let signal = shutdown_signal().await;
    tracing::info!(?signal, "Shutting down");
    shutdown.trigger();

    server_task.await?;
    sweeper.abort();

    tracing::info!("Shutdown complete");
    Ok(())
}

fn build_emitter(config: &ProxyConfig) -> Arc<dyn Emitter> {
    let observability = &config.observability;
    if !observability.metrics_enabled() {
        return Arc::new(NoopEmitter);
    }

    let installed = observability
        .metrics_address
        .parse::<SocketAddr>()
        .map_err(|e| e.to_string())
        .and_then(|addr| init_metrics(addr).map_err(|e| e.to_string()));

    match installed {
        Ok(()) => Arc::new(PrometheusEmitter),
        Err(e) => {
            tracing::error!(
                metrics_address = %observability.metrics_address,
                error = %e,
                "Failed to start metrics endpoint, continuing without metrics"
            );
            Arc::new(NoopEmitter)
        }
    }
}

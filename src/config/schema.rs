//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Root configuration for the SOCKS5 proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (network, bind address, allow-list).
    pub listener: ListenerConfig,

    /// Resolver cache settings.
    pub dns: DnsConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Network: "tcp", "tcp4" or "tcp6".
    pub network: String,

    /// Bind address (e.g., "0.0.0.0:7010" or ":7010").
    pub bind_address: String,

    /// Only accept clients from this address, when set.
    pub allowed_ip: Option<IpAddr>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            network: "tcp".to_string(),
            bind_address: "0.0.0.0:7010".to_string(),
            allowed_ip: None,
        }
    }
}

/// DNS resolver cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DnsConfig {
    /// How long a resolved address is served from cache, in seconds.
    pub cache_ttl_secs: u64,

    /// Period between expired-entry sweeps, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 600,
            sweep_interval_secs: 60,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Target connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Absolute relay deadline, applied to both sides once relay starts.
    pub idle_secs: u64,

    /// How long shutdown waits for in-flight connections, in seconds.
    pub drain_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 10,
            idle_secs: 600,
            drain_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    pub log_format: String,

    /// Metrics backend: "prometheus" or "none".
    pub metrics_backend: String,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// How often the active connection gauge is sampled, in seconds.
    pub monitor_interval_secs: u64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_backend: "prometheus".to_string(),
            metrics_address: "0.0.0.0:9090".to_string(),
            monitor_interval_secs: 1,
        }
    }
}

impl ObservabilityConfig {
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_backend == "prometheus"
    }
}

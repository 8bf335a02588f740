//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define the proxy's metric keys
//! - Provide the `Emitter` contract the core reports through
//! - Forward to the `metrics` facade and expose a Prometheus endpoint
//!
//! # Metrics
//! - `socks_connections_active` (gauge): sampled once per second
//! - `socks_connections_duration_seconds` (histogram): whole handler run
//! - `socks_errors_*` (counter): one per failure class
//! - `socks_traffic_bytes_*` (counter): relayed payload bytes
//! - `socks_dns_*`: resolver cache hits, misses, evictions, size
//!
//! # Design Decisions
//! - Emitters are injected as `Arc<dyn Emitter>`; the core never touches a
//!   global recorder directly
//! - A `Timer` records only when stopped, so callers decide which outcomes
//!   produce a sample

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const CONNECTIONS_ACTIVE: &str = "socks_connections_active";
pub const CONNECTION_DURATION: &str = "socks_connections_duration_seconds";
pub const TARGET_DIAL_DURATION: &str = "socks_connections_target_dial_duration_seconds";

pub const ERRORS_ACCEPT: &str = "socks_errors_accept_total";
pub const ERRORS_UNAUTHORIZED_IP: &str = "socks_errors_unauthorized_ip_total";
pub const ERRORS_GREETING: &str = "socks_errors_greeting_total";
pub const ERRORS_VERSION: &str = "socks_errors_unsupported_version_total";
pub const ERRORS_AUTH_METHODS: &str = "socks_errors_auth_methods_total";
pub const ERRORS_REQUEST_HEADER: &str = "socks_errors_request_header_total";
pub const ERRORS_COMMAND: &str = "socks_errors_unsupported_command_total";
pub const ERRORS_ADDRESS_TYPE: &str = "socks_errors_unsupported_address_type_total";
pub const ERRORS_PORT: &str = "socks_errors_port_total";
pub const ERRORS_DNS_RESOLVE: &str = "socks_errors_dns_resolve_total";
pub const ERRORS_CONNECTION_REFUSED: &str = "socks_errors_connection_refused_total";
pub const ERRORS_COPY_TO_TARGET: &str = "socks_errors_copy_to_target_total";
pub const ERRORS_COPY_TO_CLIENT: &str = "socks_errors_copy_to_client_total";

pub const BYTES_SENT: &str = "socks_traffic_bytes_sent_total";
pub const BYTES_RECEIVED: &str = "socks_traffic_bytes_received_total";

pub const DNS_RESOLVE_DURATION: &str = "socks_dns_resolve_duration_seconds";
pub const DNS_HITS: &str = "socks_dns_cache_hits_total";
pub const DNS_MISSES: &str = "socks_dns_cache_misses_total";
pub const DNS_EVICTIONS: &str = "socks_dns_cache_evictions_total";
pub const DNS_ENTRIES: &str = "socks_dns_cache_entries";

/// Sink for counters, gauges and timings.
///
/// Implementations must tolerate concurrent calls from every connection task.
pub trait Emitter: Send + Sync {
    /// Add `value` to a counter.
    fn count(&self, key: &'static str, value: u64);

    /// Set a gauge.
    fn gauge(&self, key: &'static str, value: f64);

    /// Record a duration sample.
    fn timing(&self, key: &'static str, elapsed: Duration);

    /// Add one to a counter.
    fn increment(&self, key: &'static str) {
        self.count(key, 1);
    }
}

/// A running duration measurement.
///
/// Dropping a timer without calling [`Timer::stop`] discards it.
#[derive(Debug)]
#[must_use = "a timer records nothing until stopped"]
pub struct Timer {
    key: &'static str,
    started: Instant,
}

impl Timer {
    pub fn start(key: &'static str) -> Self {
        Self {
            key,
            started: Instant::now(),
        }
    }

    /// Record the elapsed time since `start`.
    pub fn stop(self, emitter: &dyn Emitter) {
        emitter.timing(self.key, self.started.elapsed());
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEmitter;

impl Emitter for NoopEmitter {
    fn count(&self, _key: &'static str, _value: u64) {}

    fn gauge(&self, _key: &'static str, _value: f64) {}

    fn timing(&self, _key: &'static str, _elapsed: Duration) {}
}

/// Forwards to the global `metrics` recorder.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrometheusEmitter;

impl Emitter for PrometheusEmitter {
    fn count(&self, key: &'static str, value: u64) {
        ::metrics::counter!(key).increment(value);
    }

    fn gauge(&self, key: &'static str, value: f64) {
        ::metrics::gauge!(key).set(value);
    }

    fn timing(&self, key: &'static str, elapsed: Duration) {
        ::metrics::histogram!(key).record(elapsed.as_secs_f64());
    }
}

/// Keeps every emitted value in memory. Used by tests to assert on metrics.
#[derive(Debug, Default)]
pub struct InMemoryEmitter {
    counters: Mutex<HashMap<&'static str, u64>>,
    gauges: Mutex<HashMap<&'static str, f64>>,
    timings: Mutex<HashMap<&'static str, Vec<Duration>>>,
}

impl InMemoryEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current counter value, zero if never touched.
    pub fn counter(&self, key: &str) -> u64 {
        self.counters
            .lock()
            .expect("emitter mutex poisoned")
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    /// Last value set on a gauge.
    pub fn gauge_value(&self, key: &str) -> Option<f64> {
        self.gauges
            .lock()
            .expect("emitter mutex poisoned")
            .get(key)
            .copied()
    }

    /// Number of duration samples recorded under `key`.
    pub fn timing_count(&self, key: &str) -> usize {
        self.timings
            .lock()
            .expect("emitter mutex poisoned")
            .get(key)
            .map_or(0, Vec::len)
    }
}

impl Emitter for InMemoryEmitter {
    fn count(&self, key: &'static str, value: u64) {
        *self
            .counters
            .lock()
            .expect("emitter mutex poisoned")
            .entry(key)
            .or_insert(0) += value;
    }

    fn gauge(&self, key: &'static str, value: f64) {
        self.gauges
            .lock()
            .expect("emitter mutex poisoned")
            .insert(key, value);
    }

    fn timing(&self, key: &'static str, elapsed: Duration) {
        self.timings
            .lock()
            .expect("emitter mutex poisoned")
            .entry(key)
            .or_default()
            .push(elapsed);
    }
}

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

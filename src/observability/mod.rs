//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, timings via Emitter)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Connection IDs are attached as span fields, not repeated per event
//! - Metrics are cheap (atomic increments behind the facade)
//! - The emitter is an injected dependency so tests can observe it

pub mod logging;
pub mod metrics;

pub use self::metrics::{Emitter, InMemoryEmitter, NoopEmitter, PrometheusEmitter, Timer};

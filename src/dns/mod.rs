//! DNS subsystem.
//!
//! # Data Flow
//! ```text
//! Domain CONNECT request
//!     → cache.rs (TTL lookup; hit returns immediately)
//!     → resolver.rs (system lookup on miss)
//!     → cache.rs stores {ip, now + ttl}
//!
//! Background:
//!     sweeper task → cache.rs sweep (evict expired, report size)
//! ```

pub mod cache;
pub mod resolver;

pub use cache::{DnsCache, SweepStats};
pub use resolver::{Resolver, StaticResolver, SystemResolver};

//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept, allow-list check)
//!     → connection.rs (id, lifecycle tracking)
//!     → Hand off to the SOCKS handler
//! ```
//!
//! # Design Decisions
//! - Disallowed peers are closed before any protocol byte
//! - Each connection tracked for graceful shutdown

pub mod connection;
pub mod listener;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::Listener;

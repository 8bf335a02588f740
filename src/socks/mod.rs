//! SOCKS5 protocol subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted TCP connection
//!     → handler.rs (state machine, reply/metric policy)
//!     → protocol.rs (greeting, auth ack, request parsing)
//!     → dns (domain targets only)
//!     → handler.rs dial with timeout
//!     → relay.rs (two copy tasks until both finish)
//! ```
//!
//! # Design Decisions
//! - Only no-auth CONNECT is supported
//! - Reply frames are fixed 10-byte messages with a zero bound address
//! - No retries: one resolve and one dial attempt per request

pub mod handler;
pub mod protocol;
pub mod relay;

pub use handler::Handler;
pub use protocol::{AddressType, ParsedRequest, Reply};
pub use relay::{relay, CloseWrite, RelayStats};

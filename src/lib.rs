//! SOCKS5 proxy library with a caching DNS resolver.

pub mod config;
pub mod dns;
pub mod error;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod server;
pub mod socks;

pub use config::schema::ProxyConfig;
pub use lifecycle::Shutdown;
pub use server::Server;

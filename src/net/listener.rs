//! TCP listener with an optional source-address allow-list.
//!
//! # Responsibilities
//! - Bind to the configured network and address
//! - Accept incoming TCP connections
//! - Close connections from peers other than the allowed address
//! - Surface accept errors without ending the accept loop

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::net::{TcpListener, TcpStream};

use crate::config::ListenerConfig;
use crate::error::ListenerError;

/// Resolve a `network` / `bind_address` pair into a socket address.
///
/// Accepts `host:port` and the bare `:port` form. A bare port binds the
/// unspecified address of the requested family; under `tcp` that is `[::]`,
/// which also accepts IPv4 clients as mapped addresses.
pub fn parse_bind_address(network: &str, bind_address: &str) -> Result<SocketAddr, String> {
    let addr = match bind_address.strip_prefix(':') {
        Some(port) => {
            let port: u16 = port
                .parse()
                .map_err(|_| format!("invalid port in {bind_address:?}"))?;
            let ip = match network {
                "tcp4" => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                _ => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            };
            SocketAddr::new(ip, port)
        }
        None => bind_address
            .parse()
            .map_err(|_| format!("invalid socket address {bind_address:?}"))?,
    };

    match (network, addr) {
        ("tcp", _) | ("tcp4", SocketAddr::V4(_)) | ("tcp6", SocketAddr::V6(_)) => Ok(addr),
        ("tcp4" | "tcp6", _) => Err(format!("{addr} does not belong to network {network}")),
        _ => Err(format!("unsupported network {network:?}, expected tcp, tcp4 or tcp6")),
    }
}

/// A TCP listener that only hands out connections from permitted peers.
pub struct Listener {
    inner: TcpListener,
    allowed_ip: Option<IpAddr>,
}

impl Listener {
    /// Bind to the configured address.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let addr = parse_bind_address(&config.network, &config.bind_address).map_err(|e| {
            ListenerError::Bind(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;

        let listener = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;
        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(
            address = %local_addr,
            network = %config.network,
            allowed_ip = ?config.allowed_ip,
            "Listener bound"
        );

        Ok(Self {
            inner: listener,
            allowed_ip: config.allowed_ip.map(|ip| ip.to_canonical()),
        })
    }

    /// Accept the next connection.
    ///
    /// A peer that is not the allowed address gets its stream closed
    /// immediately, before any byte is read or written.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), ListenerError> {
        let (stream, peer) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        if !self.is_allowed(peer.ip()) {
            drop(stream);
            return Err(ListenerError::Unauthorized(peer));
        }

        tracing::debug!(peer_addr = %peer, "Connection accepted");
        Ok((stream, peer))
    }

    fn is_allowed(&self, peer: IpAddr) -> bool {
        match self.allowed_ip {
            Some(allowed) => peer.to_canonical() == allowed,
            None => true,
        }
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }
}

//! Error types for the SOCKS5 proxy.
//!
//! Every failure in the data path ends at most one connection. The enums here
//! carry enough context for the handler to pick a reply frame and a metric key
//! at a single reporting point.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::observability::metrics as keys;
use crate::socks::protocol::Reply;

/// Errors raised by the TCP listener.
#[derive(Error, Debug)]
pub enum ListenerError {
    /// Failed to bind to the configured address. Fatal.
    #[error("failed to bind: {0}")]
    Bind(#[source] io::Error),

    /// Failed to accept a connection. The accept loop keeps going.
    #[error("failed to accept: {0}")]
    Accept(#[source] io::Error),

    /// Peer is not on the allow-list. The stream has already been dropped.
    #[error("connection from {0} is not allowed")]
    Unauthorized(SocketAddr),
}

/// Errors raised while resolving a hostname.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// The hostname bytes were not valid UTF-8.
    #[error("invalid hostname")]
    InvalidHost,

    /// The system lookup failed.
    #[error("resolve host {host}: {source}")]
    Lookup {
        host: String,
        #[source]
        source: io::Error,
    },

    /// The lookup succeeded but returned nothing.
    #[error("resolve host {host}: no addresses")]
    NoAddresses { host: String },
}

/// Errors raised during the SOCKS5 negotiation, before any dial.
#[derive(Error, Debug)]
pub enum HandshakeError {
    /// Peer closed the stream before sending the next field.
    #[error("end of stream")]
    Closed,

    #[error("failed to read greeting: {0}")]
    Greeting(#[source] io::Error),

    #[error("unsupported SOCKS version {0}")]
    Version(u8),

    #[error("failed to read auth methods: {0}")]
    AuthMethods(#[source] io::Error),

    #[error("failed to write auth response: {0}")]
    AuthAck(#[source] io::Error),

    #[error("failed to read request header: {0}")]
    RequestHeader(#[source] io::Error),

    #[error("unsupported request version {version} or command {command:#04x}")]
    Command { version: u8, command: u8 },

    #[error("failed to read {field}: {source}")]
    Address {
        field: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("unsupported address type {0:#04x}")]
    AddressType(u8),

    #[error("DNS resolve failed: {0}")]
    Resolve(#[source] ResolveError),

    #[error("failed to read port: {0}")]
    Port(#[source] io::Error),
}

impl HandshakeError {
    /// Reply frame sent to the client before closing, if any.
    pub fn reply(&self) -> Option<Reply> {
        match self {
            HandshakeError::Closed | HandshakeError::AuthAck(_) => None,
            HandshakeError::Command { .. } => Some(Reply::CommandNotSupported),
            HandshakeError::AddressType(_) => Some(Reply::AddressTypeNotSupported),
            HandshakeError::Resolve(_) => Some(Reply::ConnectionRefused),
            _ => Some(Reply::GeneralFailure),
        }
    }

    /// Counter incremented for this failure, if any.
    pub fn metric(&self) -> Option<&'static str> {
        match self {
            HandshakeError::Closed | HandshakeError::AuthAck(_) => None,
            HandshakeError::Greeting(_) => Some(keys::ERRORS_GREETING),
            HandshakeError::Version(_) => Some(keys::ERRORS_VERSION),
            HandshakeError::AuthMethods(_) => Some(keys::ERRORS_AUTH_METHODS),
            HandshakeError::RequestHeader(_) => Some(keys::ERRORS_REQUEST_HEADER),
            HandshakeError::Command { .. } => Some(keys::ERRORS_COMMAND),
            HandshakeError::Address { .. } | HandshakeError::AddressType(_) => {
                Some(keys::ERRORS_ADDRESS_TYPE)
            }
            HandshakeError::Resolve(_) => Some(keys::ERRORS_DNS_RESOLVE),
            HandshakeError::Port(_) => Some(keys::ERRORS_PORT),
        }
    }

    /// Whether this is a normal disconnect that should stay silent.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, HandshakeError::Closed)
    }
}

/// Errors raised while dialing the target.
#[derive(Error, Debug)]
pub enum DialError {
    #[error("connect to {addr} timed out after {timeout:?}")]
    Timeout { addr: SocketAddr, timeout: Duration },

    #[error("connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Outcome of a failed relay direction.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Deadline, reset or broken pipe. Suppressed entirely.
    #[error("relay closed: {0}")]
    Benign(#[source] io::Error),

    /// Anything else. Logged and counted, but the other direction continues.
    #[error("relay failed: {0}")]
    Critical(#[source] io::Error),
}

impl RelayError {
    /// Classify an IO error raised while copying.
    pub fn classify(err: io::Error) -> Self {
        if is_benign(&err) {
            RelayError::Benign(err)
        } else {
            RelayError::Critical(err)
        }
    }

    pub fn is_benign(&self) -> bool {
        matches!(self, RelayError::Benign(_))
    }
}

/// Timeouts and peer-initiated teardown are expected during relay.
pub fn is_benign(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_replies_follow_failure_kind() {
        assert_eq!(HandshakeError::Version(4).reply(), Some(Reply::GeneralFailure));
        assert_eq!(
            HandshakeError::Command { version: 5, command: 3 }.reply(),
            Some(Reply::CommandNotSupported)
        );
        assert_eq!(HandshakeError::AddressType(9).reply(), Some(Reply::AddressTypeNotSupported));
        assert_eq!(
            HandshakeError::Resolve(ResolveError::InvalidHost).reply(),
            Some(Reply::ConnectionRefused)
        );
        assert_eq!(HandshakeError::Closed.reply(), None);
    }

    #[test]
    fn closed_stream_is_silent() {
        let err = HandshakeError::Closed;
        assert!(err.is_end_of_stream());
        assert!(err.metric().is_none());
    }

    #[test]
    fn relay_error_classification() {
        let kinds = [
            io::ErrorKind::TimedOut,
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::BrokenPipe,
        ];
        for kind in kinds {
            assert!(RelayError::classify(io::Error::from(kind)).is_benign(), "{kind:?}");
        }

        let err = RelayError::classify(io::Error::new(io::ErrorKind::Other, "boom"));
        assert!(!err.is_benign());
    }
}

//! SOCKS5 wire format: constants, reply frames and request parsing.
//!
//! Only the subset needed for no-auth CONNECT is implemented. Every read
//! maps its failure to the `HandshakeError` variant for the stage it belongs
//! to, so the handler can reply and count without re-inspecting the error.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::dns::Resolver;
use crate::error::{HandshakeError, ResolveError};

pub const SOCKS_VERSION: u8 = 0x05;
pub const AUTH_METHOD_NONE: u8 = 0x00;
pub const CMD_CONNECT: u8 = 0x01;

pub const ATYP_IPV4: u8 = 0x01;
pub const ATYP_DOMAIN: u8 = 0x03;
pub const ATYP_IPV6: u8 = 0x04;

/// Fixed 10-byte reply frames. Bound address and port are always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Succeeded,
    GeneralFailure,
    ConnectionRefused,
    CommandNotSupported,
    AddressTypeNotSupported,
}

impl Reply {
    pub fn code(self) -> u8 {
        match self {
            Reply::Succeeded => 0x00,
            Reply::GeneralFailure => 0x01,
            Reply::ConnectionRefused => 0x05,
            Reply::CommandNotSupported => 0x07,
            Reply::AddressTypeNotSupported => 0x08,
        }
    }

    pub fn frame(self) -> [u8; 10] {
        [SOCKS_VERSION, self.code(), 0x00, ATYP_IPV4, 0, 0, 0, 0, 0, 0]
    }
}

/// Address type carried in a CONNECT request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    Ipv4,
    Domain,
    Ipv6,
}

impl TryFrom<u8> for AddressType {
    type Error = HandshakeError;

    fn try_from(atyp: u8) -> Result<Self, Self::Error> {
        match atyp {
            ATYP_IPV4 => Ok(AddressType::Ipv4),
            ATYP_DOMAIN => Ok(AddressType::Domain),
            ATYP_IPV6 => Ok(AddressType::Ipv6),
            other => Err(HandshakeError::AddressType(other)),
        }
    }
}

/// A fully parsed CONNECT request with its address already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    pub address_type: AddressType,
    pub address: IpAddr,
    pub port: u16,
    /// Hostname as sent by the client, for domain requests.
    pub domain: Option<String>,
}

impl ParsedRequest {
    pub fn destination(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

/// Fill `buf` from the stream.
///
/// A stream that ends before the first byte is a clean disconnect and yields
/// `HandshakeError::Closed`; any other failure goes through `on_error`.
async fn read_full<R, F>(reader: &mut R, buf: &mut [u8], on_error: F) -> Result<(), HandshakeError>
where
    R: AsyncRead + Unpin,
    F: FnOnce(io::Error) -> HandshakeError,
{
    if buf.is_empty() {
        return Ok(());
    }

    let first = match reader.read(buf).await {
        Ok(0) => return Err(HandshakeError::Closed),
        Ok(n) => n,
        Err(e) => return Err(on_error(e)),
    };

    reader
        .read_exact(&mut buf[first..])
        .await
        .map(|_| ())
        .map_err(on_error)
}

/// Greeting, method list and auth acknowledgment.
///
/// The offered methods are read and ignored; the reply is always no-auth.
pub async fn negotiate_auth<S>(stream: &mut S) -> Result<(), HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut greeting = [0u8; 2];
    read_full(stream, &mut greeting, HandshakeError::Greeting).await?;

    if greeting[0] != SOCKS_VERSION {
        return Err(HandshakeError::Version(greeting[0]));
    }

    let mut methods = vec![0u8; usize::from(greeting[1])];
    read_full(stream, &mut methods, HandshakeError::AuthMethods).await?;

    stream
        .write_all(&[SOCKS_VERSION, AUTH_METHOD_NONE])
        .await
        .map_err(HandshakeError::AuthAck)
}

/// Request header, address, and port. Domain names go through `resolver`.
pub async fn read_request<R>(
    reader: &mut R,
    resolver: &dyn Resolver,
) -> Result<ParsedRequest, HandshakeError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    read_full(reader, &mut header, HandshakeError::RequestHeader).await?;

    let [version, command, _reserved, atyp] = header;
    if version != SOCKS_VERSION || command != CMD_CONNECT {
        return Err(HandshakeError::Command { version, command });
    }

    let address_type = AddressType::try_from(atyp)?;
    let (address, domain) = match address_type {
        AddressType::Ipv4 => {
            let mut octets = [0u8; 4];
            read_full(reader, &mut octets, address_error("IPv4 address")).await?;
            (IpAddr::V4(Ipv4Addr::from(octets)), None)
        }
        AddressType::Domain => {
            let mut len = [0u8; 1];
            read_full(reader, &mut len, address_error("domain length")).await?;

            let mut raw = vec![0u8; usize::from(len[0])];
            read_full(reader, &mut raw, address_error("domain")).await?;

            let host = String::from_utf8(raw)
                .map_err(|_| HandshakeError::Resolve(ResolveError::InvalidHost))?;
            let ip = resolver.resolve(&host).await.map_err(HandshakeError::Resolve)?;
            (ip, Some(host))
        }
        AddressType::Ipv6 => {
            let mut octets = [0u8; 16];
            read_full(reader, &mut octets, address_error("IPv6 address")).await?;
            (IpAddr::V6(Ipv6Addr::from(octets)), None)
        }
    };

    let mut port = [0u8; 2];
    read_full(reader, &mut port, HandshakeError::Port).await?;

    Ok(ParsedRequest {
        address_type,
        address,
        port: u16::from_be_bytes(port),
        domain,
    })
}

fn address_error(field: &'static str) -> impl FnOnce(io::Error) -> HandshakeError {
    move |source| HandshakeError::Address { field, source }
}

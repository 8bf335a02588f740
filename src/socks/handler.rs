//! Per-connection SOCKS5 state machine.
//!
//! ```text
//! Greeting → AuthMethods → AuthAck → RequestHeader → AddressByType → Port
//!     → Dial → Success reply → Relay
//! ```
//!
//! Each step runs strictly after the previous one. Any failure ends this
//! connection only: it is answered (when the protocol has a reply for it),
//! counted and logged through [`Handler::reply`].

use std::error::Error as StdError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;

use crate::config::TimeoutConfig;
use crate::dns::Resolver;
use crate::error::{DialError, HandshakeError};
use crate::observability::metrics as keys;
use crate::observability::{Emitter, Timer};
use crate::socks::protocol::{self, ParsedRequest, Reply};
use crate::socks::relay::relay;

/// Runs the protocol for one client at a time; shared by all connection tasks.
pub struct Handler {
    resolver: Arc<dyn Resolver>,
    emitter: Arc<dyn Emitter>,
    connect_timeout: Duration,
    idle_timeout: Duration,
}

impl Handler {
    pub fn new(resolver: Arc<dyn Resolver>, emitter: Arc<dyn Emitter>, timeouts: &TimeoutConfig) -> Self {
        Self {
            resolver,
            emitter,
            connect_timeout: Duration::from_secs(timeouts.connect_secs),
            idle_timeout: Duration::from_secs(timeouts.idle_secs),
        }
    }

    /// Serve one client until the relay ends or the handshake fails.
    pub async fn handle(&self, client: TcpStream) {
        let timer = Timer::start(keys::CONNECTION_DURATION);
        self.serve(client).await;
        timer.stop(self.emitter.as_ref());
    }

    async fn serve(&self, mut client: TcpStream) {
        let request = match self.negotiate(&mut client).await {
            Ok(request) => request,
            Err(e) => {
                self.reject(&mut client, e).await;
                return;
            }
        };

        let destination = request.destination();
        tracing::debug!(
            destination = %destination,
            domain = request.domain.as_deref().unwrap_or("-"),
            "CONNECT request parsed"
        );

        let target = match self.dial(destination).await {
            Ok(target) => target,
            Err(e) => {
                self.reply(
                    &mut client,
                    Some(Reply::ConnectionRefused),
                    keys::ERRORS_CONNECTION_REFUSED,
                    &e,
                )
                .await;
                return;
            }
        };

        if let Err(e) = client.write_all(&Reply::Succeeded.frame()).await {
            tracing::warn!(error = %e, "Failed to write success response");
            return;
        }

        let stats = relay(
            client.into_split(),
            target.into_split(),
            self.idle_timeout,
            self.emitter.clone(),
        )
        .await;

        tracing::debug!(
            destination = %destination,
            bytes_sent = stats.sent,
            bytes_received = stats.received,
            "Relay finished"
        );
    }

    /// Run the handshake up to and including the port, resolving domains.
    pub async fn negotiate<S>(&self, stream: &mut S) -> Result<ParsedRequest, HandshakeError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        protocol::negotiate_auth(stream).await?;
        protocol::read_request(stream, self.resolver.as_ref()).await
    }

    /// Single outbound attempt. The dial timer records only on success.
    async fn dial(&self, addr: SocketAddr) -> Result<TcpStream, DialError> {
        let timer = Timer::start(keys::TARGET_DIAL_DURATION);

        let stream = match time::timeout(self.connect_timeout, TcpStream::connect(addr)).await {
            Err(_) => {
                return Err(DialError::Timeout {
                    addr,
                    timeout: self.connect_timeout,
                })
            }
            Ok(Err(source)) => return Err(DialError::Connect { addr, source }),
            Ok(Ok(stream)) => stream,
        };

        timer.stop(self.emitter.as_ref());
        Ok(stream)
    }

    /// Report a handshake failure. A clean end of stream stays silent.
    async fn reject<W>(&self, client: &mut W, err: HandshakeError)
    where
        W: AsyncWrite + Unpin,
    {
        if err.is_end_of_stream() {
            return;
        }

        match err.metric() {
            Some(metric) => self.reply(client, err.reply(), metric, &err).await,
            None => tracing::warn!(error = %err, "Handshake aborted"),
        }
    }

    /// Write `response` if any, count `metric`, and log `err`.
    ///
    /// Reply write failures are best-effort and never escalate.
    async fn reply<W>(
        &self,
        client: &mut W,
        response: Option<Reply>,
        metric: &'static str,
        err: &(dyn StdError + Send + Sync),
    ) where
        W: AsyncWrite + Unpin,
    {
        if let Some(reply) = response {
            if let Err(e) = client.write_all(&reply.frame()).await {
                tracing::debug!(error = %e, "Failed to write reply");
            }
        }

        self.emitter.increment(metric);
        tracing::warn!(error = %err, "Request failed");
    }
}

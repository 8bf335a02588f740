//! Bidirectional byte relay between client and target.
//!
//! # Responsibilities
//! - Copy client→target and target→client on two independent tasks
//! - Enforce one absolute deadline shared by both transports
//! - Count bytes per direction and report non-benign failures
//! - Half-close the destination once a direction finishes
//!
//! # Design Decisions
//! - A failing direction never cancels the other; teardown happens when
//!   both tasks have returned and their halves are dropped
//! - Byte counts are reported even when the copy ends in an error

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::time::{self, Instant};
use tracing::Instrument;

use crate::error::RelayError;
use crate::observability::metrics as keys;
use crate::observability::Emitter;

const COPY_BUFFER_SIZE: usize = 32 * 1024;

/// Write side of a relayed transport, with an optional half-close capability.
#[async_trait]
pub trait CloseWrite: AsyncWrite + Unpin + Send {
    /// Close only the write direction so the peer sees end of stream while
    /// the read direction keeps draining. The default leaves the transport
    /// untouched.
    async fn close_write(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl CloseWrite for OwnedWriteHalf {
    async fn close_write(&mut self) -> io::Result<()> {
        self.shutdown().await
    }
}

// Generic split halves are treated as lacking the half-close capability.
impl<T> CloseWrite for WriteHalf<T> where T: AsyncWrite + Send {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    ClientToTarget,
    TargetToClient,
}

impl Direction {
    fn bytes_metric(self) -> &'static str {
        match self {
            Direction::ClientToTarget => keys::BYTES_SENT,
            Direction::TargetToClient => keys::BYTES_RECEIVED,
        }
    }

    fn error_metric(self) -> &'static str {
        match self {
            Direction::ClientToTarget => keys::ERRORS_COPY_TO_TARGET,
            Direction::TargetToClient => keys::ERRORS_COPY_TO_CLIENT,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Direction::ClientToTarget => "Error copying from client to target",
            Direction::TargetToClient => "Error copying from target to client",
        }
    }
}

/// Bytes moved in each direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Client → target.
    pub sent: u64,
    /// Target → client.
    pub received: u64,
}

/// Relay until both directions finish or `idle_timeout` elapses.
///
/// Takes the read and write halves of each side.
pub async fn relay<CR, CW, TR, TW>(
    client: (CR, CW),
    target: (TR, TW),
    idle_timeout: Duration,
    emitter: Arc<dyn Emitter>,
) -> RelayStats
where
    CR: AsyncRead + Unpin + Send + 'static,
    CW: CloseWrite + 'static,
    TR: AsyncRead + Unpin + Send + 'static,
    TW: CloseWrite + 'static,
{
    let deadline = Instant::now() + idle_timeout;
    let (client_read, client_write) = client;
    let (target_read, target_write) = target;

    let upstream = tokio::spawn(
        pump(client_read, target_write, deadline, Direction::ClientToTarget, emitter.clone())
            .in_current_span(),
    );
    let downstream = tokio::spawn(
        pump(target_read, client_write, deadline, Direction::TargetToClient, emitter)
            .in_current_span(),
    );

    let (sent, received) = tokio::join!(upstream, downstream);
    RelayStats {
        sent: sent.unwrap_or(0),
        received: received.unwrap_or(0),
    }
}

async fn pump<R, W>(
    mut reader: R,
    mut writer: W,
    deadline: Instant,
    direction: Direction,
    emitter: Arc<dyn Emitter>,
) -> u64
where
    R: AsyncRead + Unpin,
    W: CloseWrite,
{
    let (bytes, result) = copy_until(&mut reader, &mut writer, deadline).await;

    if let Err(e) = result {
        if let RelayError::Critical(e) = RelayError::classify(e) {
            emitter.increment(direction.error_metric());
            tracing::warn!(error = %e, "{}", direction.describe());
        }
    }

    emitter.count(direction.bytes_metric(), bytes);

    if let Err(e) = writer.close_write().await {
        tracing::trace!(error = %e, "Half-close failed");
    }

    bytes
}

/// Copy until end of stream, an IO error, or `deadline`.
///
/// Returns the bytes written so far alongside the outcome.
async fn copy_until<R, W>(reader: &mut R, writer: &mut W, deadline: Instant) -> (u64, io::Result<()>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n = match time::timeout_at(deadline, reader.read(&mut buf)).await {
            Err(_) => return (total, Err(deadline_exceeded())),
            Ok(Err(e)) => return (total, Err(e)),
            Ok(Ok(0)) => return (total, Ok(())),
            Ok(Ok(n)) => n,
        };

        match time::timeout_at(deadline, writer.write_all(&buf[..n])).await {
            Err(_) => return (total, Err(deadline_exceeded())),
            Ok(Err(e)) => return (total, Err(e)),
            Ok(Ok(())) => total += n as u64,
        }
    }
}

fn deadline_exceeded() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "idle deadline exceeded")
}

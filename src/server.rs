//! Accept loop and per-connection task spawning.
//!
//! # Responsibilities
//! - Own the listener, the shared handler and the connection tracker
//! - Spawn one task per accepted connection, inside a tracing span
//! - Count accept failures and rejected peers
//! - On shutdown, stop accepting and drain in-flight connections
//!
//! # Design Decisions
//! - Accept errors never stop the loop
//! - Draining is bounded; stragglers are abandoned at the deadline

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::Instrument;

use crate::config::ProxyConfig;
use crate::dns::Resolver;
use crate::error::ListenerError;
use crate::net::{ConnectionTracker, Listener};
use crate::observability::metrics as keys;
use crate::observability::Emitter;
use crate::socks::Handler;

/// A bound SOCKS5 server, ready to run.
pub struct Server {
    listener: Listener,
    handler: Arc<Handler>,
    emitter: Arc<dyn Emitter>,
    tracker: ConnectionTracker,
    drain_timeout: Duration,
    monitor_interval: Duration,
}

impl Server {
    /// Bind the listener. A bind failure is fatal for the caller.
    pub async fn bind(
        config: &ProxyConfig,
        resolver: Arc<dyn Resolver>,
        emitter: Arc<dyn Emitter>,
    ) -> Result<Self, ListenerError> {
        let listener = Listener::bind(&config.listener).await?;
        let handler = Handler::new(resolver, Arc::clone(&emitter), &config.timeouts);

        Ok(Self {
            listener,
            handler: Arc::new(handler),
            emitter,
            tracker: ConnectionTracker::new(),
            drain_timeout: Duration::from_secs(config.timeouts.drain_secs),
            monitor_interval: Duration::from_secs(config.observability.monitor_interval_secs),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` fires, then drain.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let monitor = self
            .tracker
            .spawn_monitor(Arc::clone(&self.emitter), self.monitor_interval);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_connection(stream, peer),
                    Err(ListenerError::Unauthorized(peer)) => {
                        self.emitter.increment(keys::ERRORS_UNAUTHORIZED_IP);
                        tracing::warn!(peer_addr = %peer, "Rejected connection from unauthorized address");
                    }
                    Err(e) => {
                        self.emitter.increment(keys::ERRORS_ACCEPT);
                        tracing::warn!(error = %e, "Accept failed");
                    }
                },
            }
        }

        let Server {
            listener,
            tracker,
            drain_timeout,
            ..
        } = self;
        drop(listener);

        let active = tracker.active_count();
        if active > 0 {
            tracing::info!(active, drain_secs = drain_timeout.as_secs(), "Draining connections");
        }
        let remaining = tracker.wait_idle(drain_timeout).await;
        if remaining > 0 {
            tracing::warn!(remaining, "Drain deadline reached, abandoning connections");
        }

        monitor.abort();
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let guard = self.tracker.track();
        let handler = Arc::clone(&self.handler);
        let span = tracing::info_span!("connection", id = %guard.id(), peer = %peer);

        tokio::spawn(
            async move {
                let _guard = guard;
                handler.handle(stream).await;
            }
            .instrument(span),
        );
    }
}

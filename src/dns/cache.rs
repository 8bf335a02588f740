//! TTL cache in front of an upstream resolver.
//!
//! # Responsibilities
//! - Serve repeated lookups for a host from memory until its TTL runs out
//! - Fall through to the upstream resolver on a miss or a stale entry
//! - Periodically sweep expired entries
//!
//! # Design Decisions
//! - `DashMap` shards the map, so lookups for different hosts do not contend
//! - No single-flight: concurrent cold misses for one host each go upstream,
//!   and the last write wins
//! - Failures are never cached; the next request retries the lookup
//! - Stale entries may linger until the next sweep but are never served

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::dns::Resolver;
use crate::error::ResolveError;
use crate::observability::metrics as keys;
use crate::observability::{Emitter, Timer};

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    ip: IpAddr,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Result of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Entries present before eviction.
    pub scanned: usize,
    pub evicted: usize,
}

/// Caching resolver keyed by hostname.
pub struct DnsCache {
    upstream: Arc<dyn Resolver>,
    emitter: Arc<dyn Emitter>,
    ttl: Duration,
    entries: DashMap<String, CacheEntry>,
}

impl DnsCache {
    pub fn new(upstream: Arc<dyn Resolver>, emitter: Arc<dyn Emitter>, ttl: Duration) -> Self {
        Self {
            upstream,
            emitter,
            ttl,
            entries: DashMap::new(),
        }
    }

    /// Number of stored entries, stale ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether an entry for `host` is stored, fresh or not.
    pub fn contains(&self, host: &str) -> bool {
        self.entries.contains_key(host)
    }

    async fn lookup(&self, host: &str) -> Result<IpAddr, ResolveError> {
        // Copy out so no shard guard is held across the upstream await.
        let cached = self.entries.get(host).map(|entry| *entry.value());
        if let Some(entry) = cached {
            if entry.is_fresh(Instant::now()) {
                self.emitter.increment(keys::DNS_HITS);
                return Ok(entry.ip);
            }
        }

        self.emitter.increment(keys::DNS_MISSES);
        tracing::debug!(host = %host, "DNS cache miss");

        let ip = self.upstream.resolve(host).await?;
        self.entries.insert(
            host.to_string(),
            CacheEntry {
                ip,
                expires_at: Instant::now() + self.ttl,
            },
        );

        Ok(ip)
    }

    /// Remove every expired entry and report the pass.
    pub fn sweep(&self) -> SweepStats {
        let now = Instant::now();
        let mut stats = SweepStats::default();

        self.entries.retain(|_, entry| {
            stats.scanned += 1;
            if entry.is_fresh(now) {
                true
            } else {
                stats.evicted += 1;
                false
            }
        });

        self.emitter.count(keys::DNS_EVICTIONS, stats.evicted as u64);
        self.emitter.gauge(keys::DNS_ENTRIES, stats.scanned as f64);

        if stats.evicted > 0 {
            tracing::debug!(scanned = stats.scanned, evicted = stats.evicted, "DNS cache swept");
        }

        stats
    }

    /// Run `sweep` every `period` until the cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let cache = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                match cache.upgrade() {
                    Some(cache) => {
                        cache.sweep();
                    }
                    None => break,
                }
            }
        })
    }
}

#[async_trait]
impl Resolver for DnsCache {
    async fn resolve(&self, host: &str) -> Result<IpAddr, ResolveError> {
        let timer = Timer::start(keys::DNS_RESOLVE_DURATION);
        let result = self.lookup(host).await;
        timer.stop(self.emitter.as_ref());
        result
    }
}

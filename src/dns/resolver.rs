//! Hostname resolution backends.

use std::collections::HashMap;
use std::net::IpAddr;

use async_trait::async_trait;

use crate::error::ResolveError;

/// Resolves a hostname to a single address.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, host: &str) -> Result<IpAddr, ResolveError>;
}

/// Uncached lookup through the operating system resolver.
///
/// Returns the first address the system reports.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, host: &str) -> Result<IpAddr, ResolveError> {
        let mut addrs = tokio::net::lookup_host((host, 0))
            .await
            .map_err(|source| ResolveError::Lookup {
                host: host.to_string(),
                source,
            })?;

        addrs
            .next()
            .map(|addr| addr.ip())
            .ok_or_else(|| ResolveError::NoAddresses {
                host: host.to_string(),
            })
    }
}

/// Fixed host table. Unknown hosts fail with `NoAddresses`.
#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
    hosts: HashMap<String, IpAddr>,
}

impl StaticResolver {
    pub fn with(mut self, host: &str, ip: IpAddr) -> Self {
        self.hosts.insert(host.to_string(), ip);
        self
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(&self, host: &str) -> Result<IpAddr, ResolveError> {
        self.hosts
            .get(host)
            .copied()
            .ok_or_else(|| ResolveError::NoAddresses {
                host: host.to_string(),
            })
    }
}

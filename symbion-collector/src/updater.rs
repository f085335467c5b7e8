//! Address updaters: periodic replacement of the daemon's host list
//!
//! Strategies:
//! - `NoopUpdater`: keeps the current configuration
//! - `DirectoryUpdater`: resolves a logical endpoint through a host directory
//!   and rebuilds `host:port` addresses from the answer
//!
//! A failed or empty lookup is an `UpdaterError`; the daemon logs it and keeps
//! the previous (stale) host list.

use crate::config::DaemonConfig;
use crate::models::HostAddress;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::fmt::Debug;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum UpdaterError {
    #[error("directory lookup for {endpoint} failed: {reason}")]
    Lookup { endpoint: String, reason: String },
    #[error("directory returned no host for {0}")]
    Empty(String),
    #[error("address update timed out after {0:?}")]
    Timeout(Duration),
}

/// Pluggable host-list refresh policy.
#[async_trait]
pub trait AddressUpdater: Send + Sync + Debug {
    /// Build the next configuration from the current one.
    async fn update(&self, current: &DaemonConfig) -> Result<DaemonConfig, UpdaterError>;

    /// Run once synchronously when the daemon starts.
    fn update_on_start(&self) -> bool;

    /// Seconds between two runs; 0 disables the periodic loop.
    fn interval_secs(&self) -> u64;
}

/// External service resolving a logical endpoint into host names.
#[async_trait]
pub trait HostDirectory: Send + Sync + Debug {
    async fn resolve(&self, endpoint: &str) -> Result<Vec<String>, UpdaterError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopUpdater;

#[async_trait]
impl AddressUpdater for NoopUpdater {
    async fn update(&self, current: &DaemonConfig) -> Result<DaemonConfig, UpdaterError> {
        Ok(current.clone())
    }

    fn update_on_start(&self) -> bool {
        false
    }

    fn interval_secs(&self) -> u64 {
        0
    }
}

/// Resolves the endpoint with the system resolver (A/AAAA records).
#[derive(Debug, Clone, Copy, Default)]
pub struct DnsDirectory;

#[async_trait]
impl HostDirectory for DnsDirectory {
    async fn resolve(&self, endpoint: &str) -> Result<Vec<String>, UpdaterError> {
        // lookup_host exige un port, il est ignoré ensuite
        let addrs = tokio::net::lookup_host((endpoint, 0))
            .await
            .map_err(|e| UpdaterError::Lookup {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;

        let unique: BTreeSet<String> = addrs.map(|addr| addr.ip().to_string()).collect();
        Ok(unique.into_iter().collect())
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryUpdater<D> {
    directory: D,
    endpoint: String,
    port: u16,
    interval_secs: u64,
    update_on_start: bool,
}

impl<D: HostDirectory> DirectoryUpdater<D> {
    pub fn new(directory: D, endpoint: impl Into<String>, port: u16) -> Self {
        Self {
            directory,
            endpoint: endpoint.into(),
            port,
            interval_secs: 60,
            update_on_start: true,
        }
    }

    pub fn with_interval_secs(mut self, secs: u64) -> Self {
        self.interval_secs = secs;
        self
    }

    pub fn with_update_on_start(mut self, enabled: bool) -> Self {
        self.update_on_start = enabled;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// `host` + fixed port, with brackets around IPv6 literals.
    pub fn host_address(&self, host: &str) -> HostAddress {
        if host.contains(':') {
            format!("[{host}]:{}", self.port)
        } else {
            format!("{host}:{}", self.port)
        }
    }
}

#[async_trait]
impl<D: HostDirectory> AddressUpdater for DirectoryUpdater<D> {
    async fn update(&self, current: &DaemonConfig) -> Result<DaemonConfig, UpdaterError> {
        let hosts = self.directory.resolve(&self.endpoint).await?;
        if hosts.is_empty() {
            return Err(UpdaterError::Empty(self.endpoint.clone()));
        }

        let addresses: Vec<HostAddress> = hosts.iter().map(|h| self.host_address(h)).collect();
        debug!(endpoint = %self.endpoint, hosts = addresses.len(), "resolved host directory");
        Ok(current.with_hosts(addresses))
    }

    fn update_on_start(&self) -> bool {
        self.update_on_start
    }

    fn interval_secs(&self) -> u64 {
        self.interval_secs
    }
}

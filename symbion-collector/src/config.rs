/**
 * CONFIGURATION - Fichier YAML + variables d'environnement => DaemonConfig
 *
 * RÔLE : `CollectorFile` est la forme disque (collector.yaml), `DaemonConfig`
 * la forme validée et figée qu'utilise le daemon. Toute la validation passe par
 * `DaemonConfigBuilder::build`.
 *
 * RÈGLES :
 * - mode par défaut OnRequest
 * - Polling : intervalle > 0, 5s si absent ; OnRequest : intervalle interdit
 * - sans updater actif, la liste d'hôtes doit être non vide
 * - cache_count borné à [1, 100], 10 par défaut
 */

use crate::filter::LineFilter;
use crate::models::HostAddress;
use crate::updater::{AddressUpdater, DirectoryUpdater, DnsDirectory};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

pub const DEFAULT_POLLING_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_CACHE_COUNT: usize = 10;
pub const MAX_CACHE_COUNT: usize = 100;
pub const DEFAULT_HOST_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_RESOURCE_API_PORT: u16 = 4194;
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:9273";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("polling interval must be positive")]
    ZeroInterval,
    #[error("a polling interval is only allowed in polling mode")]
    IntervalInOnRequestMode,
    #[error("host list is empty and no address updater is enabled")]
    NoHosts,
    #[error("address updater is enabled but none is configured")]
    MissingUpdater,
    #[error("host timeout must be positive")]
    ZeroTimeout,
    #[error("invalid listen address {0:?}")]
    ListenAddr(String),
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Background ticker refreshes the snapshot; accessors never block on I/O.
    Polling,
    /// Every accessor call triggers a fresh refresh.
    #[default]
    OnRequest,
}

/// Validated daemon configuration, frozen for the duration of a cycle.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    mode: Mode,
    hosts: Vec<HostAddress>,
    polling_interval: Option<Duration>,
    cache_count: usize,
    host_timeout: Duration,
    updater_enabled: bool,
    updater: Option<Arc<dyn AddressUpdater>>,
    host_monitor_enabled: bool,
    resource_api_port: u16,
    filter: LineFilter,
}

impl DaemonConfig {
    pub fn builder() -> DaemonConfigBuilder {
        DaemonConfigBuilder::default()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn hosts(&self) -> &[HostAddress] {
        &self.hosts
    }

    /// Always `Some` in polling mode, `None` otherwise.
    pub fn polling_interval(&self) -> Option<Duration> {
        self.polling_interval
    }

    pub fn cache_count(&self) -> usize {
        self.cache_count
    }

    pub fn host_timeout(&self) -> Duration {
        self.host_timeout
    }

    pub fn updater_enabled(&self) -> bool {
        self.updater_enabled
    }

    /// The updater, only when enabled.
    pub fn updater(&self) -> Option<&Arc<dyn AddressUpdater>> {
        if self.updater_enabled {
            self.updater.as_ref()
        } else {
            None
        }
    }

    pub fn host_monitor_enabled(&self) -> bool {
        self.host_monitor_enabled
    }

    pub fn resource_api_port(&self) -> u16 {
        self.resource_api_port
    }

    pub fn filter(&self) -> &LineFilter {
        &self.filter
    }

    /// Copy of this config with the host list replaced wholesale.
    pub fn with_hosts(&self, hosts: Vec<HostAddress>) -> Self {
        Self {
            hosts,
            ..self.clone()
        }
    }
}

#[derive(Default)]
pub struct DaemonConfigBuilder {
    mode: Option<Mode>,
    hosts: Vec<HostAddress>,
    polling_interval_secs: Option<u64>,
    cache_count: Option<usize>,
    host_timeout_ms: Option<u64>,
    updater_enabled: bool,
    updater: Option<Arc<dyn AddressUpdater>>,
    host_monitor_enabled: bool,
    resource_api_port: Option<u16>,
    indexes: Option<Vec<String>>,
}

impl DaemonConfigBuilder {
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<HostAddress>,
    {
        self.hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    pub fn polling_interval_secs(mut self, secs: u64) -> Self {
        self.polling_interval_secs = Some(secs);
        self
    }

    pub fn cache_count(mut self, count: usize) -> Self {
        self.cache_count = Some(count);
        self
    }

    pub fn host_timeout_ms(mut self, ms: u64) -> Self {
        self.host_timeout_ms = Some(ms);
        self
    }

    /// Installs and enables an address updater.
    pub fn updater(mut self, updater: Arc<dyn AddressUpdater>) -> Self {
        self.updater = Some(updater);
        self.updater_enabled = true;
        self
    }

    pub fn updater_enabled(mut self, enabled: bool) -> Self {
        self.updater_enabled = enabled;
        self
    }

    pub fn host_monitor_enabled(mut self, enabled: bool) -> Self {
        self.host_monitor_enabled = enabled;
        self
    }

    pub fn resource_api_port(mut self, port: u16) -> Self {
        self.resource_api_port = Some(port);
        self
    }

    /// Overrides the scraped index names (defaults to the four tracked ones).
    pub fn indexes<I, S>(mut self, indexes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indexes = Some(indexes.into_iter().map(Into::into).collect());
        self
    }

    pub fn build(self) -> Result<DaemonConfig, ConfigError> {
        let mode = self.mode.unwrap_or_default();

        let polling_interval = match (mode, self.polling_interval_secs) {
            (Mode::Polling, None) => Some(Duration::from_secs(DEFAULT_POLLING_INTERVAL_SECS)),
            (Mode::Polling, Some(0)) => return Err(ConfigError::ZeroInterval),
            (Mode::Polling, Some(secs)) => Some(Duration::from_secs(secs)),
            (Mode::OnRequest, Some(_)) => return Err(ConfigError::IntervalInOnRequestMode),
            (Mode::OnRequest, None) => None,
        };

        if self.updater_enabled && self.updater.is_none() {
            return Err(ConfigError::MissingUpdater);
        }
        if !self.updater_enabled && self.hosts.is_empty() {
            return Err(ConfigError::NoHosts);
        }

        let host_timeout_ms = self.host_timeout_ms.unwrap_or(DEFAULT_HOST_TIMEOUT_MS);
        if host_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }

        let cache_count = self
            .cache_count
            .unwrap_or(DEFAULT_CACHE_COUNT)
            .clamp(1, MAX_CACHE_COUNT);

        let filter = match self.indexes {
            Some(indexes) => LineFilter::new(indexes),
            None => LineFilter::default(),
        };

        Ok(DaemonConfig {
            mode,
            hosts: self.hosts,
            polling_interval,
            cache_count,
            host_timeout: Duration::from_millis(host_timeout_ms),
            updater_enabled: self.updater_enabled,
            updater: self.updater,
            host_monitor_enabled: self.host_monitor_enabled,
            resource_api_port: self.resource_api_port.unwrap_or(DEFAULT_RESOURCE_API_PORT),
            filter,
        })
    }
}

/// `updater:` section of collector.yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdaterConf {
    #[serde(default)]
    pub enabled: bool,
    /// Logical name resolved by the host directory (ex: "backends.svc.local")
    pub endpoint: String,
    /// Port appended to each resolved host.
    pub port: u16,
    #[serde(default = "default_updater_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_true")]
    pub update_on_start: bool,
}

fn default_updater_interval() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

/// On-disk configuration (collector.yaml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectorFile {
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub hosts: Vec<HostAddress>,
    pub polling_interval_secs: Option<u64>,
    pub cache_count: Option<usize>,
    pub host_timeout_ms: Option<u64>,
    #[serde(default)]
    pub host_monitor_enabled: bool,
    pub resource_api_port: Option<u16>,
    pub indexes: Option<Vec<String>>,
    pub updater: Option<UpdaterConf>,
    pub listen_addr: Option<String>,
}

impl CollectorFile {
    /// `SYMBION_COLLECTOR_HOSTS` (séparés par des virgules) et
    /// `SYMBION_COLLECTOR_LISTEN` remplacent les valeurs du fichier.
    pub fn apply_overrides(&mut self, hosts: Option<String>, listen: Option<String>) {
        if let Some(hosts) = hosts {
            self.hosts = hosts
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(listen) = listen {
            self.listen_addr = Some(listen);
        }
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = self.listen_addr.as_deref().unwrap_or(DEFAULT_LISTEN_ADDR);
        raw.parse()
            .map_err(|_| ConfigError::ListenAddr(raw.to_string()))
    }

    pub fn into_daemon_config(self) -> Result<DaemonConfig, ConfigError> {
        let mut builder = DaemonConfig::builder()
            .mode(self.mode)
            .hosts(self.hosts)
            .host_monitor_enabled(self.host_monitor_enabled);

        if let Some(secs) = self.polling_interval_secs {
            builder = builder.polling_interval_secs(secs);
        }
        if let Some(count) = self.cache_count {
            builder = builder.cache_count(count);
        }
        if let Some(ms) = self.host_timeout_ms {
            builder = builder.host_timeout_ms(ms);
        }
        if let Some(port) = self.resource_api_port {
            builder = builder.resource_api_port(port);
        }
        if let Some(indexes) = self.indexes {
            builder = builder.indexes(indexes);
        }
        if let Some(conf) = self.updater.filter(|u| u.enabled) {
            let updater = DirectoryUpdater::new(DnsDirectory, conf.endpoint, conf.port)
                .with_interval_secs(conf.interval_secs)
                .with_update_on_start(conf.update_on_start);
            builder = builder.updater(Arc::new(updater));
        }

        builder.build()
    }
}

pub async fn load_config_from(path: &Path) -> Result<CollectorFile, ConfigError> {
    if !path.exists() {
        warn!(path = %path.display(), "no collector config file, using defaults");
        return Ok(CollectorFile::default());
    }

    let txt = fs::read_to_string(path).await.map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if txt.trim().is_empty() {
        return Ok(CollectorFile::default());
    }

    let file = serde_yaml::from_str(&txt).map_err(|source| ConfigError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "loaded collector config");
    Ok(file)
}

/// Load collector.yaml (or `$SYMBION_COLLECTOR_CONFIG`) and apply env overrides.
pub async fn load_config() -> Result<CollectorFile, ConfigError> {
    let path = std::env::var("SYMBION_COLLECTOR_CONFIG").unwrap_or_else(|_| "collector.yaml".into());
    let mut file = load_config_from(Path::new(&path)).await?;
    file.apply_overrides(
        std::env::var("SYMBION_COLLECTOR_HOSTS").ok(),
        std::env::var("SYMBION_COLLECTOR_LISTEN").ok(),
    );
    Ok(file)
}

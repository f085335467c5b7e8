//! Symbion collector - scrapes backend hosts, aggregates per-application
//! usage samples and re-exposes them in the text exposition format.
//!
//! Pipeline: retriever -> filter -> codec -> aggregator -> composer, driven
//! by [`daemon::Daemon`] in polling or on-request mode.

pub mod aggregator;
pub mod codec;
pub mod composer;
pub mod config;
pub mod daemon;
pub mod filter;
pub mod health;
pub mod http;
pub mod models;
pub mod resources;
pub mod retriever;
pub mod state;
pub mod updater;

pub use config::{load_config, CollectorFile, ConfigError, DaemonConfig, Mode};
pub use daemon::{CycleSnapshot, Daemon, DaemonError};
pub use models::{convert_to_ip, HostAddress, Sample, SampleBatch};
pub use updater::{AddressUpdater, DirectoryUpdater, DnsDirectory, HostDirectory, NoopUpdater};

//! Host resource retrieval from a cAdvisor-style introspection API.
//!
//! For every host we read the machine description and the two most recent
//! samples of the root container, then derive CPU and memory utilisation:
//!
//! - cpu = min(100, (Δcpu_total / Δt_ns / cores) * 100)
//! - mem = usage / min(container_limit, machine_capacity) * 100
//!
//! The result is two synthetic samples, `host_cpu_usage` and
//! `host_memory_usage`, tagged `alert="true"` and `host_ip=<ip>`.

use crate::codec;
use crate::models::{convert_to_ip, HostAddress, Sample, SampleBatch};
use crate::retriever::{fan_out, FetchError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::OffsetDateTime;
use tracing::debug;

pub const HOST_CPU_INDEX: &str = "host_cpu_usage";
pub const HOST_MEMORY_INDEX: &str = "host_memory_usage";

/// Nombre d'échantillons demandés au conteneur racine
const NUM_STATS: u32 = 2;

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("invalid response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("host does not report cpu and memory accounting")]
    MissingCapability,
    #[error("need at least 2 resource samples, got {0}")]
    NotEnoughSamples(usize),
    #[error("machine reports zero cores")]
    NoCores,
    #[error("resource samples are not increasing in time")]
    NonIncreasingSamples,
    #[error("memory limit is zero")]
    ZeroMemoryLimit,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MachineInfo {
    pub num_cores: u32,
    pub memory_capacity: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContainerInfo {
    pub spec: ContainerSpec,
    #[serde(default)]
    pub stats: Vec<ContainerStats>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerSpec {
    #[serde(default)]
    pub has_cpu: bool,
    #[serde(default)]
    pub has_memory: bool,
    #[serde(default)]
    pub memory: MemorySpec,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemorySpec {
    #[serde(default)]
    pub limit: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContainerStats {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub cpu: CpuStats,
    pub memory: MemoryStats,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CpuStats {
    pub usage: CpuUsage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CpuUsage {
    /// Cumulative CPU time, nanoseconds.
    pub total: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemoryStats {
    /// Bytes.
    pub usage: u64,
}

#[derive(Debug, Serialize)]
struct ContainerInfoRequest {
    num_stats: u32,
}

/// Utilisation calculée pour un hôte (pourcentages)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostUsage {
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

/// Derive usage percentages from the machine description and root container.
pub fn compute_usage(machine: &MachineInfo, info: &ContainerInfo) -> Result<HostUsage, ResourceError> {
    if !info.spec.has_cpu || !info.spec.has_memory {
        return Err(ResourceError::MissingCapability);
    }
    let [.., prev, cur] = info.stats.as_slice() else {
        return Err(ResourceError::NotEnoughSamples(info.stats.len()));
    };
    if machine.num_cores == 0 {
        return Err(ResourceError::NoCores);
    }

    let elapsed_ns = (cur.timestamp - prev.timestamp).whole_nanoseconds();
    if elapsed_ns <= 0 {
        return Err(ResourceError::NonIncreasingSamples);
    }

    let cpu_delta = cur.cpu.usage.total as f64 - prev.cpu.usage.total as f64;
    let cpu_percent =
        (cpu_delta / elapsed_ns as f64 / f64::from(machine.num_cores) * 100.0).min(100.0);

    let mem_limit = info.spec.memory.limit.min(machine.memory_capacity);
    if mem_limit == 0 {
        return Err(ResourceError::ZeroMemoryLimit);
    }
    let memory_percent = cur.memory.usage as f64 / mem_limit as f64 * 100.0;

    Ok(HostUsage {
        cpu_percent,
        memory_percent,
    })
}

/// The two synthetic host samples; nothing when `host_ip` is empty.
pub fn host_samples(cpu: f64, memory: f64, host_ip: &str) -> Vec<Sample> {
    if host_ip.is_empty() {
        return Vec::new();
    }
    vec![
        Sample::new(HOST_CPU_INDEX, cpu)
            .with_label("alert", "true")
            .with_label("host_ip", host_ip),
        Sample::new(HOST_MEMORY_INDEX, memory)
            .with_label("alert", "true")
            .with_label("host_ip", host_ip),
    ]
}

/// Composed exposition lines for one host (cpu first, then memory).
pub fn compose_host_metrics_lines(cpu: f64, memory: f64, host_ip: &str) -> Vec<String> {
    host_samples(cpu, memory, host_ip)
        .iter()
        .map(codec::compose)
        .collect()
}

pub fn resource_api_base(host_ip: &str, port: u16) -> String {
    if host_ip.contains(':') {
        format!("http://[{host_ip}]:{port}")
    } else {
        format!("http://{host_ip}:{port}")
    }
}

async fn fetch_machine_info(
    client: &reqwest::Client,
    base: &str,
    timeout: Duration,
) -> Result<MachineInfo, ResourceError> {
    let url = format!("{base}/api/v1.3/machine");
    let response = client
        .get(&url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| FetchError::from_reqwest(&url, timeout, e))?;
    if !response.status().is_success() {
        let status = response.status();
        return Err(FetchError::Status { url, status }.into());
    }
    response
        .json()
        .await
        .map_err(|source| ResourceError::Decode { url, source })
}

async fn fetch_root_container(
    client: &reqwest::Client,
    base: &str,
    timeout: Duration,
) -> Result<ContainerInfo, ResourceError> {
    let url = format!("{base}/api/v1.3/containers/");
    let response = client
        .post(&url)
        .timeout(timeout)
        .json(&ContainerInfoRequest { num_stats: NUM_STATS })
        .send()
        .await
        .map_err(|e| FetchError::from_reqwest(&url, timeout, e))?;
    if !response.status().is_success() {
        let status = response.status();
        return Err(FetchError::Status { url, status }.into());
    }
    response
        .json()
        .await
        .map_err(|source| ResourceError::Decode { url, source })
}

/// Query one host's resource API and build its usage samples.
pub async fn fetch_host_usage(
    client: &reqwest::Client,
    host: &str,
    resource_api_port: u16,
    timeout: Duration,
) -> Result<SampleBatch, ResourceError> {
    let host_ip = convert_to_ip(host);
    if host_ip.is_empty() {
        return Ok(SampleBatch::new(host, Vec::new()));
    }

    let base = resource_api_base(&host_ip, resource_api_port);
    let (machine, container) = tokio::try_join!(
        fetch_machine_info(client, &base, timeout),
        fetch_root_container(client, &base, timeout),
    )?;

    let usage = compute_usage(&machine, &container)?;
    debug!(
        host = %host,
        cpu = usage.cpu_percent,
        memory = usage.memory_percent,
        "computed host usage"
    );
    Ok(SampleBatch::new(
        host,
        host_samples(usage.cpu_percent, usage.memory_percent, &host_ip),
    ))
}

/// Fan-out over every host, exactly like the metrics scrape.
pub async fn retrieve_host_batches(
    client: &reqwest::Client,
    hosts: &[HostAddress],
    resource_api_port: u16,
    timeout: Duration,
) -> Vec<SampleBatch> {
    fan_out(hosts, "host resource query", |host| {
        let client = client.clone();
        async move { fetch_host_usage(&client, &host, resource_api_port, timeout).await }
    })
    .await
    .into_iter()
    .filter(|batch| !batch.is_empty())
    .collect()
}

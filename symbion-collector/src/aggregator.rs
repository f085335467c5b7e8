//! Per-entity averaging of the scraped container samples.
//!
//! Samples are bucketed by their `app_id` label, then each bucket is reduced to
//! four averages (cpu high/low, memory high/low).
//!
//! Sentinel: a kind with no sample, or whose values sum to exactly `0.0`,
//! averages to [`SENTINEL`] (`1.0`). Downstream alert rules treat `1.0` as
//! "ignore". A genuine all-zero reading is therefore indistinguishable from
//! missing data; this is kept on purpose for compatibility with those rules.

use crate::models::Sample;
use serde::Serialize;
use std::collections::HashMap;

pub const CPU_HIGH_INDEX: &str = "container_cpu_usage_high_result";
pub const CPU_LOW_INDEX: &str = "container_cpu_usage_low_result";
pub const MEM_HIGH_INDEX: &str = "container_memory_usage_high_result";
pub const MEM_LOW_INDEX: &str = "container_memory_usage_low_result";

/// Index names the collector scrapes and averages.
pub const TRACKED_INDEXES: [&str; 4] = [CPU_HIGH_INDEX, CPU_LOW_INDEX, MEM_HIGH_INDEX, MEM_LOW_INDEX];

/// Label carrying the entity (application) id.
pub const ENTITY_LABEL: &str = "app_id";

/// "No reliable data" marker.
pub const SENTINEL: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MetricKind {
    CpuHigh,
    CpuLow,
    MemHigh,
    MemLow,
}

impl MetricKind {
    pub const ALL: [MetricKind; 4] = [
        MetricKind::CpuHigh,
        MetricKind::CpuLow,
        MetricKind::MemHigh,
        MetricKind::MemLow,
    ];

    pub fn from_index(index: &str) -> Option<Self> {
        match index {
            CPU_HIGH_INDEX => Some(MetricKind::CpuHigh),
            CPU_LOW_INDEX => Some(MetricKind::CpuLow),
            MEM_HIGH_INDEX => Some(MetricKind::MemHigh),
            MEM_LOW_INDEX => Some(MetricKind::MemLow),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EntityAverages {
    pub cpu_high: f64,
    pub cpu_low: f64,
    pub mem_high: f64,
    pub mem_low: f64,
}

impl EntityAverages {
    pub fn get(&self, kind: MetricKind) -> f64 {
        match kind {
            MetricKind::CpuHigh => self.cpu_high,
            MetricKind::CpuLow => self.cpu_low,
            MetricKind::MemHigh => self.mem_high,
            MetricKind::MemLow => self.mem_low,
        }
    }
}

impl Default for EntityAverages {
    fn default() -> Self {
        Self {
            cpu_high: SENTINEL,
            cpu_low: SENTINEL,
            mem_high: SENTINEL,
            mem_low: SENTINEL,
        }
    }
}

/// Bucket samples by entity id; samples without the label go under `""`.
pub fn group<'a, I>(samples: I) -> HashMap<String, Vec<Sample>>
where
    I: IntoIterator<Item = &'a Sample>,
{
    let mut buckets: HashMap<String, Vec<Sample>> = HashMap::new();
    for sample in samples {
        let key = sample.label(ENTITY_LABEL).unwrap_or_default().to_string();
        buckets.entry(key).or_default().push(sample.clone());
    }
    buckets
}

/// Average each tracked kind over one bucket, applying the sentinel rule.
pub fn average(samples: &[Sample]) -> EntityAverages {
    let mut sums = [0.0_f64; 4];
    let mut counts = [0_usize; 4];

    for sample in samples {
        if let Some(kind) = MetricKind::from_index(&sample.index) {
            let slot = kind as usize;
            sums[slot] += sample.value;
            counts[slot] += 1;
        }
    }

    let mean = |kind: MetricKind| {
        let slot = kind as usize;
        if counts[slot] == 0 || sums[slot] == 0.0 {
            SENTINEL
        } else {
            sums[slot] / counts[slot] as f64
        }
    };

    EntityAverages {
        cpu_high: mean(MetricKind::CpuHigh),
        cpu_low: mean(MetricKind::CpuLow),
        mem_high: mean(MetricKind::MemHigh),
        mem_low: mean(MetricKind::MemLow),
    }
}

/// Un bucket agrégé : moyennes + premier échantillon (source des labels)
#[derive(Debug, Clone)]
pub struct EntityAggregate {
    pub entity_id: String,
    pub averages: EntityAverages,
    pub first_sample: Sample,
}

/// Group then average every bucket.
pub fn aggregate<'a, I>(samples: I) -> Vec<EntityAggregate>
where
    I: IntoIterator<Item = &'a Sample>,
{
    group(samples)
        .into_iter()
        .filter_map(|(entity_id, bucket)| {
            let first_sample = bucket.first()?.clone();
            Some(EntityAggregate {
                averages: average(&bucket),
                entity_id,
                first_sample,
            })
        })
        .collect()
}

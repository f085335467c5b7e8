/**
 * COMPOSER - Reconstruit les lignes d'exposition agrégées par application
 *
 * RÔLE : pour chaque entité, 4 lignes (cpu high/low, mem high/low) qui
 * reprennent les labels d'identification du premier échantillon de l'entité
 * et remplacent `alert_name`. En-têtes TYPE + bannière une seule fois.
 *
 * ORDRE : l'ordre des entités n'est pas garanti, les consommateurs ne doivent
 * pas en dépendre.
 */

use crate::aggregator::{EntityAggregate, MetricKind};
use crate::codec;
use crate::models::Sample;

pub const CPU_AVG_INDEX: &str = "app_cpu_usage_avg";
pub const MEM_AVG_INDEX: &str = "app_memory_usage_avg";

pub const BANNER: &str = "# aggregated per application by symbion-collector";

/// Labels recopiés depuis le premier échantillon de l'entité
pub const CARRIED_LABELS: [&str; 9] = [
    "alert",
    "app_id",
    "container_id",
    "group_id",
    "image",
    "repair_template_id",
    "service_group_id",
    "service_group_instance_id",
    "service_order_id",
];

pub const ALERT_NAME_LABEL: &str = "alert_name";

impl MetricKind {
    pub fn aggregate_index(self) -> &'static str {
        match self {
            MetricKind::CpuHigh | MetricKind::CpuLow => CPU_AVG_INDEX,
            MetricKind::MemHigh | MetricKind::MemLow => MEM_AVG_INDEX,
        }
    }

    pub fn alert_name(self) -> &'static str {
        match self {
            MetricKind::CpuHigh => "app_cpu_usage_high",
            MetricKind::CpuLow => "app_cpu_usage_low",
            MetricKind::MemHigh => "app_memory_usage_high",
            MetricKind::MemLow => "app_memory_usage_low",
        }
    }
}

/// The four aggregate samples of one entity, cpu-high first.
pub fn entity_samples(aggregate: &EntityAggregate) -> Vec<Sample> {
    MetricKind::ALL
        .iter()
        .map(|&kind| {
            let mut sample = Sample::new(kind.aggregate_index(), aggregate.averages.get(kind));
            for key in CARRIED_LABELS {
                if let Some(value) = aggregate.first_sample.label(key) {
                    sample.labels.insert(key.to_string(), value.to_string());
                }
            }
            sample
                .labels
                .insert(ALERT_NAME_LABEL.to_string(), kind.alert_name().to_string());
            sample
        })
        .collect()
}

/// Full composed result; empty when there is no entity.
pub fn compose(aggregates: &[EntityAggregate]) -> String {
    if aggregates.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    out.push_str(&format!("# TYPE {CPU_AVG_INDEX} gauge\n"));
    out.push_str(&format!("# TYPE {MEM_AVG_INDEX} gauge\n"));
    out.push_str(BANNER);
    out.push('\n');

    for aggregate in aggregates {
        for sample in entity_samples(aggregate) {
            out.push_str(&codec::compose(&sample));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{aggregate, EntityAverages, CPU_HIGH_INDEX, MEM_LOW_INDEX, SENTINEL};

    fn first_sample() -> Sample {
        Sample::new(CPU_HIGH_INDEX, 10.0)
            .with_label("alert", "true")
            .with_label("app_id", "app-1")
            .with_label("container_id", "c-9")
            .with_label("image", "nginx:1.25")
            .with_label("alert_name", "upstream")
            .with_label("pod", "not-carried")
    }

    #[test]
    fn test_empty_result() {
        assert_eq!(compose(&[]), "");
    }

    #[test]
    fn test_entity_samples_carry_labels() {
        let agg = EntityAggregate {
            entity_id: "app-1".into(),
            averages: EntityAverages {
                cpu_high: 10.0,
                cpu_low: 2.0,
                mem_high: 70.0,
                mem_low: SENTINEL,
            },
            first_sample: first_sample(),
        };
        let samples = entity_samples(&agg);
        assert_eq!(samples.len(), 4);

        assert_eq!(samples[0].index, CPU_AVG_INDEX);
        assert_eq!(samples[0].label("alert_name"), Some("app_cpu_usage_high"));
        assert_eq!(samples[0].value, 10.0);
        assert_eq!(samples[1].label("alert_name"), Some("app_cpu_usage_low"));
        assert_eq!(samples[2].index, MEM_AVG_INDEX);
        assert_eq!(samples[3].label("alert_name"), Some("app_memory_usage_low"));
        assert_eq!(samples[3].value, SENTINEL);

        for s in &samples {
            assert_eq!(s.label("image"), Some("nginx:1.25"));
            assert_eq!(s.label("container_id"), Some("c-9"));
            assert_eq!(s.label("pod"), None);
            // labels absents du premier échantillon : non émis
            assert_eq!(s.label("group_id"), None);
        }
    }

    #[test]
    fn test_compose_layout() {
        let samples = vec![
            first_sample(),
            Sample::new(MEM_LOW_INDEX, 4.0).with_label("app_id", "app-1"),
            Sample::new(CPU_HIGH_INDEX, 50.0).with_label("app_id", "app-2"),
        ];
        let text = compose(&aggregate(&samples));
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3 + 2 * 4);
        assert_eq!(lines[0], "# TYPE app_cpu_usage_avg gauge");
        assert_eq!(lines[1], "# TYPE app_memory_usage_avg gauge");
        assert_eq!(lines[2], BANNER);
        assert_eq!(lines.iter().filter(|l| l.starts_with('#')).count(), 3);
        assert!(text.contains(
            "app_cpu_usage_avg{alert=\"true\",alert_name=\"app_cpu_usage_high\",app_id=\"app-1\",container_id=\"c-9\",image=\"nginx:1.25\"} 1.000000e+01\n"
        ));
        assert!(text.contains(
            "app_memory_usage_avg{alert_name=\"app_memory_usage_low\",app_id=\"app-2\"} 1.000000e+00\n"
        ));
    }
}

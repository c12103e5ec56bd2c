//! Pull-based exposition of per-instance utilization samples
//!
//! Renders the sampler's current sample set in the Prometheus text format:
//! one `# HELP` / `# TYPE` header pair per metric followed by one line per
//! task instance, values with two decimals.

use crate::models::UtilizationSample;
use crate::sampler::SampleSet;
use std::fmt::Write;

/// Per-instance CPU utilization metric
pub const CPU_METRIC: &str = "container_cpu_usage_percent";
/// Per-instance memory usage metric
pub const MEMORY_USAGE_METRIC: &str = "container_memory_usage_mb";
/// Per-instance memory limit metric
pub const MEMORY_LIMIT_METRIC: &str = "container_memory_limit_mb";

/// Label holding the workload name
pub const WORKLOAD_LABEL: &str = "service";
/// Label holding the task name
pub const TASK_LABEL: &str = "task";
/// Label holding the short instance id
pub const INSTANCE_LABEL: &str = "container_id";

/// Content type of the rendered exposition
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

struct MetricFamily {
    name: &'static str,
    help: &'static str,
    value: fn(&UtilizationSample) -> f64,
}

fn cpu_value(sample: &UtilizationSample) -> f64 {
    sample.cpu_percent
}

fn memory_used_value(sample: &UtilizationSample) -> f64 {
    sample.memory_used_mb
}

fn memory_limit_value(sample: &UtilizationSample) -> f64 {
    sample.memory_limit_mb
}

const FAMILIES: [MetricFamily; 3] = [
    MetricFamily {
        name: CPU_METRIC,
        help: "CPU usage percentage of the container",
        value: cpu_value,
    },
    MetricFamily {
        name: MEMORY_USAGE_METRIC,
        help: "Memory usage in megabytes",
        value: memory_used_value,
    },
    MetricFamily {
        name: MEMORY_LIMIT_METRIC,
        help: "Memory limit in megabytes",
        value: memory_limit_value,
    },
];

/// Render samples in the text exposition format
pub fn render_exposition(samples: &[UtilizationSample]) -> String {
    let mut out = String::new();

    for (i, family) in FAMILIES.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = writeln!(out, "# HELP {} {}", family.name, family.help);
        let _ = writeln!(out, "# TYPE {} gauge", family.name);

        for sample in samples {
            let _ = writeln!(
                out,
                "{}{{{}=\"{}\",{}=\"{}\",{}=\"{}\"}} {:.2}",
                family.name,
                WORKLOAD_LABEL,
                escape_label_value(&sample.workload),
                TASK_LABEL,
                escape_label_value(&sample.task_name),
                INSTANCE_LABEL,
                escape_label_value(&sample.instance_id),
                (family.value)(sample),
            );
        }
    }

    out
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', r"\\")
        .replace('"', "\\\"")
        .replace('\n', r"\n")
}

/// Stateless publisher over the shared sample set
#[derive(Clone)]
pub struct MetricPublisher {
    samples: SampleSet,
}

impl MetricPublisher {
    pub fn new(samples: SampleSet) -> Self {
        Self { samples }
    }

    /// Render the current sample set
    pub async fn render(&self) -> String {
        let samples = self.samples.snapshot().await;
        render_exposition(&samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;

    fn sample(workload: &str, task: &str, id: &str, cpu: f64) -> UtilizationSample {
        UtilizationSample {
            workload: workload.to_string(),
            task_name: task.to_string(),
            instance_id: id.to_string(),
            cpu_percent: cpu,
            memory_percent: 12.5,
            memory_used_mb: 128.0,
            memory_limit_mb: 1024.0,
            sampled_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_sample_set_renders_headers_only() {
        let text = render_exposition(&[]);
        let expected = "\
# HELP container_cpu_usage_percent CPU usage percentage of the container
# TYPE container_cpu_usage_percent gauge

# HELP container_memory_usage_mb Memory usage in megabytes
# TYPE container_memory_usage_mb gauge

# HELP container_memory_limit_mb Memory limit in megabytes
# TYPE container_memory_limit_mb gauge
";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_sample_lines_use_two_decimals() {
        let text = render_exposition(&[sample("web", "web.1.abc", "0123456789ab", 42.5)]);

        assert!(text.contains(
            r#"container_cpu_usage_percent{service="web",task="web.1.abc",container_id="0123456789ab"} 42.50"#
        ));
        assert!(text.contains(
            r#"container_memory_usage_mb{service="web",task="web.1.abc",container_id="0123456789ab"} 128.00"#
        ));
        assert!(text.contains(
            r#"container_memory_limit_mb{service="web",task="web.1.abc",container_id="0123456789ab"} 1024.00"#
        ));
    }

    #[test]
    fn test_label_values_are_escaped() {
        let text = render_exposition(&[sample("we\"b", "a\\b", "id", 1.0)]);
        assert!(text.contains(r#"service="we\"b",task="a\\b""#));
    }

    #[test]
    fn test_rendered_lines_parse_back_to_sample_values() {
        use crate::query::parse_exposition;

        let samples = vec![
            sample("web", "web.1.abc", "0123456789ab", 42.5),
            sample("api", "api.2.def", "ba9876543210", 3.25),
        ];
        let rows = parse_exposition(&render_exposition(&samples));
        assert_eq!(rows.len(), 6);

        let mut cpu: Vec<(String, String, String, f64)> = rows
            .iter()
            .filter(|row| row.label(crate::query::NAME_LABEL) == Some(CPU_METRIC))
            .map(|row| {
                (
                    row.label(WORKLOAD_LABEL).unwrap_or_default().to_string(),
                    row.label(TASK_LABEL).unwrap_or_default().to_string(),
                    row.label(INSTANCE_LABEL).unwrap_or_default().to_string(),
                    row.value,
                )
            })
            .collect();
        cpu.sort_by(|a, b| a.0.cmp(&b.0));

        assert_eq!(
            cpu,
            vec![
                (
                    "api".to_string(),
                    "api.2.def".to_string(),
                    "ba9876543210".to_string(),
                    3.25
                ),
                (
                    "web".to_string(),
                    "web.1.abc".to_string(),
                    "0123456789ab".to_string(),
                    42.5
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_publisher_reads_installed_samples() {
        let samples = SampleSet::new();
        let publisher = MetricPublisher::new(samples.clone());

        let mut map = HashMap::new();
        map.insert("full-id".to_string(), sample("api", "api.1", "full-id", 7.0));
        samples.install(map).await;

        let text = publisher.render().await;
        assert!(text.contains(r#"container_cpu_usage_percent{service="api",task="api.1",container_id="full-id"} 7.00"#));
    }
}

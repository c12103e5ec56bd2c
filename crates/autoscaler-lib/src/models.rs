//! Core data models for the autoscaler

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bytes per megabyte used for memory conversions
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// A running task instance as reported by the workload runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInstance {
    /// Full runtime identifier; changes when the task restarts
    pub instance_id: String,
    /// Owning workload, if the runtime associates one
    pub workload: Option<String>,
    /// Task name within the workload
    pub task_name: Option<String>,
}

impl TaskInstance {
    /// Short identifier used as the `container_id` exposition label
    pub fn short_id(&self) -> &str {
        let end = self
            .instance_id
            .char_indices()
            .nth(12)
            .map(|(i, _)| i)
            .unwrap_or(self.instance_id.len());
        &self.instance_id[..end]
    }
}

/// A pair of cumulative CPU counters captured at the same instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuCounters {
    /// CPU time consumed by the instance
    pub cpu_time_used: u64,
    /// CPU time available on the host (normalisation base)
    pub cpu_time_total: u64,
}

/// Raw stats returned by one `SampleResourceUsage` call
///
/// `previous` carries the collaborator's own baseline pair, when it reports
/// one, so a cold instance still yields a CPU figure on its first sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawResourceStats {
    pub current: CpuCounters,
    pub previous: Option<CpuCounters>,
    /// Length of the per-core usage breakdown (0 when not reported)
    pub per_core_count: u32,
    /// Online CPU count (0 when not reported)
    pub online_cpus: u32,
    pub memory_used_bytes: u64,
    pub memory_limit_bytes: u64,
}

impl RawResourceStats {
    /// Core count used to scale the CPU ratio; never zero
    pub fn num_cores(&self) -> u32 {
        if self.per_core_count > 0 {
            self.per_core_count
        } else if self.online_cpus > 0 {
            self.online_cpus
        } else {
            1
        }
    }
}

/// The retained counter snapshot for one task instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub cpu: CpuCounters,
    pub memory_used_bytes: u64,
    pub memory_limit_bytes: u64,
    pub captured_at: DateTime<Utc>,
}

impl ResourceSnapshot {
    pub fn from_stats(stats: &RawResourceStats, captured_at: DateTime<Utc>) -> Self {
        Self {
            cpu: stats.current,
            memory_used_bytes: stats.memory_used_bytes,
            memory_limit_bytes: stats.memory_limit_bytes,
            captured_at,
        }
    }
}

/// Per-instance utilization derived by the sampler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilizationSample {
    pub workload: String,
    pub task_name: String,
    pub instance_id: String,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub memory_used_mb: f64,
    pub memory_limit_mb: f64,
    pub sampled_at: DateTime<Utc>,
}

/// Per-workload aggregate for one evaluation cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedMetric {
    pub workload: String,
    pub cpu_percent: f64,
    /// `None` when the memory query failed or had no row for this workload
    pub memory_percent: Option<f64>,
}

/// Scaling policy read from a workload's declarative spec
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingPolicy {
    pub workload: String,
    pub enabled: bool,
    /// Minimum replicas; 0 means unconstrained
    pub min_replicas: u64,
    /// Maximum replicas; 0 means unconstrained
    pub max_replicas: u64,
    pub current_replicas: u64,
}

/// Convert a byte count to megabytes
pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}

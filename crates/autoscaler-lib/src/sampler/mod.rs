//! Resource sampling for running task instances
//!
//! Converts successive raw counter snapshots into CPU and memory
//! utilization percentages. The sampler keeps exactly one previous
//! snapshot per instance so each cycle computes a fresh delta, and drops
//! snapshots for instances that are no longer running.

mod r#loop;

#[cfg(test)]
mod tests;

pub use r#loop::SamplingLoop;

use crate::error::Result;
use crate::models::{
    bytes_to_mb, CpuCounters, RawResourceStats, ResourceSnapshot, TaskInstance, UtilizationSample,
};
use crate::runtime::WorkloadRuntime;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// CPU utilization from counter deltas
///
/// Returns 0 unless both deltas are strictly positive.
pub fn cpu_percent_from_deltas(cpu_delta: f64, system_delta: f64, num_cores: u32) -> f64 {
    if system_delta > 0.0 && cpu_delta > 0.0 {
        (cpu_delta / system_delta) * num_cores as f64 * 100.0
    } else {
        0.0
    }
}

/// CPU utilization between two counter pairs
pub fn cpu_percent(current: &CpuCounters, previous: &CpuCounters, num_cores: u32) -> f64 {
    let cpu_delta = current.cpu_time_used as f64 - previous.cpu_time_used as f64;
    let system_delta = current.cpu_time_total as f64 - previous.cpu_time_total as f64;
    cpu_percent_from_deltas(cpu_delta, system_delta, num_cores)
}

/// Previous counter snapshots keyed by instance id
#[derive(Debug, Default)]
pub struct SnapshotStore {
    snapshots: DashMap<String, ResourceSnapshot>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, instance_id: &str) -> Option<ResourceSnapshot> {
        self.snapshots.get(instance_id).map(|r| r.clone())
    }

    /// Replace the stored snapshot for an instance
    pub fn insert(&self, instance_id: impl Into<String>, snapshot: ResourceSnapshot) {
        self.snapshots.insert(instance_id.into(), snapshot);
    }

    /// Drop every snapshot whose instance is not in `running`
    ///
    /// Returns the number of evicted entries.
    pub fn retain_running(&self, running: &HashSet<String>) -> usize {
        let before = self.snapshots.len();
        self.snapshots.retain(|id, _| running.contains(id));
        before - self.snapshots.len()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

/// The current per-instance sample set shared with the publisher
///
/// Writers build a complete map unlocked and swap it in; readers hold the
/// read lock only while copying.
#[derive(Debug, Clone, Default)]
pub struct SampleSet {
    samples: Arc<RwLock<HashMap<String, UtilizationSample>>>,
}

impl SampleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically replace the whole sample set
    pub async fn install(&self, samples: HashMap<String, UtilizationSample>) {
        *self.samples.write().await = samples;
    }

    /// Current samples ordered by workload, task and instance
    pub async fn snapshot(&self) -> Vec<UtilizationSample> {
        let mut samples: Vec<UtilizationSample> =
            self.samples.read().await.values().cloned().collect();
        samples.sort_by(|a, b| {
            (&a.workload, &a.task_name, &a.instance_id).cmp(&(
                &b.workload,
                &b.task_name,
                &b.instance_id,
            ))
        });
        samples
    }

    pub async fn len(&self) -> usize {
        self.samples.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.samples.read().await.is_empty()
    }
}

/// Outcome counts for one sampling cycle
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SamplingResults {
    pub sampled: usize,
    pub failed: usize,
    /// Instances without a workload association
    pub skipped: usize,
    pub evicted: usize,
}

/// Produces one utilization sample per running task instance
pub struct ResourceSampler {
    runtime: Arc<dyn WorkloadRuntime>,
    snapshots: Arc<SnapshotStore>,
    samples: SampleSet,
}

impl ResourceSampler {
    pub fn new(
        runtime: Arc<dyn WorkloadRuntime>,
        snapshots: Arc<SnapshotStore>,
        samples: SampleSet,
    ) -> Self {
        Self {
            runtime,
            snapshots,
            samples,
        }
    }

    pub fn snapshots(&self) -> &Arc<SnapshotStore> {
        &self.snapshots
    }

    pub fn samples(&self) -> &SampleSet {
        &self.samples
    }

    /// Sample every running instance and install the new sample set
    ///
    /// Only a failure to list running tasks fails the cycle; per-instance
    /// errors drop that instance's sample for this cycle.
    pub async fn sample_all(&self) -> Result<SamplingResults> {
        let tasks = self.runtime.list_running_tasks().await?;

        let mut results = SamplingResults::default();
        let mut next = HashMap::with_capacity(tasks.len());
        let mut running = HashSet::with_capacity(tasks.len());

        for task in &tasks {
            let Some(workload) = task.workload.as_deref() else {
                results.skipped += 1;
                continue;
            };
            running.insert(task.instance_id.clone());

            match self.sample_instance(task, workload).await {
                Ok(sample) => {
                    results.sampled += 1;
                    next.insert(task.instance_id.clone(), sample);
                }
                Err(e) => {
                    results.failed += 1;
                    warn!(
                        instance_id = %task.short_id(),
                        workload = %workload,
                        error = %e,
                        "Failed to sample task instance"
                    );
                }
            }
        }

        results.evicted = self.snapshots.retain_running(&running);
        if results.evicted > 0 {
            debug!(evicted = results.evicted, "Evicted snapshots of stopped instances");
        }

        self.samples.install(next).await;

        Ok(results)
    }

    /// Sample one instance and replace its stored snapshot
    async fn sample_instance(
        &self,
        task: &TaskInstance,
        workload: &str,
    ) -> Result<UtilizationSample> {
        let stats = self
            .runtime
            .sample_resource_usage(&task.instance_id)
            .await?;
        let now = Utc::now();

        let previous = self.snapshots.get(&task.instance_id);
        let cpu_percent = Self::compute_cpu(&stats, previous.as_ref());

        self.snapshots
            .insert(task.instance_id.clone(), ResourceSnapshot::from_stats(&stats, now));

        Ok(UtilizationSample {
            workload: workload.to_string(),
            task_name: task.task_name.clone().unwrap_or_default(),
            instance_id: task.short_id().to_string(),
            cpu_percent,
            memory_percent: memory_percent(stats.memory_used_bytes, stats.memory_limit_bytes),
            memory_used_mb: bytes_to_mb(stats.memory_used_bytes),
            memory_limit_mb: bytes_to_mb(stats.memory_limit_bytes),
            sampled_at: now,
        })
    }

    /// Use our own previous snapshot when we have one, otherwise the
    /// baseline pair the runtime reported with this call
    fn compute_cpu(stats: &RawResourceStats, previous: Option<&ResourceSnapshot>) -> f64 {
        let baseline = previous.map(|s| s.cpu).or(stats.previous);

        match baseline {
            Some(base) => cpu_percent(&stats.current, &base, stats.num_cores()),
            None => 0.0,
        }
    }
}

fn memory_percent(used: u64, limit: u64) -> f64 {
    if limit == 0 {
        0.0
    } else {
        used as f64 / limit as f64 * 100.0
    }
}

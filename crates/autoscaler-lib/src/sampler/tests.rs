//! Sampler tests against a scripted workload runtime
//!
//! The runtime serves queued counter readings per instance so successive
//! cycles can be checked delta by delta.

use super::*;
use crate::error::{Result, ScalerError};
use crate::models::{CpuCounters, RawResourceStats, ScalingPolicy, TaskInstance};
use crate::runtime::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Default)]
struct ScriptedRuntime {
    tasks: Mutex<Vec<TaskInstance>>,
    readings: Mutex<HashMap<String, VecDeque<RawResourceStats>>>,
    failing: Mutex<HashSet<String>>,
    fail_listing: Mutex<bool>,
    sample_calls: Mutex<Vec<String>>,
}

impl ScriptedRuntime {
    fn set_tasks(&self, tasks: Vec<TaskInstance>) {
        *self.tasks.lock().unwrap() = tasks;
    }

    fn push_reading(&self, instance_id: &str, stats: RawResourceStats) {
        self.readings
            .lock()
            .unwrap()
            .entry(instance_id.to_string())
            .or_default()
            .push_back(stats);
    }

    fn fail_instance(&self, instance_id: &str) {
        self.failing.lock().unwrap().insert(instance_id.to_string());
    }
}

#[async_trait]
impl WorkloadRuntime for ScriptedRuntime {
    async fn list_running_tasks(&self) -> Result<Vec<TaskInstance>> {
        if *self.fail_listing.lock().unwrap() {
            return Err(ScalerError::runtime("list_containers", "running", "engine down"));
        }
        Ok(self.tasks.lock().unwrap().clone())
    }

    async fn sample_resource_usage(&self, instance_id: &str) -> Result<RawResourceStats> {
        self.sample_calls
            .lock()
            .unwrap()
            .push(instance_id.to_string());

        if self.failing.lock().unwrap().contains(instance_id) {
            return Err(ScalerError::runtime(
                "container_stats",
                instance_id,
                "no such container",
            ));
        }

        self.readings
            .lock()
            .unwrap()
            .get_mut(instance_id)
            .and_then(|q| q.pop_front())
            .ok_or_else(|| ScalerError::runtime("container_stats", instance_id, "no reading"))
    }

    async fn get_workload_spec(&self, workload: &str) -> Result<ScalingPolicy> {
        Err(ScalerError::runtime("inspect_service", workload, "unused"))
    }

    async fn set_replica_count(&self, workload: &str, _replicas: u64) -> Result<()> {
        Err(ScalerError::runtime("update_service", workload, "unused"))
    }
}

fn task(id: &str, workload: Option<&str>) -> TaskInstance {
    TaskInstance {
        instance_id: id.to_string(),
        workload: workload.map(str::to_string),
        task_name: workload.map(|w| format!("{w}.1")),
    }
}

fn reading(used: u64, total: u64, cores: u32) -> RawResourceStats {
    RawResourceStats {
        current: CpuCounters {
            cpu_time_used: used,
            cpu_time_total: total,
        },
        previous: None,
        per_core_count: cores,
        online_cpus: 0,
        memory_used_bytes: 256 * 1024 * 1024,
        memory_limit_bytes: 1024 * 1024 * 1024,
    }
}

fn sampler_for(runtime: &Arc<ScriptedRuntime>) -> ResourceSampler {
    ResourceSampler::new(
        runtime.clone(),
        Arc::new(SnapshotStore::new()),
        SampleSet::new(),
    )
}

const INSTANCE_A: &str = "aaaaaaaaaaaaaaaaaaaa";
const INSTANCE_B: &str = "bbbbbbbbbbbbbbbbbbbb";

#[test]
fn test_cpu_percent_formula() {
    let cases = [
        (50.0, 100.0, 1, 50.0),
        (50.0, 100.0, 4, 200.0),
        (1.0, 1000.0, 2, 0.2),
        (300.0, 200.0, 1, 150.0),
    ];
    for (cpu_delta, system_delta, cores, expected) in cases {
        let got = cpu_percent_from_deltas(cpu_delta, system_delta, cores);
        assert!(
            (got - expected).abs() < 1e-9,
            "({cpu_delta}, {system_delta}, {cores}) => {got}, expected {expected}"
        );
    }
}

#[test]
fn test_cpu_percent_zero_for_non_positive_deltas() {
    for (cpu_delta, system_delta) in [
        (0.0, 100.0),
        (-5.0, 100.0),
        (50.0, 0.0),
        (50.0, -10.0),
        (0.0, 0.0),
    ] {
        for cores in [1, 2, 64] {
            assert_eq!(cpu_percent_from_deltas(cpu_delta, system_delta, cores), 0.0);
        }
    }
}

#[test]
fn test_cpu_percent_handles_counter_reset() {
    let previous = CpuCounters {
        cpu_time_used: 1_000,
        cpu_time_total: 10_000,
    };
    let current = CpuCounters {
        cpu_time_used: 10,
        cpu_time_total: 20_000,
    };
    assert_eq!(cpu_percent(&current, &previous, 4), 0.0);
}

#[tokio::test]
async fn test_cold_instance_uses_runtime_baseline() {
    let runtime = Arc::new(ScriptedRuntime::default());
    runtime.set_tasks(vec![task(INSTANCE_A, Some("web"))]);
    let mut first = reading(300, 2_000, 2);
    first.previous = Some(CpuCounters {
        cpu_time_used: 100,
        cpu_time_total: 1_000,
    });
    runtime.push_reading(INSTANCE_A, first);

    let sampler = sampler_for(&runtime);
    let results = sampler.sample_all().await.unwrap();
    assert_eq!(results.sampled, 1);

    let samples = sampler.samples().snapshot().await;
    // (200 / 1000) * 2 cores * 100
    assert!((samples[0].cpu_percent - 40.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_cold_instance_without_baseline_reports_zero() {
    let runtime = Arc::new(ScriptedRuntime::default());
    runtime.set_tasks(vec![task(INSTANCE_A, Some("web"))]);
    runtime.push_reading(INSTANCE_A, reading(300, 2_000, 2));

    let sampler = sampler_for(&runtime);
    sampler.sample_all().await.unwrap();

    let samples = sampler.samples().snapshot().await;
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].cpu_percent, 0.0);
}

#[tokio::test]
async fn test_second_cycle_uses_stored_snapshot() {
    let runtime = Arc::new(ScriptedRuntime::default());
    runtime.set_tasks(vec![task(INSTANCE_A, Some("web"))]);
    runtime.push_reading(INSTANCE_A, reading(1_000, 10_000, 1));

    let mut second = reading(1_500, 11_000, 1);
    // A stale runtime baseline must not win over our own snapshot
    second.previous = Some(CpuCounters {
        cpu_time_used: 0,
        cpu_time_total: 1,
    });
    runtime.push_reading(INSTANCE_A, second);

    let sampler = sampler_for(&runtime);
    sampler.sample_all().await.unwrap();
    sampler.sample_all().await.unwrap();

    let samples = sampler.samples().snapshot().await;
    // (500 / 1000) * 1 * 100
    assert!((samples[0].cpu_percent - 50.0).abs() < 1e-9);

    let stored = sampler.snapshots().get(INSTANCE_A).unwrap();
    assert_eq!(stored.cpu.cpu_time_used, 1_500);
    assert_eq!(sampler.snapshots().len(), 1);
}

#[tokio::test]
async fn test_memory_conversion() {
    let runtime = Arc::new(ScriptedRuntime::default());
    runtime.set_tasks(vec![task(INSTANCE_A, Some("web"))]);
    runtime.push_reading(INSTANCE_A, reading(0, 0, 1));

    let sampler = sampler_for(&runtime);
    sampler.sample_all().await.unwrap();

    let sample = &sampler.samples().snapshot().await[0];
    assert_eq!(sample.memory_used_mb, 256.0);
    assert_eq!(sample.memory_limit_mb, 1024.0);
    assert_eq!(sample.memory_percent, 25.0);
    assert_eq!(sample.workload, "web");
    assert_eq!(sample.task_name, "web.1");
    assert_eq!(sample.instance_id, "aaaaaaaaaaaa");
}

#[tokio::test]
async fn test_failed_instance_does_not_abort_cycle() {
    let runtime = Arc::new(ScriptedRuntime::default());
    runtime.set_tasks(vec![
        task(INSTANCE_A, Some("web")),
        task(INSTANCE_B, Some("api")),
    ]);
    runtime.fail_instance(INSTANCE_A);
    runtime.push_reading(INSTANCE_B, reading(10, 100, 1));

    let sampler = sampler_for(&runtime);
    let results = sampler.sample_all().await.unwrap();

    assert_eq!(results.sampled, 1);
    assert_eq!(results.failed, 1);

    let samples = sampler.samples().snapshot().await;
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].workload, "api");
}

#[tokio::test]
async fn test_instances_without_workload_are_skipped() {
    let runtime = Arc::new(ScriptedRuntime::default());
    runtime.set_tasks(vec![task(INSTANCE_A, None), task(INSTANCE_B, Some("api"))]);
    runtime.push_reading(INSTANCE_B, reading(10, 100, 1));

    let sampler = sampler_for(&runtime);
    let results = sampler.sample_all().await.unwrap();

    assert_eq!(results.skipped, 1);
    assert_eq!(results.sampled, 1);
    assert_eq!(
        *runtime.sample_calls.lock().unwrap(),
        vec![INSTANCE_B.to_string()]
    );
    assert!(sampler.snapshots().get(INSTANCE_A).is_none());
}

#[tokio::test]
async fn test_stopped_instances_are_evicted() {
    let runtime = Arc::new(ScriptedRuntime::default());
    runtime.set_tasks(vec![
        task(INSTANCE_A, Some("web")),
        task(INSTANCE_B, Some("web")),
    ]);
    runtime.push_reading(INSTANCE_A, reading(10, 100, 1));
    runtime.push_reading(INSTANCE_B, reading(10, 100, 1));

    let sampler = sampler_for(&runtime);
    sampler.sample_all().await.unwrap();
    assert_eq!(sampler.snapshots().len(), 2);

    // B restarts under a new id
    let restarted = "cccccccccccccccccccc";
    runtime.set_tasks(vec![
        task(INSTANCE_A, Some("web")),
        task(restarted, Some("web")),
    ]);
    runtime.push_reading(INSTANCE_A, reading(20, 200, 1));
    runtime.push_reading(restarted, reading(5_000, 50_000, 1));

    let results = sampler.sample_all().await.unwrap();
    assert_eq!(results.evicted, 1);
    assert!(sampler.snapshots().get(INSTANCE_B).is_none());
    assert!(sampler.snapshots().get(restarted).is_some());

    let samples = sampler.samples().snapshot().await;
    let ids: Vec<&str> = samples.iter().map(|s| s.instance_id.as_str()).collect();
    assert_eq!(ids, vec!["aaaaaaaaaaaa", "cccccccccccc"]);

    // The restarted instance has no history, so no cross-reporting
    let fresh = samples
        .iter()
        .find(|s| s.instance_id == "cccccccccccc")
        .unwrap();
    assert_eq!(fresh.cpu_percent, 0.0);
}

#[tokio::test]
async fn test_failed_instance_keeps_snapshot_while_running() {
    let runtime = Arc::new(ScriptedRuntime::default());
    runtime.set_tasks(vec![task(INSTANCE_A, Some("web"))]);
    runtime.push_reading(INSTANCE_A, reading(10, 100, 1));

    let sampler = sampler_for(&runtime);
    sampler.sample_all().await.unwrap();

    runtime.fail_instance(INSTANCE_A);
    let results = sampler.sample_all().await.unwrap();

    assert_eq!(results.failed, 1);
    assert_eq!(results.evicted, 0);
    assert!(sampler.snapshots().get(INSTANCE_A).is_some());
    assert!(sampler.samples().is_empty().await);
}

#[tokio::test]
async fn test_listing_failure_keeps_previous_samples() {
    let runtime = Arc::new(ScriptedRuntime::default());
    runtime.set_tasks(vec![task(INSTANCE_A, Some("web"))]);
    runtime.push_reading(INSTANCE_A, reading(10, 100, 1));

    let sampler = sampler_for(&runtime);
    sampler.sample_all().await.unwrap();

    *runtime.fail_listing.lock().unwrap() = true;
    assert!(sampler.sample_all().await.is_err());
    assert_eq!(sampler.samples().len().await, 1);
}

#[tokio::test]
async fn test_snapshot_store_can_be_seeded() {
    let runtime = Arc::new(ScriptedRuntime::default());
    runtime.set_tasks(vec![task(INSTANCE_A, Some("web"))]);
    runtime.push_reading(INSTANCE_A, reading(400, 2_000, 4));

    let store = Arc::new(SnapshotStore::new());
    store.insert(
        INSTANCE_A,
        ResourceSnapshot {
            cpu: CpuCounters {
                cpu_time_used: 200,
                cpu_time_total: 1_000,
            },
            memory_used_bytes: 0,
            memory_limit_bytes: 0,
            captured_at: Utc::now(),
        },
    );

    let sampler = ResourceSampler::new(runtime.clone(), store, SampleSet::new());
    sampler.sample_all().await.unwrap();

    // (200 / 1000) * 4 * 100
    let samples = sampler.samples().snapshot().await;
    assert!((samples[0].cpu_percent - 80.0).abs() < 1e-9);
}

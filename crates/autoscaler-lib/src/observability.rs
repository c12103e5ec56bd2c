//! Observability infrastructure for the autoscaler
//!
//! Provides:
//! - Prometheus self-metrics (cycles, scale actions, sampling latency)
//! - Structured JSON log events for scaling history

use crate::engine::CycleReport;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for sampling cycle latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ScalerMetricsInner> = OnceLock::new();

struct ScalerMetricsInner {
    evaluation_cycles: IntCounter,
    evaluation_failures: IntCounter,
    scale_actions: IntCounterVec,
    workload_errors: IntCounter,
    sampling_latency_seconds: Histogram,
    instances_sampled: IntGauge,
    snapshots_tracked: IntGauge,
    sampling_errors: IntCounter,
}

impl ScalerMetricsInner {
    fn new() -> Self {
        Self {
            evaluation_cycles: register_int_counter!(
                "autoscaler_evaluation_cycles_total",
                "Evaluation cycles started"
            )
            .expect("Failed to register evaluation_cycles"),

            evaluation_failures: register_int_counter!(
                "autoscaler_evaluation_failures_total",
                "Evaluation cycles skipped because the CPU aggregation failed"
            )
            .expect("Failed to register evaluation_failures"),

            scale_actions: register_int_counter_vec!(
                "autoscaler_scale_actions_total",
                "Replica count changes issued, by direction",
                &["direction"]
            )
            .expect("Failed to register scale_actions"),

            workload_errors: register_int_counter!(
                "autoscaler_workload_errors_total",
                "Workloads skipped in a cycle because of a runtime error"
            )
            .expect("Failed to register workload_errors"),

            sampling_latency_seconds: register_histogram!(
                "autoscaler_sampling_latency_seconds",
                "Time spent sampling all running task instances",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register sampling_latency_seconds"),

            instances_sampled: register_int_gauge!(
                "autoscaler_instances_sampled",
                "Task instances in the current sample set"
            )
            .expect("Failed to register instances_sampled"),

            snapshots_tracked: register_int_gauge!(
                "autoscaler_snapshots_tracked",
                "Previous counter snapshots retained by the sampler"
            )
            .expect("Failed to register snapshots_tracked"),

            sampling_errors: register_int_counter!(
                "autoscaler_sampling_errors_total",
                "Task instances that could not be sampled"
            )
            .expect("Failed to register sampling_errors"),
        }
    }
}

/// Handle to the process-wide autoscaler metrics
///
/// Clones share the same underlying registered collectors.
#[derive(Clone)]
pub struct ScalerMetrics {
    _private: (),
}

impl Default for ScalerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ScalerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ScalerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ScalerMetricsInner {
        GLOBAL_METRICS.get_or_init(ScalerMetricsInner::new)
    }

    pub fn inc_evaluation_cycles(&self) {
        self.inner().evaluation_cycles.inc();
    }

    pub fn inc_evaluation_failures(&self) {
        self.inner().evaluation_failures.inc();
    }

    /// Fold a finished cycle into the counters
    pub fn record_cycle(&self, report: &CycleReport) {
        let inner = self.inner();
        inner
            .scale_actions
            .with_label_values(&["up"])
            .inc_by(report.scaled_up as u64);
        inner
            .scale_actions
            .with_label_values(&["down"])
            .inc_by(report.scaled_down as u64);
        inner
            .scale_actions
            .with_label_values(&["bound"])
            .inc_by(report.bounds_enforced as u64);
        inner.workload_errors.inc_by(report.errors as u64);
    }

    pub fn observe_sampling_latency(&self, duration_secs: f64) {
        self.inner().sampling_latency_seconds.observe(duration_secs);
    }

    pub fn set_instances_sampled(&self, count: usize, snapshots: usize) {
        self.inner().instances_sampled.set(count as i64);
        self.inner().snapshots_tracked.set(snapshots as i64);
    }

    pub fn inc_sampling_errors(&self, count: usize) {
        self.inner().sampling_errors.inc_by(count as u64);
    }

    /// Encode every registered self-metric in the text exposition format
    pub fn encode(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();

        if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
            warn!(error = %e, "Failed to encode self metrics");
            return String::new();
        }

        String::from_utf8(buffer).unwrap_or_default()
    }

    pub fn scale_actions(&self, direction: &str) -> u64 {
        self.inner()
            .scale_actions
            .with_label_values(&[direction])
            .get()
    }
}

/// Direction of a replica count change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDirection {
    Up,
    Down,
}

impl ScaleDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScaleDirection::Up => "up",
            ScaleDirection::Down => "down",
        }
    }
}

/// Structured logger for scaling events
///
/// Every line carries an `event` field so scaling history can be
/// reconstructed from the JSON log stream.
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    pub fn log_startup(&self, version: &str, store_url: &str) {
        info!(
            event = "autoscaler_started",
            node = %self.node_name,
            version = %version,
            metrics_store = %store_url,
            "Autoscaler started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "autoscaler_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Autoscaler shutting down"
        );
    }

    pub fn log_scale(
        &self,
        workload: &str,
        direction: ScaleDirection,
        from: u64,
        to: u64,
        reason: &str,
    ) {
        info!(
            event = "workload_scaled",
            node = %self.node_name,
            workload = %workload,
            direction = direction.as_str(),
            from_replicas = from,
            to_replicas = to,
            reason = %reason,
            "Scaling workload"
        );
    }

    pub fn log_bound_enforcement(&self, workload: &str, from: u64, to: u64) {
        info!(
            event = "bounds_enforced",
            node = %self.node_name,
            workload = %workload,
            from_replicas = from,
            to_replicas = to,
            "Workload outside replica bounds, correcting"
        );
    }

    pub fn log_cycle(&self, report: &CycleReport) {
        info!(
            event = "evaluation_cycle",
            node = %self.node_name,
            workloads = report.evaluated,
            scaled_up = report.scaled_up,
            scaled_down = report.scaled_down,
            bounds_enforced = report.bounds_enforced,
            errors = report.errors,
            "Evaluation cycle complete"
        );
    }
}

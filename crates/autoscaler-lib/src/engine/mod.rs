//! Scaling decisions per workload
//!
//! Each evaluation cycle fetches the per-workload aggregates, then for
//! every workload with CPU data reads its policy fresh from the runtime and
//! issues at most one replica count change. Bound corrections take
//! precedence over threshold-driven changes within a cycle.

mod decision;
mod r#loop;


pub use decision::{
    enforce_bounds, evaluate_thresholds, scale_down_target, scale_up_target, ThresholdSignal,
    Thresholds,
};
pub use r#loop::EvaluationLoop;

use crate::error::Result;
use crate::models::AggregatedMetric;
use crate::observability::{ScaleDirection, StructuredLogger};
use crate::query::AggregationQueries;
use crate::runtime::WorkloadRuntime;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What happened to one workload in a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkloadOutcome {
    /// Autoscaling is not enabled on the workload
    Disabled,
    BoundsEnforced { from: u64, to: u64 },
    ScaledUp { from: u64, to: u64 },
    ScaledDown { from: u64, to: u64 },
    /// Scale-up wanted but the workload is at its maximum
    AtMaximum,
    /// Scale-down wanted but the workload is at its minimum
    AtMinimum,
    /// Utilization inside the band
    Unchanged,
}

/// Counters for one evaluation cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub evaluated: usize,
    pub scaled_up: usize,
    pub scaled_down: usize,
    pub bounds_enforced: usize,
    /// Workloads skipped because a runtime call failed
    pub errors: usize,
}

impl CycleReport {
    fn record(&mut self, outcome: &WorkloadOutcome) {
        match outcome {
            WorkloadOutcome::ScaledUp { .. } => self.scaled_up += 1,
            WorkloadOutcome::ScaledDown { .. } => self.scaled_down += 1,
            WorkloadOutcome::BoundsEnforced { .. } => self.bounds_enforced += 1,
            _ => {}
        }
    }
}

/// Hysteresis-based decision engine
pub struct DecisionEngine {
    runtime: Arc<dyn WorkloadRuntime>,
    queries: AggregationQueries,
    thresholds: Thresholds,
    logger: StructuredLogger,
}

impl DecisionEngine {
    pub fn new(
        runtime: Arc<dyn WorkloadRuntime>,
        queries: AggregationQueries,
        thresholds: Thresholds,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            runtime,
            queries,
            thresholds,
            logger,
        }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Run one evaluation cycle
    ///
    /// Fails only when the CPU aggregation fails; workload-level errors are
    /// logged and counted in the report.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let metrics = self.queries.fetch().await?.into_metrics();
        info!(workloads = metrics.len(), "Retrieved workload CPU metrics");

        let mut report = CycleReport::default();
        for metric in &metrics {
            report.evaluated += 1;
            match self.evaluate_workload(metric).await {
                Ok(outcome) => report.record(&outcome),
                Err(e) => {
                    report.errors += 1;
                    warn!(workload = %metric.workload, error = %e, "Skipping workload this cycle");
                }
            }
        }

        Ok(report)
    }

    /// Decide and act for a single workload
    pub async fn evaluate_workload(&self, metric: &AggregatedMetric) -> Result<WorkloadOutcome> {
        let workload = metric.workload.as_str();
        info!(
            workload = %workload,
            avg_cpu = metric.cpu_percent,
            avg_memory = ?metric.memory_percent,
            "Evaluating workload"
        );

        let policy = self.runtime.get_workload_spec(workload).await?;
        if !policy.enabled {
            debug!(workload = %workload, "Autoscaling not enabled");
            return Ok(WorkloadOutcome::Disabled);
        }

        let signal = evaluate_thresholds(&self.thresholds, metric);

        if let Some(target) = enforce_bounds(&policy) {
            self.logger
                .log_bound_enforcement(workload, policy.current_replicas, target);
            self.runtime.set_replica_count(workload, target).await?;

            if signal != ThresholdSignal::Hold {
                debug!(
                    workload = %workload,
                    signal = ?signal,
                    "Threshold change deferred to next cycle after bound correction"
                );
            }
            return Ok(WorkloadOutcome::BoundsEnforced {
                from: policy.current_replicas,
                to: target,
            });
        }

        match signal {
            ThresholdSignal::ScaleUp { reason } => self.scale_up(workload, &reason).await,
            ThresholdSignal::ScaleDown { reason } => self.scale_down(workload, &reason).await,
            ThresholdSignal::Hold => Ok(WorkloadOutcome::Unchanged),
        }
    }

    async fn scale_up(&self, workload: &str, reason: &str) -> Result<WorkloadOutcome> {
        let policy = self.runtime.get_workload_spec(workload).await?;
        if !policy.enabled {
            return Ok(WorkloadOutcome::Disabled);
        }

        let Some(target) = scale_up_target(&policy) else {
            info!(
                workload = %workload,
                max_replicas = policy.max_replicas,
                "Workload already at its maximum replicas"
            );
            return Ok(WorkloadOutcome::AtMaximum);
        };

        self.logger.log_scale(
            workload,
            ScaleDirection::Up,
            policy.current_replicas,
            target,
            reason,
        );
        self.runtime.set_replica_count(workload, target).await?;

        Ok(WorkloadOutcome::ScaledUp {
            from: policy.current_replicas,
            to: target,
        })
    }

    async fn scale_down(&self, workload: &str, reason: &str) -> Result<WorkloadOutcome> {
        let policy = self.runtime.get_workload_spec(workload).await?;
        if !policy.enabled {
            return Ok(WorkloadOutcome::Disabled);
        }

        let Some(target) = scale_down_target(&policy) else {
            info!(
                workload = %workload,
                min_replicas = policy.min_replicas,
                "Workload already at its minimum replicas"
            );
            return Ok(WorkloadOutcome::AtMinimum);
        };

        self.logger.log_scale(
            workload,
            ScaleDirection::Down,
            policy.current_replicas,
            target,
            reason,
        );
        self.runtime.set_replica_count(workload, target).await?;

        Ok(WorkloadOutcome::ScaledDown {
            from: policy.current_replicas,
            to: target,
        })
    }
}

//! Periodic evaluation driver

use super::{CycleReport, DecisionEngine};
use crate::error::Result;
use crate::health::{components, HealthRegistry};
use crate::observability::{ScalerMetrics, StructuredLogger};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Runs evaluation cycles at a fixed interval, or exactly once
pub struct EvaluationLoop {
    engine: DecisionEngine,
    interval: Duration,
    continuous: bool,
    metrics: ScalerMetrics,
    health: HealthRegistry,
    logger: StructuredLogger,
}

impl EvaluationLoop {
    pub fn new(
        engine: DecisionEngine,
        interval: Duration,
        metrics: ScalerMetrics,
        health: HealthRegistry,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            engine,
            interval,
            continuous: true,
            metrics,
            health,
            logger,
        }
    }

    /// Run a single cycle and return instead of looping
    pub fn once(mut self) -> Self {
        self.continuous = false;
        self
    }

    pub async fn run(self, shutdown: CancellationToken) {
        if !self.continuous {
            info!("Loop disabled, running a single evaluation cycle");
            self.run_cycle(&shutdown).await;
            return;
        }

        info!(
            interval_secs = self.interval.as_secs(),
            "Starting evaluation loop"
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if self.run_cycle(&shutdown).await.is_none() {
                        break;
                    }
                }
            }
        }

        info!("Shutting down evaluation loop");
    }

    /// One cycle with cancellation, logging and bookkeeping
    ///
    /// Returns `None` when shutdown interrupted the cycle.
    async fn run_cycle(&self, shutdown: &CancellationToken) -> Option<Result<CycleReport>> {
        self.metrics.inc_evaluation_cycles();

        let outcome = tokio::select! {
            _ = shutdown.cancelled() => return None,
            outcome = self.engine.run_cycle() => outcome,
        };

        self.health
            .record_outcome(components::DECISION_ENGINE, &outcome)
            .await;

        match &outcome {
            Ok(report) => {
                self.metrics.record_cycle(report);
                self.logger.log_cycle(report);
            }
            Err(e) => {
                self.metrics.inc_evaluation_failures();
                error!(error = %e, "Evaluation cycle skipped, no scaling performed");
            }
        }

        Some(outcome)
    }
}

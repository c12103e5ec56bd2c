//! Periodic sampling driver
//!
//! Runs one sampling cycle per tick until the shutdown token fires. A cycle
//! in flight when shutdown begins is dropped rather than awaited.

use super::ResourceSampler;
use crate::health::{components, HealthRegistry};
use crate::observability::ScalerMetrics;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Drives the resource sampler at a fixed interval
pub struct SamplingLoop {
    sampler: ResourceSampler,
    interval: Duration,
    metrics: ScalerMetrics,
    health: HealthRegistry,
}

impl SamplingLoop {
    pub fn new(
        sampler: ResourceSampler,
        interval: Duration,
        metrics: ScalerMetrics,
        health: HealthRegistry,
    ) -> Self {
        Self {
            sampler,
            interval,
            metrics,
            health,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting resource sampling loop"
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let start = Instant::now();

                    let outcome = tokio::select! {
                        _ = shutdown.cancelled() => None,
                        outcome = self.sampler.sample_all() => Some(outcome),
                    };
                    let Some(outcome) = outcome else { break };

                    self.metrics
                        .observe_sampling_latency(start.elapsed().as_secs_f64());
                    self.health.record_outcome(components::SAMPLER, &outcome).await;

                    match outcome {
                        Ok(results) => {
                            self.metrics.inc_sampling_errors(results.failed);
                            self.metrics.set_instances_sampled(
                                results.sampled,
                                self.sampler.snapshots().len(),
                            );
                            debug!(
                                sampled = results.sampled,
                                failed = results.failed,
                                skipped = results.skipped,
                                evicted = results.evicted,
                                elapsed_ms = start.elapsed().as_millis(),
                                "Sampling cycle complete"
                            );
                        }
                        Err(e) => {
                            warn!(error = %e, "Sampling cycle failed, keeping previous samples");
                        }
                    }
                }
            }
        }

        info!("Shutting down resource sampling loop");
    }
}

//! Startup readiness polling with capped exponential backoff

use super::MetricsStore;
use crate::error::{Result, ScalerError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long and how often to poll the store before giving up
#[derive(Debug, Clone)]
pub struct ReadinessPolicy {
    /// Total attempts before the store is declared unavailable
    pub max_attempts: u32,
    /// Base unit for the backoff; attempt `n` waits `base * 2^n`
    pub base_delay: Duration,
    /// Upper bound for a single wait
    pub max_delay: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(32),
        }
    }
}

impl ReadinessPolicy {
    /// Wait after a failed attempt (1-based): 2, 4, 8, 16, 32, 32, ...
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Poll the store until it reports ready
///
/// Returns `StoreNotReady` once the attempt budget is spent, or
/// `Cancelled` if the shutdown token fires while waiting.
pub async fn wait_until_ready(
    store: &dyn MetricsStore,
    policy: &ReadinessPolicy,
    shutdown: &CancellationToken,
) -> Result<()> {
    info!(store = %store.describe(), "Waiting for metrics store to be ready");

    for attempt in 1..=policy.max_attempts {
        let outcome = tokio::select! {
            _ = shutdown.cancelled() => return Err(ScalerError::Cancelled),
            outcome = store.ready() => outcome,
        };

        match outcome {
            Ok(()) => {
                info!(attempt = attempt, "Metrics store is ready");
                return Ok(());
            }
            Err(e) if attempt < policy.max_attempts => {
                let wait = policy.backoff(attempt);
                warn!(
                    attempt = attempt,
                    max_attempts = policy.max_attempts,
                    retry_in_secs = wait.as_secs_f64(),
                    error = %e,
                    "Metrics store not ready"
                );

                tokio::select! {
                    _ = shutdown.cancelled() => return Err(ScalerError::Cancelled),
                    _ = tokio::time::sleep(wait) => {}
                }
            }
            Err(e) => {
                warn!(attempt = attempt, error = %e, "Metrics store not ready, giving up");
            }
        }
    }

    Err(ScalerError::StoreNotReady {
        url: store.describe(),
        attempts: policy.max_attempts,
    })
}

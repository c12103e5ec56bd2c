//! Pure scaling rules
//!
//! Everything here is a function of a policy, the aggregated metrics and
//! the configured thresholds, so the rules can be tested without a runtime.

use crate::models::{AggregatedMetric, ScalingPolicy};
use serde::{Deserialize, Serialize};

/// Utilization band limits, in percent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub cpu_upper: f64,
    pub cpu_lower: f64,
    pub memory_upper: f64,
    pub memory_lower: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu_upper: 75.0,
            cpu_lower: 20.0,
            memory_upper: 80.0,
            memory_lower: 20.0,
        }
    }
}

impl Thresholds {
    /// Replace any zero limit with its default
    pub fn with_defaults(self) -> Self {
        let defaults = Self::default();
        let pick = |value: f64, default: f64| if value == 0.0 { default } else { value };
        Self {
            cpu_upper: pick(self.cpu_upper, defaults.cpu_upper),
            cpu_lower: pick(self.cpu_lower, defaults.cpu_lower),
            memory_upper: pick(self.memory_upper, defaults.memory_upper),
            memory_lower: pick(self.memory_lower, defaults.memory_lower),
        }
    }

    /// Describe limits whose lower bound is not below the upper bound
    pub fn collapsed_bands(&self) -> Vec<&'static str> {
        let mut collapsed = Vec::new();
        if self.cpu_lower >= self.cpu_upper {
            collapsed.push("cpu");
        }
        if self.memory_lower >= self.memory_upper {
            collapsed.push("memory");
        }
        collapsed
    }
}

/// What the thresholds ask for this cycle
#[derive(Debug, Clone, PartialEq)]
pub enum ThresholdSignal {
    ScaleUp { reason: String },
    ScaleDown { reason: String },
    Hold,
}

/// Apply the hysteresis rules to one workload's aggregates
///
/// Either limit exceeded scales up. Both below their lower limit scales
/// down. Missing memory data reads as 0%.
pub fn evaluate_thresholds(thresholds: &Thresholds, metric: &AggregatedMetric) -> ThresholdSignal {
    let cpu = metric.cpu_percent;
    let memory = metric.memory_percent.unwrap_or(0.0);

    let mut reasons = Vec::new();
    if cpu > thresholds.cpu_upper {
        reasons.push(format!("CPU {:.2}% > {:.0}%", cpu, thresholds.cpu_upper));
    }
    if memory > thresholds.memory_upper {
        reasons.push(format!(
            "Memory {:.2}% > {:.0}%",
            memory, thresholds.memory_upper
        ));
    }
    if !reasons.is_empty() {
        return ThresholdSignal::ScaleUp {
            reason: reasons.join(" and "),
        };
    }

    if cpu < thresholds.cpu_lower && memory < thresholds.memory_lower {
        return ThresholdSignal::ScaleDown {
            reason: format!(
                "CPU {:.2}% < {:.0}% and Memory {:.2}% < {:.0}%",
                cpu, thresholds.cpu_lower, memory, thresholds.memory_lower
            ),
        };
    }

    ThresholdSignal::Hold
}

/// Replica count that brings the workload back inside its bounds
///
/// `None` when the current count already satisfies both bounds.
pub fn enforce_bounds(policy: &ScalingPolicy) -> Option<u64> {
    if policy.min_replicas > 0 && policy.current_replicas < policy.min_replicas {
        Some(policy.min_replicas)
    } else if policy.max_replicas > 0 && policy.current_replicas > policy.max_replicas {
        Some(policy.max_replicas)
    } else {
        None
    }
}

/// Next replica count when scaling up, or `None` when saturated
pub fn scale_up_target(policy: &ScalingPolicy) -> Option<u64> {
    let current = policy.current_replicas;
    let max = policy.max_replicas;

    if max > 0 && current >= max {
        return None;
    }

    let next = current.checked_add(1)?;
    if max > 0 && next > max {
        Some(max)
    } else {
        Some(next)
    }
}

/// Next replica count when scaling down, or `None` at the floor
///
/// A workload at zero replicas is never scaled down, even with an
/// unconstrained minimum.
pub fn scale_down_target(policy: &ScalingPolicy) -> Option<u64> {
    let current = policy.current_replicas;
    let min = policy.min_replicas;

    let next = current.checked_sub(1)?;
    if min > 0 && next < min {
        return None;
    }
    if current == min {
        return None;
    }
    Some(next)
}

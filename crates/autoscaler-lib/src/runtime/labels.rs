//! Scaling policy labels on workload specs
//!
//! Labels are free-form strings, so every value is parsed defensively:
//! anything unexpected falls back to "disabled" or "unconstrained".

use crate::models::ScalingPolicy;
use std::collections::HashMap;

/// Enables autoscaling when set to exactly `"true"`
pub const AUTOSCALE_LABEL: &str = "swarm.autoscaler";
/// Minimum replica count (integer string)
pub const MINIMUM_LABEL: &str = "swarm.autoscaler.minimum";
/// Maximum replica count (integer string)
pub const MAXIMUM_LABEL: &str = "swarm.autoscaler.maximum";

/// Container label naming the owning Swarm service
pub const SERVICE_NAME_LABEL: &str = "com.docker.swarm.service.name";
/// Container label naming the Swarm task
pub const TASK_NAME_LABEL: &str = "com.docker.swarm.task.name";

/// Build a scaling policy from workload labels and the current replica count
pub fn parse_policy(
    workload: &str,
    labels: &HashMap<String, String>,
    current_replicas: u64,
) -> ScalingPolicy {
    ScalingPolicy {
        workload: workload.to_string(),
        enabled: labels.get(AUTOSCALE_LABEL).map(String::as_str) == Some("true"),
        min_replicas: parse_bound(labels.get(MINIMUM_LABEL)),
        max_replicas: parse_bound(labels.get(MAXIMUM_LABEL)),
        current_replicas,
    }
}

fn parse_bound(value: Option<&String>) -> u64 {
    value.and_then(|v| v.parse::<u64>().ok()).unwrap_or(0)
}

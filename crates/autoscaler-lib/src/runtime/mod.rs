//! Workload runtime integration
//!
//! The autoscaler needs four things from the runtime: the running task
//! instances, raw resource counters per instance, the scaling policy of a
//! workload and a way to set its replica count. The Docker Engine API
//! (Swarm mode) is the production implementation.

mod docker;
mod labels;

pub use docker::DockerRuntime;
pub use labels::{
    parse_policy, AUTOSCALE_LABEL, MAXIMUM_LABEL, MINIMUM_LABEL, SERVICE_NAME_LABEL,
    TASK_NAME_LABEL,
};

use crate::error::Result;
use crate::models::{RawResourceStats, ScalingPolicy, TaskInstance};

pub use async_trait::async_trait;

/// Trait for the workload runtime collaborator
#[async_trait]
pub trait WorkloadRuntime: Send + Sync {
    /// List all task instances currently running
    async fn list_running_tasks(&self) -> Result<Vec<TaskInstance>>;

    /// Read raw resource counters for one task instance
    async fn sample_resource_usage(&self, instance_id: &str) -> Result<RawResourceStats>;

    /// Read the current scaling policy and replica count of a workload
    async fn get_workload_spec(&self, workload: &str) -> Result<ScalingPolicy>;

    /// Set the desired replica count of a workload
    async fn set_replica_count(&self, workload: &str, replicas: u64) -> Result<()>;
}

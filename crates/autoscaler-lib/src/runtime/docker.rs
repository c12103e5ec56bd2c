//! Docker Engine API client for Swarm services
//!
//! Talks to the engine over plain HTTP (a TCP `DOCKER_HOST` or a socket
//! proxy). Only the handful of endpoints the autoscaler needs are covered:
//! - `GET /containers/json` for running task instances
//! - `GET /containers/{id}/stats` for raw counters
//! - `GET /services/{name}` for labels and replica count
//! - `POST /services/{id}/update` to change the replica count

use super::labels::{parse_policy, SERVICE_NAME_LABEL, TASK_NAME_LABEL};
use super::WorkloadRuntime;
use crate::error::{Result, ScalerError};
use crate::models::{CpuCounters, RawResourceStats, ScalingPolicy, TaskInstance};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Workload runtime backed by the Docker Engine HTTP API
pub struct DockerRuntime {
    client: Client,
    base_url: Url,
}

impl DockerRuntime {
    /// Create a client for the given engine endpoint
    ///
    /// `tcp://` endpoints (the usual `DOCKER_HOST` form) are rewritten to
    /// `http://`.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ScalerError::Client)?;

        let base_url = Self::normalize_endpoint(endpoint)?;

        Ok(Self { client, base_url })
    }

    /// Engine base URL after normalisation
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn normalize_endpoint(endpoint: &str) -> Result<Url> {
        let mut raw = match endpoint.strip_prefix("tcp://") {
            Some(rest) => format!("http://{}", rest),
            None => endpoint.to_string(),
        };
        if !raw.ends_with('/') {
            raw.push('/');
        }

        Url::parse(&raw).map_err(|source| ScalerError::InvalidEndpoint {
            url: endpoint.to_string(),
            source,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|source| ScalerError::InvalidEndpoint {
                url: format!("{}{}", self.base_url, path),
                source,
            })
    }

    /// Fail with the response body when the engine returned a non-2xx status
    async fn check_status(
        response: Response,
        operation: &'static str,
        target: &str,
    ) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(ScalerError::runtime(
            operation,
            target,
            format!("engine returned {}: {}", status, body.trim()),
        ))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        target: &str,
        url: Url,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| ScalerError::runtime(operation, target, e))?;

        let response = Self::check_status(response, operation, target).await?;

        response
            .json()
            .await
            .map_err(|e| ScalerError::runtime(operation, target, e))
    }

    async fn inspect_service(&self, workload: &str) -> Result<ServiceInspect> {
        let url = self.endpoint(&format!("services/{}", workload))?;
        self.get_json("inspect_service", workload, url, &[]).await
    }
}

#[async_trait]
impl WorkloadRuntime for DockerRuntime {
    async fn list_running_tasks(&self) -> Result<Vec<TaskInstance>> {
        let url = self.endpoint("containers/json")?;
        let containers: Vec<ContainerSummary> = self
            .get_json(
                "list_containers",
                "running",
                url,
                &[("filters", r#"{"status":["running"]}"#)],
            )
            .await?;

        Ok(containers.into_iter().map(ContainerSummary::into_task).collect())
    }

    async fn sample_resource_usage(&self, instance_id: &str) -> Result<RawResourceStats> {
        let url = self.endpoint(&format!("containers/{}/stats", instance_id))?;
        let stats: StatsResponse = self
            .get_json("container_stats", instance_id, url, &[("stream", "false")])
            .await?;

        Ok(stats.into_raw())
    }

    async fn get_workload_spec(&self, workload: &str) -> Result<ScalingPolicy> {
        let service = self.inspect_service(workload).await?;
        Ok(service.policy(workload))
    }

    async fn set_replica_count(&self, workload: &str, replicas: u64) -> Result<()> {
        let mut service = self.inspect_service(workload).await?;

        let replicated = service
            .spec
            .get_mut("Mode")
            .and_then(|mode| mode.get_mut("Replicated"))
            .and_then(|r| r.as_object_mut())
            .ok_or_else(|| ScalerError::NotReplicated(workload.to_string()))?;
        replicated.insert("Replicas".to_string(), serde_json::Value::from(replicas));

        let url = self.endpoint(&format!("services/{}/update", service.id))?;
        let version = service.version.index.to_string();

        debug!(workload = %workload, replicas = replicas, version = %version, "Updating service");

        let response = self
            .client
            .post(url)
            .query(&[("version", version.as_str())])
            .json(&service.spec)
            .send()
            .await
            .map_err(|e| ScalerError::runtime("update_service", workload, e))?;

        Self::check_status(response, "update_service", workload).await?;
        Ok(())
    }
}

// Engine response types

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerSummary {
    id: String,
    #[serde(default)]
    labels: HashMap<String, String>,
}

impl ContainerSummary {
    fn into_task(mut self) -> TaskInstance {
        TaskInstance {
            instance_id: self.id,
            workload: self.labels.remove(SERVICE_NAME_LABEL).filter(|s| !s.is_empty()),
            task_name: self.labels.remove(TASK_NAME_LABEL),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct StatsResponse {
    #[serde(default)]
    cpu_stats: CpuStats,
    #[serde(default)]
    precpu_stats: CpuStats,
    #[serde(default)]
    memory_stats: MemoryStats,
}

#[derive(Debug, Default, Deserialize)]
struct CpuStats {
    #[serde(default)]
    cpu_usage: CpuUsage,
    #[serde(default)]
    system_cpu_usage: Option<u64>,
    #[serde(default)]
    online_cpus: Option<u32>,
}

impl CpuStats {
    fn counters(&self) -> Option<CpuCounters> {
        self.system_cpu_usage.map(|total| CpuCounters {
            cpu_time_used: self.cpu_usage.total_usage,
            cpu_time_total: total,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct CpuUsage {
    #[serde(default)]
    total_usage: u64,
    #[serde(default)]
    percpu_usage: Option<Vec<u64>>,
}

#[derive(Debug, Default, Deserialize)]
struct MemoryStats {
    #[serde(default)]
    usage: u64,
    #[serde(default)]
    limit: u64,
}

impl StatsResponse {
    fn into_raw(self) -> RawResourceStats {
        RawResourceStats {
            current: self.cpu_stats.counters().unwrap_or(CpuCounters {
                cpu_time_used: self.cpu_stats.cpu_usage.total_usage,
                cpu_time_total: 0,
            }),
            previous: self.precpu_stats.counters(),
            per_core_count: self
                .cpu_stats
                .cpu_usage
                .percpu_usage
                .as_ref()
                .map(|v| v.len() as u32)
                .unwrap_or(0),
            online_cpus: self.cpu_stats.online_cpus.unwrap_or(0),
            memory_used_bytes: self.memory_stats.usage,
            memory_limit_bytes: self.memory_stats.limit,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ServiceInspect {
    #[serde(rename = "ID")]
    id: String,
    version: ServiceVersion,
    spec: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ServiceVersion {
    index: u64,
}

impl ServiceInspect {
    fn policy(&self, workload: &str) -> ScalingPolicy {
        let labels: HashMap<String, String> = self
            .spec
            .get("Labels")
            .and_then(|l| l.as_object())
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        let current_replicas = self
            .spec
            .pointer("/Mode/Replicated/Replicas")
            .and_then(|r| r.as_u64())
            .unwrap_or(0);

        parse_policy(workload, &labels, current_replicas)
    }
}

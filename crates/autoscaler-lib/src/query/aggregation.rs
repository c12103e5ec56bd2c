//! Per-workload CPU and memory aggregation

use super::parse::QueryRow;
use super::MetricsStore;
use crate::error::Result;
use crate::exporter::WORKLOAD_LABEL;
use crate::models::AggregatedMetric;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::warn;

/// Mean CPU percent grouped by workload
pub const CPU_QUERY: &str = "avg(container_cpu_usage_percent) BY (service)";

/// Mean memory used over mean memory limit, as a percentage, by workload
pub const MEMORY_QUERY: &str =
    "(avg(container_memory_usage_mb) BY (service) / avg(container_memory_limit_mb) BY (service)) * 100";

/// Raw aggregation results for one evaluation cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkloadAggregates {
    /// CPU rows in store order; a workload may appear more than once
    pub cpu: Vec<(String, f64)>,
    pub memory: HashMap<String, f64>,
}

impl WorkloadAggregates {
    /// Average CPU rows per workload and attach the memory figure
    ///
    /// Only workloads with at least one CPU row are returned, in name order.
    pub fn into_metrics(self) -> Vec<AggregatedMetric> {
        let mut grouped: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for (workload, cpu) in self.cpu {
            grouped.entry(workload).or_default().push(cpu);
        }

        grouped
            .into_iter()
            .map(|(workload, values)| {
                let cpu_percent = values.iter().sum::<f64>() / values.len() as f64;
                let memory_percent = self.memory.get(&workload).copied();
                AggregatedMetric {
                    workload,
                    cpu_percent,
                    memory_percent,
                }
            })
            .collect()
    }
}

/// Keep rows that carry a workload label
fn rows_by_workload(rows: Vec<QueryRow>) -> Vec<(String, f64)> {
    rows.into_iter()
        .filter_map(|mut row| row.labels.remove(WORKLOAD_LABEL).map(|w| (w, row.value)))
        .collect()
}

/// Issues both aggregation queries against a metrics store
#[derive(Clone)]
pub struct AggregationQueries {
    store: Arc<dyn MetricsStore>,
}

impl AggregationQueries {
    pub fn new(store: Arc<dyn MetricsStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn MetricsStore> {
        &self.store
    }

    /// Run the CPU and memory queries concurrently
    ///
    /// A CPU failure fails the call. A memory failure is logged and
    /// replaced by an empty memory map.
    pub async fn fetch(&self) -> Result<WorkloadAggregates> {
        let (cpu, memory) = tokio::join!(
            self.store.query(CPU_QUERY),
            self.store.query(MEMORY_QUERY)
        );

        let cpu = rows_by_workload(cpu?);

        let memory = match memory {
            Ok(rows) => rows_by_workload(rows).into_iter().collect(),
            Err(e) => {
                warn!(error = %e, "Memory aggregation failed, continuing with CPU only");
                HashMap::new()
            }
        };

        Ok(WorkloadAggregates { cpu, memory })
    }
}

//! Metrics store queries
//!
//! The decision engine only needs two aggregations from the store: mean
//! CPU percent per workload and mean memory percent per workload. This
//! module issues them, parses the tabular result and waits for the store
//! to become ready at startup.

mod aggregation;
mod parse;
mod prometheus;
mod readiness;

pub use aggregation::{AggregationQueries, WorkloadAggregates, CPU_QUERY, MEMORY_QUERY};
pub use parse::{parse_exposition, parse_query_response, QueryRow, NAME_LABEL};
pub use prometheus::PrometheusClient;
pub use readiness::{wait_until_ready, ReadinessPolicy};

use crate::error::Result;
use async_trait::async_trait;

/// Trait for the metrics store collaborator
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Run an instant aggregation query
    async fn query(&self, expr: &str) -> Result<Vec<QueryRow>>;

    /// Succeeds when the store's readiness endpoint answers 2xx
    async fn ready(&self) -> Result<()>;

    /// Human-readable location used in logs and errors
    fn describe(&self) -> String;
}

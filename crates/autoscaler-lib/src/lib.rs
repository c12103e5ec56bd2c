//! Autoscaling library for Docker Swarm services
//!
//! This crate provides the core functionality for:
//! - Sampling per-task CPU and memory utilization from the container runtime
//! - Publishing those samples in the text exposition format
//! - Querying per-service aggregates back from the metrics store
//! - Hysteresis-based scaling decisions with replica bound enforcement
//! - Health checks and observability

pub mod engine;
pub mod error;
pub mod exporter;
pub mod health;
pub mod models;
pub mod observability;
pub mod query;
pub mod runtime;
pub mod sampler;

pub use error::{Result, ScalerError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ScalerMetrics, StructuredLogger};

//! Swarm Autoscaler - utilization-driven replica scaling for Swarm services
//!
//! This binary runs next to a Swarm manager, samples task utilization,
//! publishes it for the metrics store and scales labelled services based on
//! the aggregates the store returns.

use anyhow::{Context, Result};
use autoscaler_lib::{
    engine::{DecisionEngine, EvaluationLoop},
    exporter::MetricPublisher,
    health::{components, HealthRegistry},
    observability::{ScalerMetrics, StructuredLogger},
    query::{wait_until_ready, AggregationQueries, MetricsStore, PrometheusClient},
    runtime::DockerRuntime,
    sampler::{ResourceSampler, SampleSet, SamplingLoop, SnapshotStore},
};
use std::sync::Arc;
use swarm_autoscaler::{api, config::AutoscalerConfig};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AUTOSCALER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting swarm-autoscaler");

    let config = AutoscalerConfig::load()?;
    let thresholds = config.thresholds();
    info!(
        prometheus_url = %config.prometheus_url,
        docker_host = %config.docker_host,
        loop_enabled = config.loop_enabled(),
        metrics_enabled = config.metrics_enabled(),
        cpu_upper = thresholds.cpu_upper,
        cpu_lower = thresholds.cpu_lower,
        memory_upper = thresholds.memory_upper,
        memory_lower = thresholds.memory_lower,
        "Autoscaler configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::METRICS_STORE).await;
    health_registry.register(components::DECISION_ENGINE).await;

    let metrics = ScalerMetrics::new();
    let logger = StructuredLogger::new(&config.hostname);
    logger.log_startup(AUTOSCALER_VERSION, &config.prometheus_url);

    let runtime = Arc::new(
        DockerRuntime::new(&config.docker_host, config.request_timeout())
            .context("invalid Docker endpoint")?,
    );
    let store = Arc::new(
        PrometheusClient::new(&config.prometheus_url, config.request_timeout())
            .context("invalid metrics store URL")?,
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone(), logger.clone()));

    let mut handles = Vec::new();

    if config.metrics_enabled() {
        health_registry.register(components::SAMPLER).await;

        let samples = SampleSet::new();
        let sampler = ResourceSampler::new(
            runtime.clone(),
            Arc::new(SnapshotStore::new()),
            samples.clone(),
        );
        let sampling = SamplingLoop::new(
            sampler,
            config.sample_interval(),
            metrics.clone(),
            health_registry.clone(),
        );
        let sampling_task = tokio::spawn(sampling.run(shutdown.clone()));
        let sampler_health = health_registry.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = sampling_task.await {
                error!(error = %e, "Sampling loop terminated abnormally");
                sampler_health
                    .set_unhealthy(components::SAMPLER, e.to_string())
                    .await;
            }
        }));

        let app_state = Arc::new(api::AppState::new(
            health_registry.clone(),
            MetricPublisher::new(samples),
            metrics.clone(),
        ));
        let port = config.metrics_port;
        let server_shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = api::serve(port, app_state, server_shutdown).await {
                error!(error = %e, "Metrics server stopped");
            }
        }));
    }

    if let Err(e) = wait_until_ready(store.as_ref(), &config.readiness_policy(), &shutdown).await
    {
        health_registry
            .set_unhealthy(components::METRICS_STORE, e.to_string())
            .await;
        shutdown.cancel();
        join_background(handles).await;
        return Err(e).context(format!("metrics store {} unavailable", store.describe()));
    }
    health_registry.set_healthy(components::METRICS_STORE).await;
    health_registry.set_ready(true).await;

    let engine = DecisionEngine::new(
        runtime,
        AggregationQueries::new(store),
        thresholds,
        logger.clone(),
    );
    let mut evaluation = EvaluationLoop::new(
        engine,
        config.evaluation_interval(),
        metrics,
        health_registry,
        logger.clone(),
    );
    if !config.loop_enabled() {
        evaluation = evaluation.once();
    }

    evaluation.run(shutdown.clone()).await;

    if !shutdown.is_cancelled() {
        logger.log_shutdown("evaluation finished");
        shutdown.cancel();
    }
    join_background(handles).await;

    info!("Shutdown complete");
    Ok(())
}

/// Wait for spawned tasks, reporting any that panicked
async fn join_background(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if let Err(e) = handle.await {
            error!(error = %e, "Background task terminated abnormally");
        }
    }
}

/// Cancel the token on Ctrl-C or SIGTERM
async fn watch_signals(shutdown: CancellationToken, logger: StructuredLogger) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => logger.log_shutdown("SIGINT received"),
        _ = terminate => logger.log_shutdown("SIGTERM received"),
        _ = shutdown.cancelled() => return,
    }

    shutdown.cancel();
}

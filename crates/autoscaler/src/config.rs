//! Autoscaler configuration

use anyhow::Result;
use autoscaler_lib::engine::Thresholds;
use autoscaler_lib::query::ReadinessPolicy;
use config::Environment;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Autoscaler configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AutoscalerConfig {
    /// Host name used to tag structured log events
    pub hostname: String,

    /// Metrics store base URL
    pub prometheus_url: String,

    /// Docker Engine API endpoint
    pub docker_host: String,

    /// `yes` keeps evaluating; anything else runs one cycle and exits
    pub loop_mode: String,

    /// Evaluation interval in seconds, at least 1
    pub interval_seconds: u64,

    /// Sampling interval in seconds, at least 1
    pub sample_interval_seconds: u64,

    /// `yes` runs the sampler and the exposition endpoint
    pub metrics_mode: String,

    /// Exposition endpoint port
    pub metrics_port: u16,

    pub cpu_percentage_upper_limit: f64,
    pub cpu_percentage_lower_limit: f64,
    pub memory_percentage_upper_limit: f64,
    pub memory_percentage_lower_limit: f64,

    /// Readiness attempts before startup gives up, at least 1
    pub readiness_max_attempts: u32,

    /// Per-request timeout for both HTTP clients, at least 1 second
    pub request_timeout_seconds: u64,
}

/// Environment as read, before per-variable validation
///
/// Every value stays a string so one bad variable cannot fail the rest.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    hostname: Option<String>,
    prometheus_url: Option<String>,
    docker_host: Option<String>,
    #[serde(rename = "loop")]
    loop_mode: Option<String>,
    interval_seconds: Option<String>,
    sample_interval_seconds: Option<String>,
    metrics_enabled: Option<String>,
    metrics_port: Option<String>,
    cpu_percentage_upper_limit: Option<String>,
    cpu_percentage_lower_limit: Option<String>,
    memory_percentage_upper_limit: Option<String>,
    memory_percentage_lower_limit: Option<String>,
    readiness_max_attempts: Option<String>,
    request_timeout_seconds: Option<String>,
}

fn default_hostname() -> String {
    "swarm-autoscaler".to_string()
}

fn default_prometheus_url() -> String {
    "http://prometheus:9090".to_string()
}

fn default_docker_host() -> String {
    "http://localhost:2375".to_string()
}

fn default_yes() -> String {
    "yes".to_string()
}

fn default_interval() -> u64 {
    13
}

fn default_sample_interval() -> u64 {
    10
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_readiness_attempts() -> u32 {
    10
}

fn default_request_timeout() -> u64 {
    10
}

/// Non-empty value or the default
fn text(raw: Option<String>, default: fn() -> String) -> String {
    raw.filter(|v| !v.trim().is_empty())
        .unwrap_or_else(default)
}

/// Parsed value, or the default with a warning naming the variable
fn parsed<T: FromStr>(variable: &str, raw: Option<String>, default: T) -> T {
    let Some(value) = raw.filter(|v| !v.trim().is_empty()) else {
        return default;
    };

    match value.trim().parse() {
        Ok(parsed) => parsed,
        Err(_) => {
            warn!(variable = variable, value = %value, "Invalid value, using default");
            default
        }
    }
}

/// Like [`parsed`], but zero also falls back to the default
fn positive<T>(variable: &str, raw: Option<String>, default: T) -> T
where
    T: FromStr + PartialEq + Default + Copy,
{
    let value = parsed(variable, raw, default);
    if value == T::default() {
        warn!(variable = variable, "Value must be at least 1, using default");
        return default;
    }
    value
}

impl From<RawConfig> for AutoscalerConfig {
    fn from(raw: RawConfig) -> Self {
        Self {
            hostname: text(raw.hostname, default_hostname),
            prometheus_url: text(raw.prometheus_url, default_prometheus_url),
            docker_host: text(raw.docker_host, default_docker_host),
            loop_mode: text(raw.loop_mode, default_yes),
            interval_seconds: positive(
                "INTERVAL_SECONDS",
                raw.interval_seconds,
                default_interval(),
            ),
            sample_interval_seconds: positive(
                "SAMPLE_INTERVAL_SECONDS",
                raw.sample_interval_seconds,
                default_sample_interval(),
            ),
            metrics_mode: text(raw.metrics_enabled, default_yes),
            metrics_port: parsed("METRICS_PORT", raw.metrics_port, default_metrics_port()),
            cpu_percentage_upper_limit: parsed(
                "CPU_PERCENTAGE_UPPER_LIMIT",
                raw.cpu_percentage_upper_limit,
                0.0,
            ),
            cpu_percentage_lower_limit: parsed(
                "CPU_PERCENTAGE_LOWER_LIMIT",
                raw.cpu_percentage_lower_limit,
                0.0,
            ),
            memory_percentage_upper_limit: parsed(
                "MEMORY_PERCENTAGE_UPPER_LIMIT",
                raw.memory_percentage_upper_limit,
                0.0,
            ),
            memory_percentage_lower_limit: parsed(
                "MEMORY_PERCENTAGE_LOWER_LIMIT",
                raw.memory_percentage_lower_limit,
                0.0,
            ),
            readiness_max_attempts: positive(
                "READINESS_MAX_ATTEMPTS",
                raw.readiness_max_attempts,
                default_readiness_attempts(),
            ),
            request_timeout_seconds: positive(
                "REQUEST_TIMEOUT_SECONDS",
                raw.request_timeout_seconds,
                default_request_timeout(),
            ),
        }
    }
}

impl Default for AutoscalerConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

impl AutoscalerConfig {
    /// Load configuration from the process environment
    pub fn load() -> Result<Self> {
        Self::from_environment(Environment::default())
    }

    /// Load configuration from an environment source
    ///
    /// Empty variables count as unset. Each invalid variable falls back to
    /// its own default.
    pub fn from_environment(environment: Environment) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(environment.ignore_empty(true))
            .build()?;

        let raw: RawConfig = config.try_deserialize().unwrap_or_else(|e| {
            warn!(error = %e, "Unreadable environment, using defaults");
            RawConfig::default()
        });

        Ok(raw.into())
    }

    pub fn loop_enabled(&self) -> bool {
        self.loop_mode == "yes"
    }

    pub fn metrics_enabled(&self) -> bool {
        self.metrics_mode == "yes"
    }

    pub fn evaluation_interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn readiness_policy(&self) -> ReadinessPolicy {
        ReadinessPolicy {
            max_attempts: self.readiness_max_attempts,
            ..ReadinessPolicy::default()
        }
    }

    /// Configured limits with zeros replaced by defaults
    ///
    /// A lower limit at or above its upper limit is kept but logged.
    pub fn thresholds(&self) -> Thresholds {
        let thresholds = Thresholds {
            cpu_upper: self.cpu_percentage_upper_limit,
            cpu_lower: self.cpu_percentage_lower_limit,
            memory_upper: self.memory_percentage_upper_limit,
            memory_lower: self.memory_percentage_lower_limit,
        }
        .with_defaults();

        for band in thresholds.collapsed_bands() {
            warn!(
                band = band,
                "Lower limit is not below upper limit, hysteresis band collapsed"
            );
        }

        thresholds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_vars(vars: &[(&str, &str)]) -> AutoscalerConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AutoscalerConfig::from_environment(Environment::default().source(Some(map))).unwrap()
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config = from_vars(&[]);

        assert_eq!(config, AutoscalerConfig::default());
        assert_eq!(config.prometheus_url, "http://prometheus:9090");
        assert_eq!(config.docker_host, "http://localhost:2375");
        assert!(config.loop_enabled());
        assert!(config.metrics_enabled());
        assert_eq!(config.evaluation_interval(), Duration::from_secs(13));
        assert_eq!(config.sample_interval(), Duration::from_secs(10));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.readiness_policy().max_attempts, 10);
        assert_eq!(config.thresholds(), Thresholds::default());
    }

    #[test]
    fn test_environment_overrides() {
        let config = from_vars(&[
            ("PROMETHEUS_URL", "http://store:9091"),
            ("LOOP", "no"),
            ("METRICS_ENABLED", "no"),
            ("INTERVAL_SECONDS", "30"),
            ("CPU_PERCENTAGE_UPPER_LIMIT", "85"),
            ("CPU_PERCENTAGE_LOWER_LIMIT", "25"),
        ]);

        assert_eq!(config.prometheus_url, "http://store:9091");
        assert!(!config.loop_enabled());
        assert!(!config.metrics_enabled());
        assert_eq!(config.interval_seconds, 30);

        let thresholds = config.thresholds();
        assert_eq!(thresholds.cpu_upper, 85.0);
        assert_eq!(thresholds.cpu_lower, 25.0);
        assert_eq!(thresholds.memory_upper, 80.0);
        assert_eq!(thresholds.memory_lower, 20.0);
    }

    #[test]
    fn test_zero_threshold_uses_default() {
        let config = from_vars(&[("MEMORY_PERCENTAGE_UPPER_LIMIT", "0")]);
        assert_eq!(config.thresholds().memory_upper, 80.0);
    }

    #[test]
    fn test_collapsed_band_is_accepted() {
        let config = from_vars(&[
            ("CPU_PERCENTAGE_UPPER_LIMIT", "30"),
            ("CPU_PERCENTAGE_LOWER_LIMIT", "40"),
        ]);

        let thresholds = config.thresholds();
        assert_eq!(thresholds.cpu_upper, 30.0);
        assert_eq!(thresholds.cpu_lower, 40.0);
    }

    #[test]
    fn test_invalid_value_only_resets_its_own_variable() {
        let config = from_vars(&[
            ("PROMETHEUS_URL", "http://store:9091"),
            ("LOOP", "no"),
            ("INTERVAL_SECONDS", "soon"),
            ("CPU_PERCENTAGE_UPPER_LIMIT", "85%"),
            ("CPU_PERCENTAGE_LOWER_LIMIT", "25"),
        ]);

        assert_eq!(config.prometheus_url, "http://store:9091");
        assert!(!config.loop_enabled());
        assert_eq!(config.interval_seconds, 13);

        let thresholds = config.thresholds();
        assert_eq!(thresholds.cpu_upper, 75.0);
        assert_eq!(thresholds.cpu_lower, 25.0);
    }

    #[test]
    fn test_empty_values_count_as_unset() {
        let config = from_vars(&[
            ("INTERVAL_SECONDS", ""),
            ("PROMETHEUS_URL", ""),
            ("LOOP", "no"),
        ]);

        assert_eq!(config.interval_seconds, 13);
        assert_eq!(config.prometheus_url, "http://prometheus:9090");
        assert!(!config.loop_enabled());
    }

    #[test]
    fn test_zero_intervals_fall_back_to_defaults() {
        let config = from_vars(&[
            ("INTERVAL_SECONDS", "0"),
            ("SAMPLE_INTERVAL_SECONDS", "0"),
            ("REQUEST_TIMEOUT_SECONDS", "0"),
            ("READINESS_MAX_ATTEMPTS", "0"),
        ]);

        assert_eq!(config.evaluation_interval(), Duration::from_secs(13));
        assert_eq!(config.sample_interval(), Duration::from_secs(10));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.readiness_policy().max_attempts, 10);
    }

    #[test]
    fn test_values_are_trimmed() {
        let config = from_vars(&[("SAMPLE_INTERVAL_SECONDS", " 5 ")]);
        assert_eq!(config.sample_interval(), Duration::from_secs(5));
    }
}

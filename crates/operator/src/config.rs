//! Operator configuration

use anyhow::{Context, Result};
use operator_lib::{ControllerConfig, ReconcilerConfig, RetryPolicy};
use serde::Deserialize;
use std::time::Duration;

/// Operator configuration, read from `OPERATOR_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct OperatorConfig {
    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Namespace holding Solver, Reservation and Contract objects
    #[serde(default = "default_fluidos_namespace")]
    pub fluidos_namespace: String,

    #[serde(default = "default_max_concurrent_reconciles")]
    pub max_concurrent_reconciles: usize,

    #[serde(default = "default_reconcile_timeout")]
    pub reconcile_timeout_secs: u64,

    /// Delay before a failed reconcile is retried
    #[serde(default = "default_error_requeue")]
    pub error_requeue_secs: u64,

    /// Delay before a settled Intent is reconciled again
    #[serde(default = "default_resync_interval")]
    pub resync_interval_secs: u64,

    /// Attempts for a status write that keeps hitting version conflicts
    #[serde(default = "default_status_retry_steps")]
    pub status_retry_steps: u32,

    #[serde(default = "default_status_retry_initial_backoff")]
    pub status_retry_initial_backoff_ms: u64,
}

fn default_api_port() -> u16 {
    8081
}

fn default_fluidos_namespace() -> String {
    "fluidos".to_string()
}

fn default_max_concurrent_reconciles() -> usize {
    4
}

fn default_reconcile_timeout() -> u64 {
    30
}

fn default_error_requeue() -> u64 {
    10
}

fn default_resync_interval() -> u64 {
    300
}

fn default_status_retry_steps() -> u32 {
    5
}

fn default_status_retry_initial_backoff() -> u64 {
    10
}

impl OperatorConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        Self::from_builder(
            config::Config::builder().add_source(config::Environment::with_prefix("OPERATOR")),
        )
    }

    fn from_builder(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        builder
            .build()
            .context("Failed to read operator configuration")?
            .try_deserialize()
            .context("Invalid operator configuration")
    }

    pub fn controller_config(&self) -> ControllerConfig {
        let retry = RetryPolicy {
            steps: self.status_retry_steps.max(1),
            initial_backoff: Duration::from_millis(self.status_retry_initial_backoff_ms),
            ..RetryPolicy::default()
        };

        ControllerConfig {
            reconciler: ReconcilerConfig {
                fluidos_namespace: self.fluidos_namespace.clone(),
                retry,
            },
            max_concurrent_reconciles: self.max_concurrent_reconciles,
            reconcile_timeout: Duration::from_secs(self.reconcile_timeout_secs),
            error_requeue: Duration::from_secs(self.error_requeue_secs),
            resync_interval: Duration::from_secs(self.resync_interval_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OperatorConfig::from_builder(config::Config::builder()).unwrap();

        assert_eq!(config.api_port, 8081);
        assert_eq!(config.fluidos_namespace, "fluidos");
        assert_eq!(config.max_concurrent_reconciles, 4);
        assert_eq!(config.status_retry_steps, 5);
    }

    #[test]
    fn test_overrides_reach_controller_config() {
        let builder = config::Config::builder()
            .set_override("fluidos_namespace", "fluidos-system")
            .unwrap()
            .set_override("reconcile_timeout_secs", 5)
            .unwrap()
            .set_override("status_retry_steps", 0)
            .unwrap();
        let config = OperatorConfig::from_builder(builder).unwrap();

        let controller = config.controller_config();

        assert_eq!(controller.reconciler.fluidos_namespace, "fluidos-system");
        assert_eq!(controller.reconcile_timeout, Duration::from_secs(5));
        assert_eq!(controller.reconciler.retry.steps, 1);
        assert_eq!(
            controller.reconciler.retry.initial_backoff,
            Duration::from_millis(10)
        );
    }

    #[test]
    fn test_invalid_value_is_an_error() {
        let builder = config::Config::builder()
            .set_override("api_port", "not-a-port")
            .unwrap();

        assert!(OperatorConfig::from_builder(builder).is_err());
    }
}

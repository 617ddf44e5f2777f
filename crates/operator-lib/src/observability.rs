//! Observability infrastructure for the operator
//!
//! Provides:
//! - Prometheus metrics (reconcile latency and outcomes, status conflicts,
//!   condition transitions, runtime object applies)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for reconcile latency (in seconds)
const RECONCILE_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<OperatorMetricsInner> = OnceLock::new();

struct OperatorMetricsInner {
    reconcile_duration_seconds: Histogram,
    reconcile_outcomes: IntCounterVec,
    reconcile_errors: IntCounterVec,
    status_conflicts: IntCounter,
    condition_transitions: IntCounterVec,
    object_applies: IntCounterVec,
    reconciles_inflight: IntGauge,
}

impl OperatorMetricsInner {
    fn new() -> Self {
        Self {
            reconcile_duration_seconds: register_histogram!(
                "flare_operator_reconcile_duration_seconds",
                "Time spent in one reconcile of an Intent",
                RECONCILE_BUCKETS.to_vec()
            )
            .expect("Failed to register reconcile_duration_seconds"),

            reconcile_outcomes: register_int_counter_vec!(
                "flare_operator_reconcile_outcomes_total",
                "Reconciles by where the cycle stopped",
                &["outcome"]
            )
            .expect("Failed to register reconcile_outcomes"),

            reconcile_errors: register_int_counter_vec!(
                "flare_operator_reconcile_errors_total",
                "Reconciles that failed, by error class",
                &["error"]
            )
            .expect("Failed to register reconcile_errors"),

            status_conflicts: register_int_counter!(
                "flare_operator_status_conflicts_total",
                "Status writes retried after a version conflict"
            )
            .expect("Failed to register status_conflicts"),

            condition_transitions: register_int_counter_vec!(
                "flare_operator_condition_transitions_total",
                "Condition writes that changed an Intent's status",
                &["condition", "status"]
            )
            .expect("Failed to register condition_transitions"),

            object_applies: register_int_counter_vec!(
                "flare_operator_object_applies_total",
                "Create-or-update calls on runtime objects",
                &["kind", "result"]
            )
            .expect("Failed to register object_applies"),

            reconciles_inflight: register_int_gauge!(
                "flare_operator_reconciles_inflight",
                "Reconciles currently running"
            )
            .expect("Failed to register reconciles_inflight"),
        }
    }
}

/// Operator metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share it.
#[derive(Clone)]
pub struct OperatorMetrics {
    _private: (),
}

impl Default for OperatorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl OperatorMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(OperatorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &OperatorMetricsInner {
        GLOBAL_METRICS.get_or_init(OperatorMetricsInner::new)
    }

    pub fn observe_reconcile_duration(&self, duration_secs: f64) {
        self.inner().reconcile_duration_seconds.observe(duration_secs);
    }

    pub fn inc_reconcile_outcome(&self, outcome: &str) {
        self.inner()
            .reconcile_outcomes
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn inc_reconcile_error(&self, error: &str) {
        self.inner().reconcile_errors.with_label_values(&[error]).inc();
    }

    pub fn inc_status_conflict(&self) {
        self.inner().status_conflicts.inc();
    }

    pub fn inc_condition_transition(&self, condition: &str, status: &str) {
        self.inner()
            .condition_transitions
            .with_label_values(&[condition, status])
            .inc();
    }

    pub fn inc_object_apply(&self, kind: &str, result: &str) {
        self.inner()
            .object_applies
            .with_label_values(&[kind, result])
            .inc();
    }

    /// Track a running reconcile until the guard is dropped
    pub fn inflight_guard(&self) -> InflightGuard {
        self.inner().reconciles_inflight.inc();
        InflightGuard {
            metrics: self.clone(),
        }
    }
}

/// Decrements the in-flight gauge on drop
pub struct InflightGuard {
    metrics: OperatorMetrics,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.metrics.inner().reconciles_inflight.dec();
    }
}

/// Structured logger for operator events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log operator startup
    pub fn log_startup(&self, version: &str, fluidos_namespace: &str) {
        info!(
            event = "operator_started",
            instance = %self.instance,
            operator_version = %version,
            fluidos_namespace = %fluidos_namespace,
            "Flare operator started"
        );
    }

    /// Log operator shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "operator_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Flare operator shutting down"
        );
    }

    /// Log a condition write that changed an Intent's status
    pub fn log_condition_transition(
        &self,
        namespace: &str,
        name: &str,
        condition: &str,
        status: &str,
        reason: &str,
        message: &str,
    ) {
        info!(
            event = "condition_transition",
            instance = %self.instance,
            namespace = %namespace,
            name = %name,
            condition = %condition,
            status = %status,
            reason = %reason,
            message = %message,
            "Intent condition updated"
        );
    }

    /// Log a reconcile handed back to the scheduler as failed
    pub fn log_reconcile_failure(&self, namespace: &str, name: &str, error: &str, retry_secs: u64) {
        warn!(
            event = "reconcile_failed",
            instance = %self.instance,
            namespace = %namespace,
            name = %name,
            error = %error,
            retry_secs = retry_secs,
            "Reconcile failed, requeueing"
        );
    }
}

//! Reconciliation engine
//!
//! Drives an Intent through the Solver, NamespaceOffloading and Deploy
//! phases in order. Each phase's condition decides what happens to it in a
//! cycle: a missing condition is bootstrapped to Unknown and ends the cycle,
//! an Unknown condition runs the phase's create step, and a False or True
//! condition is re-derived from the phase's external resource before moving
//! on to the next phase.

use crate::crd::{ConditionStatus, ConditionType, Intent};
use crate::error::{Error, Result};
use crate::observability::{OperatorMetrics, StructuredLogger};
use crate::phases::{DeployDriver, OffloadingDriver, PhaseContext, PhaseDriver, SolverDriver, Step};
use crate::store::{lookup, ObjectStore, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Configuration for the reconciliation engine
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Namespace holding Solver, Reservation and Contract objects (default: "fluidos")
    pub fluidos_namespace: String,
    /// Backoff for status writes that hit a version conflict
    pub retry: RetryPolicy,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            fluidos_namespace: "fluidos".to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Where a reconcile cycle stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The Intent no longer exists
    Missing,
    /// The Intent is being deleted; nothing was done
    Deleting,
    /// The cycle ended on a phase that needs another trigger
    Waiting(ConditionType),
    /// Every phase was evaluated
    Completed,
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Missing => "missing",
            ReconcileOutcome::Deleting => "deleting",
            ReconcileOutcome::Waiting(_) => "waiting",
            ReconcileOutcome::Completed => "completed",
        }
    }
}

/// Runs reconcile cycles against an object store
pub struct Reconciler<S: ?Sized> {
    store: Arc<S>,
    config: ReconcilerConfig,
    logger: StructuredLogger,
    metrics: OperatorMetrics,
}

impl<S: ObjectStore + ?Sized> Reconciler<S> {
    pub fn new(store: Arc<S>, config: ReconcilerConfig, logger: StructuredLogger) -> Self {
        Self {
            store,
            config,
            logger,
            metrics: OperatorMetrics::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    /// Run one cycle for the Intent `namespace/name`
    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<ReconcileOutcome> {
        let _inflight = self.metrics.inflight_guard();
        let start = Instant::now();

        let result = self.run_phases(namespace, name).await;

        self.metrics
            .observe_reconcile_duration(start.elapsed().as_secs_f64());
        match &result {
            Ok(outcome) => self.metrics.inc_reconcile_outcome(outcome.as_str()),
            Err(e) => self.metrics.inc_reconcile_error(e.metric_label()),
        }
        result
    }

    /// Run one cycle, giving up once `deadline` has passed
    ///
    /// An abandoned cycle leaves any write that already completed in place;
    /// the next trigger picks up from there.
    pub async fn reconcile_with_deadline(
        &self,
        namespace: &str,
        name: &str,
        deadline: Duration,
    ) -> Result<ReconcileOutcome> {
        match tokio::time::timeout(deadline, self.reconcile(namespace, name)).await {
            Ok(result) => result,
            Err(_) => {
                self.metrics.inc_reconcile_error("deadline");
                Err(Error::DeadlineExceeded(deadline))
            }
        }
    }

    async fn run_phases(&self, namespace: &str, name: &str) -> Result<ReconcileOutcome> {
        let store: &S = &self.store;
        let Some(mut intent) = lookup::<Intent, S>(store, namespace, name).await? else {
            debug!(namespace = %namespace, name = %name, "Intent not found, skipping");
            return Ok(ReconcileOutcome::Missing);
        };

        if intent.is_deleting() {
            debug!(namespace = %namespace, name = %name, "Intent is being deleted, skipping");
            return Ok(ReconcileOutcome::Deleting);
        }

        let ctx = PhaseContext::new(store, &self.config.fluidos_namespace, self.config.retry)
            .with_logger(&self.logger);
        let drivers: [&dyn PhaseDriver<S>; 3] = [&SolverDriver, &OffloadingDriver, &DeployDriver];

        for driver in drivers {
            let phase = driver.condition_type();
            match intent.condition_status(phase) {
                None => {
                    info!(
                        namespace = %namespace,
                        name = %name,
                        phase = phase.as_str(),
                        "Starting phase"
                    );
                    driver.track_unknown(&ctx, &mut intent).await?;
                    return Ok(ReconcileOutcome::Waiting(phase));
                }
                Some(ConditionStatus::Unknown) => {
                    if driver.create(&ctx, &mut intent).await? == Step::Wait {
                        return Ok(ReconcileOutcome::Waiting(phase));
                    }
                }
                Some(ConditionStatus::False) | Some(ConditionStatus::True) => {
                    driver.handle(&ctx, &mut intent).await?;
                }
            }
        }

        Ok(ReconcileOutcome::Completed)
    }
}

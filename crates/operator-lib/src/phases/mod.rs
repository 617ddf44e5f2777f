//! Phase drivers
//!
//! Each driver owns one condition on the Intent. `track_unknown` seeds the
//! condition, `create` materialises the phase's external resource and
//! `handle` re-derives the condition from what that resource reports.

mod deploy;
mod offloading;
mod solver;

pub use deploy::DeployDriver;
pub use offloading::{reservation_name, OffloadingDriver};
pub use solver::{solver_phase_condition, SolverDriver};
pub use offloading::offloading_phase_condition;

use crate::crd::{Condition, ConditionStatus, ConditionType, Intent};
use crate::error::Result;
use crate::observability::{OperatorMetrics, StructuredLogger};
use crate::store::{ConditionWriter, ObjectStore, RetryPolicy};
use async_trait::async_trait;

/// Whether the engine may go on to the next phase in this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Wait,
}

impl Step {
    pub fn from_status(status: ConditionStatus) -> Self {
        match status {
            ConditionStatus::True => Step::Continue,
            _ => Step::Wait,
        }
    }
}

/// Everything a driver needs for one reconcile pass
pub struct PhaseContext<'a, S: ?Sized> {
    pub store: &'a S,
    pub fluidos_namespace: &'a str,
    pub writer: ConditionWriter<'a, S>,
    pub metrics: OperatorMetrics,
}

impl<'a, S: ObjectStore + ?Sized> PhaseContext<'a, S> {
    pub fn new(store: &'a S, fluidos_namespace: &'a str, retry: RetryPolicy) -> Self {
        Self {
            store,
            fluidos_namespace,
            writer: ConditionWriter::new(store, retry),
            metrics: OperatorMetrics::new(),
        }
    }

    pub fn with_logger(mut self, logger: &'a StructuredLogger) -> Self {
        self.writer = self.writer.with_logger(logger);
        self
    }
}

/// One ordered stage of reconciliation
#[async_trait]
pub trait PhaseDriver<S: ObjectStore + ?Sized>: Send + Sync {
    /// Condition this driver owns
    fn condition_type(&self) -> ConditionType;

    /// Condition recorded when the phase is about to start
    fn unknown_condition(&self) -> Condition;

    async fn track_unknown(&self, ctx: &PhaseContext<'_, S>, intent: &mut Intent) -> Result<()> {
        ctx.writer
            .bootstrap(intent, self.unknown_condition())
            .await
            .map(|_| ())
    }

    async fn create(&self, ctx: &PhaseContext<'_, S>, intent: &mut Intent) -> Result<Step>;

    async fn handle(&self, ctx: &PhaseContext<'_, S>, intent: &mut Intent) -> Result<Step>;
}

/// Condition for an observed external phase
///
/// A phase missing from the mapping keeps the status and reason already
/// recorded; the message and observed generation are always refreshed.
pub(crate) fn observed_condition(
    condition_type: ConditionType,
    current: Option<&Condition>,
    mapped: Option<(ConditionStatus, &'static str)>,
    message: &str,
    generation: Option<i64>,
) -> Condition {
    let (status, reason) = match (mapped, current) {
        (Some((status, reason)), _) => (status, reason.to_string()),
        (None, Some(current)) => (current.status, current.reason.clone()),
        (None, None) => (ConditionStatus::Unknown, String::new()),
    };
    Condition::new(condition_type, status, reason, message).with_observed_generation(generation)
}

#[cfg(test)]
mod tests;

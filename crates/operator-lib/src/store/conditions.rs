//! Condition writes on the Intent status subresource

use super::{ObjectStore, StoreError};
use crate::crd::{Condition, Intent};
use crate::error::{Error, Result};
use crate::observability::{OperatorMetrics, StructuredLogger};
use kube::ResourceExt;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Bounded exponential backoff for version conflicts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub steps: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            steps: 5,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_secs(1),
        }
    }
}

/// Run `op` until it stops failing with a version conflict
///
/// Exhausting the budget surfaces the last conflict to the caller.
pub async fn retry_on_conflict<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let metrics = OperatorMetrics::new();
    let mut backoff = policy.initial_backoff;
    let mut attempt = 1;

    loop {
        match op().await {
            Err(Error::Store(StoreError::Conflict(key))) if attempt < policy.steps => {
                metrics.inc_status_conflict();
                debug!(
                    object = %key,
                    attempt = attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "Version conflict, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff = std::cmp::min(backoff * 2, policy.max_backoff);
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Writes phase conditions onto an Intent's status
///
/// Both entry points leave the caller's copy of the Intent at the version
/// last read or written, so later writes in the same reconcile start from
/// fresh state.
pub struct ConditionWriter<'a, S: ?Sized> {
    store: &'a S,
    policy: RetryPolicy,
    logger: Option<&'a StructuredLogger>,
    metrics: OperatorMetrics,
}

impl<'a, S: ObjectStore + ?Sized> ConditionWriter<'a, S> {
    pub fn new(store: &'a S, policy: RetryPolicy) -> Self {
        Self {
            store,
            policy,
            logger: None,
            metrics: OperatorMetrics::new(),
        }
    }

    pub fn with_logger(mut self, logger: &'a StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Re-fetch the Intent, merge the condition and write it back
    ///
    /// Retries on version conflicts. No write is issued when the merge
    /// changes nothing. Returns whether the status was written.
    pub async fn write(&self, intent: &mut Intent, condition: Condition) -> Result<bool> {
        let namespace = intent.namespace().unwrap_or_default();
        let name = intent.name_any();
        let store = self.store;
        let (namespace_ref, name_ref, condition_ref) = (&namespace, &name, &condition);

        let (latest, written) = retry_on_conflict(self.policy, move || async move {
            let mut latest: Intent = store.get(namespace_ref, name_ref).await?;
            if !latest.set_condition(condition_ref.clone()) {
                return Ok((latest, false));
            }
            let updated = store.update_status(&latest).await?;
            Ok((updated, true))
        })
        .await?;

        *intent = latest;
        if written {
            self.record(&namespace, &name, &condition);
        }
        Ok(written)
    }

    /// Write the condition straight onto the caller's copy
    ///
    /// Used when establishing a condition that does not exist yet, so no
    /// earlier writer can be overwritten.
    pub async fn bootstrap(&self, intent: &mut Intent, condition: Condition) -> Result<bool> {
        let mut next = intent.clone();
        if !next.set_condition(condition.clone()) {
            return Ok(false);
        }

        *intent = self.store.update_status(&next).await?;
        self.record(
            &intent.namespace().unwrap_or_default(),
            &intent.name_any(),
            &condition,
        );
        Ok(true)
    }

    fn record(&self, namespace: &str, name: &str, condition: &Condition) {
        let type_ = condition.type_.as_str();
        let status = condition.status.as_str();
        self.metrics.inc_condition_transition(type_, status);
        if let Some(logger) = self.logger {
            logger.log_condition_transition(
                namespace,
                name,
                type_,
                status,
                &condition.reason,
                &condition.message,
            );
        }
    }
}

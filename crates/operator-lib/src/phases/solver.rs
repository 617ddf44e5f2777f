//! Solver phase: ask the provider search to find, reserve and peer

use super::{observed_condition, PhaseContext, PhaseDriver, Step};
use crate::crd::{
    Condition, ConditionStatus, ConditionType, Intent, Solver, SolverPhase, SolverSelector,
    SolverSpec, K8SLICE_FLAVOR_TYPE,
};
use crate::error::Result;
use crate::selector;
use crate::store::{lookup, upsert, ObjectStore, OperationResult};
use async_trait::async_trait;
use kube::ResourceExt;
use tracing::{debug, info};

const CREATED_MESSAGE: &str = "Solver has been created, waiting for its solving.";
const UPDATED_MESSAGE: &str = "Solver has been updated, waiting for its solving.";

/// Condition status and reason for an observed solver phase
pub fn solver_phase_condition(phase: SolverPhase) -> Option<(ConditionStatus, &'static str)> {
    let mapped = match phase {
        SolverPhase::Solved => (ConditionStatus::True, "SolverSolved"),
        SolverPhase::Failed => (ConditionStatus::False, "SolverFailed"),
        SolverPhase::Running => (ConditionStatus::False, "SolverRunning"),
        SolverPhase::Allocating => (ConditionStatus::False, "SolverAllocating"),
        SolverPhase::Idle => (ConditionStatus::False, "SolverIdle"),
        SolverPhase::Timeout => (ConditionStatus::False, "SolverTimeout"),
        SolverPhase::Active => (ConditionStatus::False, "SolverActive"),
        SolverPhase::Pending => (ConditionStatus::False, "SolverPending"),
        SolverPhase::Inactive => (ConditionStatus::False, "SolverInactive"),
        SolverPhase::Unrecognized => return None,
    };
    Some(mapped)
}

/// Converge a Solver onto the Intent's resource constraints
pub fn apply_solver(solver: &mut Solver, intent: &Intent) {
    solver.spec.intent_id = intent.namespace().unwrap_or_default();
    solver.spec.find_candidate = true;
    solver.spec.reserve_and_buy = true;
    solver.spec.establish_peering = true;
    solver.spec.selector = Some(SolverSelector {
        flavor_type: K8SLICE_FLAVOR_TYPE.to_string(),
        filters: Some(selector::compile(&intent.spec.workload.resources).to_value()),
    });
}

/// Drives the `Solver` condition
pub struct SolverDriver;

#[async_trait]
impl<S: ObjectStore + ?Sized> PhaseDriver<S> for SolverDriver {
    fn condition_type(&self) -> ConditionType {
        ConditionType::Solver
    }

    fn unknown_condition(&self) -> Condition {
        Condition::new(
            ConditionType::Solver,
            ConditionStatus::Unknown,
            "IntentCreated",
            "Intent is going to be created",
        )
    }

    async fn create(&self, ctx: &PhaseContext<'_, S>, intent: &mut Intent) -> Result<Step> {
        let name = intent.namespace().unwrap_or_default();
        let existing: Option<Solver> = lookup(ctx.store, ctx.fluidos_namespace, &name).await?;

        let mut template = Solver::new(&name, SolverSpec::default());
        template.metadata.namespace = Some(ctx.fluidos_namespace.to_string());

        let target: &Intent = intent;
        let applied = upsert(ctx.store, existing, template, |solver: &mut Solver| {
            apply_solver(solver, target);
            Ok(())
        })
        .await;

        let condition = match applied {
            Ok((solver, result)) => {
                info!(
                    namespace = %name,
                    fluidos_namespace = %ctx.fluidos_namespace,
                    result = result.as_str(),
                    "Solver applied"
                );
                created_condition(&solver, result)
            }
            Err(e) => Condition::new(
                ConditionType::Solver,
                ConditionStatus::False,
                "SolverCreationFailed",
                e.to_string(),
            ),
        };

        let status = condition.status;
        ctx.writer.write(intent, condition).await?;
        Ok(Step::from_status(status))
    }

    async fn handle(&self, ctx: &PhaseContext<'_, S>, intent: &mut Intent) -> Result<Step> {
        let name = intent.namespace().unwrap_or_default();
        let Some(solver) = lookup::<Solver, S>(ctx.store, ctx.fluidos_namespace, &name).await? else {
            debug!(namespace = %name, "Solver missing, creating it");
            return <Self as PhaseDriver<S>>::create(self, ctx, intent).await;
        };

        let condition = observed_condition(
            ConditionType::Solver,
            intent.condition(ConditionType::Solver),
            solver.observed_phase().and_then(solver_phase_condition),
            solver.observed_message(),
            solver.metadata.generation,
        );
        ctx.writer.write(intent, condition).await?;
        Ok(Step::Continue)
    }
}

/// Condition right after the Solver was upserted
///
/// A Solver that already reports a phase is mapped like in `handle`.
fn created_condition(solver: &Solver, result: OperationResult) -> Condition {
    let condition = match solver.observed_phase().and_then(solver_phase_condition) {
        Some((status, reason)) => Condition::new(
            ConditionType::Solver,
            status,
            reason,
            solver.observed_message(),
        ),
        None => {
            let (reason, message) = match result {
                OperationResult::Updated => ("SolverUpdateCompleted", UPDATED_MESSAGE),
                OperationResult::Created | OperationResult::Unchanged => {
                    ("SolverCreationCompleted", CREATED_MESSAGE)
                }
            };
            Condition::new(
                ConditionType::Solver,
                ConditionStatus::False,
                reason,
                message,
            )
        }
    };
    condition.with_observed_generation(solver.metadata.generation)
}

//! Deploy phase: materialise the workload's runtime objects

use super::{PhaseContext, PhaseDriver, Step};
use crate::crd::{Condition, ConditionStatus, ConditionType, Intent, WorkloadType};
use crate::error::{Error, Result};
use crate::store::{create_or_update, ObjectStore, OperationResult, StoreObject};
use crate::synth::{self, apply_deployment, apply_ingress, apply_job, apply_service};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::{Resource, ResourceExt};
use tracing::{debug, warn};

/// A runtime object apply that failed, with the kind that stopped the pass
struct ApplyFailure {
    kind: &'static str,
    error: Error,
}

/// Drives the `Deploy` condition
pub struct DeployDriver;

impl DeployDriver {
    /// Create or converge one owned runtime object
    async fn apply<K, S, F>(
        ctx: &PhaseContext<'_, S>,
        intent: &Intent,
        kind: &'static str,
        object: K,
        mutate: F,
    ) -> std::result::Result<(), ApplyFailure>
    where
        K: StoreObject,
        S: ObjectStore + ?Sized,
        F: FnOnce(&mut K, &Intent) + Send,
    {
        let applied = create_or_update(ctx.store, object, |obj: &mut K| {
            mutate(obj, intent);
            synth::set_owner(obj.meta_mut(), intent)
        })
        .await;

        match applied {
            Ok((obj, result)) => {
                ctx.metrics.inc_object_apply(kind, result.as_str());
                if result != OperationResult::Unchanged {
                    debug!(
                        kind = kind,
                        namespace = %obj.namespace().unwrap_or_default(),
                        name = %obj.name_any(),
                        result = result.as_str(),
                        "Runtime object applied"
                    );
                }
                Ok(())
            }
            Err(error) => {
                ctx.metrics.inc_object_apply(kind, "failed");
                Err(ApplyFailure { kind, error })
            }
        }
    }

    async fn apply_all<S: ObjectStore + ?Sized>(
        ctx: &PhaseContext<'_, S>,
        intent: &Intent,
    ) -> std::result::Result<(), ApplyFailure> {
        match intent.spec.workload.workload_type {
            WorkloadType::Service => {
                if synth::wants_service(intent) {
                    let service = Service {
                        metadata: synth::object_meta(intent),
                        ..Default::default()
                    };
                    Self::apply(ctx, intent, "Service", service, apply_service).await?;
                }
                if synth::wants_ingress(intent) {
                    let ingress = Ingress {
                        metadata: synth::object_meta(intent),
                        ..Default::default()
                    };
                    Self::apply(ctx, intent, "Ingress", ingress, apply_ingress).await?;
                }
                let deployment = Deployment {
                    metadata: synth::object_meta(intent),
                    ..Default::default()
                };
                Self::apply(ctx, intent, "Deployment", deployment, apply_deployment).await
            }
            WorkloadType::Batch => {
                let job = Job {
                    metadata: synth::object_meta(intent),
                    ..Default::default()
                };
                Self::apply(ctx, intent, "Job", job, apply_job).await
            }
        }
    }
}

#[async_trait]
impl<S: ObjectStore + ?Sized> PhaseDriver<S> for DeployDriver {
    fn condition_type(&self) -> ConditionType {
        ConditionType::Deploy
    }

    fn unknown_condition(&self) -> Condition {
        Condition::new(
            ConditionType::Deploy,
            ConditionStatus::Unknown,
            "ResourceDeployment",
            "Resource deployment is about to start",
        )
    }

    async fn create(&self, ctx: &PhaseContext<'_, S>, intent: &mut Intent) -> Result<Step> {
        let outcome = Self::apply_all(ctx, intent).await;
        let generation = intent.metadata.generation;

        let condition = match outcome {
            Ok(()) => Condition::new(
                ConditionType::Deploy,
                ConditionStatus::True,
                "KubernetesObjectsHandled",
                "",
            ),
            Err(ApplyFailure { kind, error }) => {
                warn!(
                    namespace = %intent.namespace().unwrap_or_default(),
                    name = %intent.name_any(),
                    kind = kind,
                    error = %error,
                    "Runtime object apply failed"
                );
                Condition::new(
                    ConditionType::Deploy,
                    ConditionStatus::False,
                    format!("{}CreationFailed", kind),
                    error.to_string(),
                )
            }
        }
        .with_observed_generation(generation);

        let status = condition.status;
        ctx.writer.write(intent, condition).await?;
        Ok(Step::from_status(status))
    }

    async fn handle(&self, ctx: &PhaseContext<'_, S>, intent: &mut Intent) -> Result<Step> {
        <Self as PhaseDriver<S>>::create(self, ctx, intent).await
    }
}

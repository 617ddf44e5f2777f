//! Offloading phase: extend the Intent namespace onto the peered cluster

use super::{observed_condition, PhaseContext, PhaseDriver, Step};
use crate::crd::{
    strategy, Condition, ConditionStatus, ConditionType, Contract, Intent, NamespaceOffloading,
    NamespaceOffloadingSpec, OffloadingPhase, Reservation, NAMESPACE_OFFLOADING_NAME,
    REMOTE_CLUSTER_ID_LABEL,
};
use crate::error::Result;
use crate::store::{lookup, upsert, ObjectStore, OperationResult, StoreError, StoreObject};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{NodeSelector, NodeSelectorRequirement, NodeSelectorTerm};
use kube::ResourceExt;
use tracing::{debug, info};

const CREATED_MESSAGE: &str = "NamespaceOffloading has been created, waiting for its solving.";
const UPDATED_MESSAGE: &str = "NamespaceOffloading has been updated, waiting for its solving.";

/// Name of the Reservation the solver books for an Intent namespace
pub fn reservation_name(intent_namespace: &str) -> String {
    format!("reservation-{}", intent_namespace)
}

/// Condition status and reason for an observed offloading phase
pub fn offloading_phase_condition(phase: OffloadingPhase) -> Option<(ConditionStatus, &'static str)> {
    let mapped = match phase {
        OffloadingPhase::Ready => (ConditionStatus::True, "Completed"),
        OffloadingPhase::NoClusterSelected => (ConditionStatus::False, "NoClusterSelected"),
        OffloadingPhase::InProgress => (ConditionStatus::False, "InProgress"),
        OffloadingPhase::SomeFailed => (ConditionStatus::False, "SomeFailed"),
        OffloadingPhase::AllFailed => (ConditionStatus::False, "AllFailed"),
        OffloadingPhase::Terminating => (ConditionStatus::False, "Terminating"),
        OffloadingPhase::Unrecognized => return None,
    };
    Some(mapped)
}

/// Converge a NamespaceOffloading onto the remote cluster identity
pub fn apply_namespace_offloading(offloading: &mut NamespaceOffloading, cluster_id: &str) {
    offloading.spec.namespace_mapping_strategy = strategy::DEFAULT_NAME_MAPPING.to_string();
    offloading.spec.pod_offloading_strategy = strategy::REMOTE_POD_OFFLOADING.to_string();
    offloading.spec.cluster_selector = NodeSelector {
        node_selector_terms: vec![NodeSelectorTerm {
            match_expressions: Some(vec![NodeSelectorRequirement {
                key: REMOTE_CLUSTER_ID_LABEL.to_string(),
                operator: "In".to_string(),
                values: Some(vec![cluster_id.to_string()]),
            }]),
            match_fields: None,
        }],
    };
}

/// Outcome of walking Reservation -> Contract -> peering credentials
enum Prerequisite {
    Ready { cluster_id: String },
    Missing { reason: &'static str, message: String },
}

/// Read an object the solver owns; absent or undecodable ones are soft failures
async fn soft_get<K, S>(store: &S, namespace: &str, name: &str) -> Result<Result<K, String>>
where
    K: StoreObject,
    S: ObjectStore + ?Sized,
{
    match store.get::<K>(namespace, name).await {
        Ok(obj) => Ok(Ok(obj)),
        Err(e @ (StoreError::NotFound(_) | StoreError::Decode(_))) => Ok(Err(e.to_string())),
        Err(e) => Err(e.into()),
    }
}

async fn resolve_peering<S: ObjectStore + ?Sized>(
    ctx: &PhaseContext<'_, S>,
    intent_namespace: &str,
) -> Result<Prerequisite> {
    let reservation = match soft_get::<Reservation, S>(
        ctx.store,
        ctx.fluidos_namespace,
        &reservation_name(intent_namespace),
    )
    .await?
    {
        Ok(reservation) => reservation,
        Err(message) => {
            return Ok(Prerequisite::Missing {
                reason: "ReservationNotFound",
                message,
            })
        }
    };

    let contract_ref = reservation
        .status
        .map(|status| status.contract)
        .unwrap_or_default();
    if contract_ref.name.is_empty() || contract_ref.namespace.is_empty() {
        return Ok(Prerequisite::Missing {
            reason: "MissingContractReference",
            message: "Missing Name or Namespace in Contract status".to_string(),
        });
    }

    let contract =
        match soft_get::<Contract, S>(ctx.store, &contract_ref.namespace, &contract_ref.name).await? {
            Ok(contract) => contract,
            Err(message) => {
                return Ok(Prerequisite::Missing {
                    reason: "ContractNotFound",
                    message,
                })
            }
        };

    let cluster_id = contract.spec.peering_target_credentials.cluster_id;
    if cluster_id.is_empty() {
        return Ok(Prerequisite::Missing {
            reason: "MissingPeeringTargetCredentials",
            message: "Contract carries no peering target cluster ID".to_string(),
        });
    }

    Ok(Prerequisite::Ready { cluster_id })
}

/// Drives the `NamespaceOffloading` condition
pub struct OffloadingDriver;

#[async_trait]
impl<S: ObjectStore + ?Sized> PhaseDriver<S> for OffloadingDriver {
    fn condition_type(&self) -> ConditionType {
        ConditionType::NamespaceOffloading
    }

    fn unknown_condition(&self) -> Condition {
        Condition::new(
            ConditionType::NamespaceOffloading,
            ConditionStatus::Unknown,
            "NamespaceOffloadingCreation",
            "NamespaceOffloading is about to start",
        )
    }

    async fn create(&self, ctx: &PhaseContext<'_, S>, intent: &mut Intent) -> Result<Step> {
        let namespace = intent.namespace().unwrap_or_default();

        let condition = match resolve_peering(ctx, &namespace).await? {
            Prerequisite::Missing { reason, message } => {
                debug!(namespace = %namespace, reason = reason, "Offloading prerequisite missing");
                Condition::new(
                    ConditionType::NamespaceOffloading,
                    ConditionStatus::False,
                    reason,
                    message,
                )
            }
            Prerequisite::Ready { cluster_id } => {
                let existing: Option<NamespaceOffloading> =
                    lookup(ctx.store, &namespace, NAMESPACE_OFFLOADING_NAME).await?;

                let mut template =
                    NamespaceOffloading::new(NAMESPACE_OFFLOADING_NAME, NamespaceOffloadingSpec::default());
                template.metadata.namespace = Some(namespace.clone());

                let applied = upsert(ctx.store, existing, template, |offloading: &mut NamespaceOffloading| {
                    apply_namespace_offloading(offloading, &cluster_id);
                    Ok(())
                })
                .await;

                match applied {
                    Ok((offloading, result)) => {
                        info!(
                            namespace = %namespace,
                            cluster_id = %cluster_id,
                            result = result.as_str(),
                            "NamespaceOffloading applied"
                        );
                        created_condition(&offloading, result)
                    }
                    Err(e) => Condition::new(
                        ConditionType::NamespaceOffloading,
                        ConditionStatus::False,
                        "NamespaceOffloadingCreationFailed",
                        e.to_string(),
                    ),
                }
            }
        };

        let status = condition.status;
        ctx.writer.write(intent, condition).await?;
        Ok(Step::from_status(status))
    }

    async fn handle(&self, ctx: &PhaseContext<'_, S>, intent: &mut Intent) -> Result<Step> {
        let namespace = intent.namespace().unwrap_or_default();
        let Some(offloading) =
            lookup::<NamespaceOffloading, S>(ctx.store, &namespace, NAMESPACE_OFFLOADING_NAME).await?
        else {
            debug!(namespace = %namespace, "NamespaceOffloading missing, creating it");
            return <Self as PhaseDriver<S>>::create(self, ctx, intent).await;
        };

        let condition = observed_condition(
            ConditionType::NamespaceOffloading,
            intent.condition(ConditionType::NamespaceOffloading),
            offloading.observed_phase().and_then(offloading_phase_condition),
            "",
            offloading.metadata.generation,
        );
        ctx.writer.write(intent, condition).await?;
        Ok(Step::Continue)
    }
}

fn created_condition(offloading: &NamespaceOffloading, result: OperationResult) -> Condition {
    let condition = match offloading.observed_phase().and_then(offloading_phase_condition) {
        Some((status, reason)) => {
            Condition::new(ConditionType::NamespaceOffloading, status, reason, "")
        }
        None => {
            let (reason, message) = match result {
                OperationResult::Updated => ("NamespaceOffloadingUpdateCompleted", UPDATED_MESSAGE),
                OperationResult::Created | OperationResult::Unchanged => {
                    ("NamespaceOffloadingCreationCompleted", CREATED_MESSAGE)
                }
            };
            Condition::new(
                ConditionType::NamespaceOffloading,
                ConditionStatus::False,
                reason,
                message,
            )
        }
    };
    condition.with_observed_generation(offloading.metadata.generation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_table() {
        assert_eq!(
            offloading_phase_condition(OffloadingPhase::Ready),
            Some((ConditionStatus::True, "Completed"))
        );
        assert_eq!(
            offloading_phase_condition(OffloadingPhase::NoClusterSelected),
            Some((ConditionStatus::False, "NoClusterSelected"))
        );
        assert_eq!(offloading_phase_condition(OffloadingPhase::Unrecognized), None);
    }

    #[test]
    fn test_cluster_selector_pins_remote_cluster() {
        let mut offloading =
            NamespaceOffloading::new(NAMESPACE_OFFLOADING_NAME, NamespaceOffloadingSpec::default());
        apply_namespace_offloading(&mut offloading, "cluster-7f3a");

        assert_eq!(offloading.spec.namespace_mapping_strategy, "DefaultName");
        assert_eq!(offloading.spec.pod_offloading_strategy, "Remote");
        let term = &offloading.spec.cluster_selector.node_selector_terms[0];
        let requirement = &term.match_expressions.as_ref().unwrap()[0];
        assert_eq!(requirement.key, "liqo.io/remote-cluster-id");
        assert_eq!(requirement.operator, "In");
        assert_eq!(requirement.values.as_deref(), Some(&["cluster-7f3a".to_string()][..]));
    }

    #[test]
    fn test_reservation_name() {
        assert_eq!(reservation_name("acme-job42"), "reservation-acme-job42");
    }
}

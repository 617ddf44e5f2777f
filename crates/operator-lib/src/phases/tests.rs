use super::*;
use crate::crd::{
    Contract, ContractSpec, GenericRef, NamespaceOffloading, NamespaceOffloadingSpec,
    NamespaceOffloadingStatus, OffloadingPhase, PeeringCredentials, Reservation, ReservationSpec,
    ReservationStatus, Solver, SolverPhase, SolverPhaseStatus, SolverStatus, WorkloadType,
    NAMESPACE_OFFLOADING_NAME,
};
use crate::store::{MemoryStore, StoreError};
use crate::synth::fixtures::{intent, port};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use std::time::Duration;

const FLUIDOS: &str = "fluidos";
const NS: &str = "acme-job42";

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        steps: 5,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(4),
    }
}

async fn stored_intent(store: &MemoryStore, workload_type: WorkloadType) -> Intent {
    let mut intent = intent(workload_type);
    intent.spec.workload.ports = vec![port(80, true, Some("acme.example.com"))];
    store.create(&intent).await.unwrap()
}

async fn seed_peering(store: &MemoryStore, cluster_id: &str) {
    let mut reservation = Reservation::new(&reservation_name(NS), ReservationSpec::default());
    reservation.metadata.namespace = Some(FLUIDOS.to_string());
    let mut reservation = store.create(&reservation).await.unwrap();
    reservation.status = Some(ReservationStatus {
        contract: GenericRef {
            name: "contract-7f3a".to_string(),
            namespace: FLUIDOS.to_string(),
        },
    });
    store.update_status(&reservation).await.unwrap();

    let mut contract = Contract::new(
        "contract-7f3a",
        ContractSpec {
            peering_target_credentials: PeeringCredentials {
                cluster_id: cluster_id.to_string(),
                cluster_name: None,
            },
        },
    );
    contract.metadata.namespace = Some(FLUIDOS.to_string());
    store.create(&contract).await.unwrap();
}

async fn publish_solver_phase(store: &MemoryStore, phase: SolverPhase, message: &str) {
    let mut solver: Solver = store.get(FLUIDOS, NS).await.unwrap();
    solver.status = Some(SolverStatus {
        solver_phase: SolverPhaseStatus {
            phase: Some(phase),
            message: message.to_string(),
        },
    });
    store.update_status(&solver).await.unwrap();
}

async fn publish_offloading_phase(store: &MemoryStore, phase: OffloadingPhase) {
    let mut offloading: NamespaceOffloading = store.get(NS, NAMESPACE_OFFLOADING_NAME).await.unwrap();
    offloading.status = Some(NamespaceOffloadingStatus {
        offloading_phase: Some(phase),
        remote_namespace_name: None,
    });
    store.update_status(&offloading).await.unwrap();
}

#[test]
fn test_observed_condition_keeps_status_for_unmapped_phase() {
    let current = Condition::new(ConditionType::Solver, ConditionStatus::False, "SolverRunning", "old");

    let condition = observed_condition(ConditionType::Solver, Some(&current), None, "new", Some(3));

    assert_eq!(condition.status, ConditionStatus::False);
    assert_eq!(condition.reason, "SolverRunning");
    assert_eq!(condition.message, "new");
    assert_eq!(condition.observed_generation, Some(3));
}

#[tokio::test]
async fn test_track_unknown_bootstraps_condition() {
    let store = MemoryStore::new();
    let mut intent = stored_intent(&store, WorkloadType::Service).await;
    let ctx = PhaseContext::new(&store, FLUIDOS, fast_policy());

    SolverDriver.track_unknown(&ctx, &mut intent).await.unwrap();

    let stored: Intent = store.get(NS, "job42").await.unwrap();
    let condition = stored.condition(ConditionType::Solver).unwrap();
    assert_eq!(condition.status, ConditionStatus::Unknown);
    assert_eq!(condition.reason, "IntentCreated");
    assert_eq!(intent.metadata.resource_version, stored.metadata.resource_version);
}

#[tokio::test]
async fn test_solver_create_then_handle() {
    let store = MemoryStore::new();
    let mut intent = stored_intent(&store, WorkloadType::Service).await;
    let ctx = PhaseContext::new(&store, FLUIDOS, fast_policy());

    let step = SolverDriver.create(&ctx, &mut intent).await.unwrap();
    assert_eq!(step, Step::Wait);

    let solver: Solver = store.get(FLUIDOS, NS).await.unwrap();
    assert_eq!(solver.spec.intent_id, NS);
    let condition = intent.condition(ConditionType::Solver).unwrap();
    assert_eq!(condition.reason, "SolverCreationCompleted");
    assert_eq!(condition.message, "Solver has been created, waiting for its solving.");

    publish_solver_phase(&store, SolverPhase::Failed, "no matching flavor").await;
    let step = SolverDriver.handle(&ctx, &mut intent).await.unwrap();
    assert_eq!(step, Step::Continue);

    let condition = intent.condition(ConditionType::Solver).unwrap();
    assert_eq!(condition.status, ConditionStatus::False);
    assert_eq!(condition.reason, "SolverFailed");
    assert_eq!(condition.message, "no matching flavor");
    assert_eq!(condition.observed_generation, Some(1));
}

#[tokio::test]
async fn test_solver_create_failure_is_recorded() {
    let store = MemoryStore::new();
    let mut intent = stored_intent(&store, WorkloadType::Service).await;
    let ctx = PhaseContext::new(&store, FLUIDOS, fast_policy());
    store.fail_writes::<Solver>(StoreError::Rejected("admission denied".to_string()));

    let step = SolverDriver.create(&ctx, &mut intent).await.unwrap();

    assert_eq!(step, Step::Wait);
    let condition = intent.condition(ConditionType::Solver).unwrap();
    assert_eq!(condition.status, ConditionStatus::False);
    assert_eq!(condition.reason, "SolverCreationFailed");
    assert!(condition.message.contains("admission denied"));
}

#[tokio::test]
async fn test_solver_lookup_failure_propagates() {
    let store = MemoryStore::new();
    let mut intent = stored_intent(&store, WorkloadType::Service).await;
    let bogus = serde_json::json!({
        "apiVersion": "nodecore.fluidos.eu/v1alpha1",
        "kind": "Solver",
        "metadata": {"name": NS, "namespace": FLUIDOS, "resourceVersion": "1"},
        "spec": {"intentID": 7}
    });
    let ctx = PhaseContext::new(&store, FLUIDOS, fast_policy());

    // A Solver that fails to decode is not "absent"
    store.insert_raw::<Solver>(FLUIDOS, NS, bogus);
    let err = SolverDriver.create(&ctx, &mut intent).await.unwrap_err();

    assert!(matches!(err, crate::error::Error::Store(StoreError::Decode(_))));
    assert!(intent.condition(ConditionType::Solver).is_none());
}

#[tokio::test]
async fn test_offloading_waits_for_reservation() {
    let store = MemoryStore::new();
    let mut intent = stored_intent(&store, WorkloadType::Service).await;
    let ctx = PhaseContext::new(&store, FLUIDOS, fast_policy());

    let step = OffloadingDriver.create(&ctx, &mut intent).await.unwrap();

    assert_eq!(step, Step::Wait);
    let condition = intent.condition(ConditionType::NamespaceOffloading).unwrap();
    assert_eq!(condition.status, ConditionStatus::False);
    assert_eq!(condition.reason, "ReservationNotFound");
    assert_eq!(store.count::<NamespaceOffloading>(), 0);
}

#[tokio::test]
async fn test_offloading_requires_contract_reference() {
    let store = MemoryStore::new();
    let mut intent = stored_intent(&store, WorkloadType::Service).await;
    let mut reservation = Reservation::new(&reservation_name(NS), ReservationSpec::default());
    reservation.metadata.namespace = Some(FLUIDOS.to_string());
    store.create(&reservation).await.unwrap();
    let ctx = PhaseContext::new(&store, FLUIDOS, fast_policy());

    OffloadingDriver.create(&ctx, &mut intent).await.unwrap();

    let condition = intent.condition(ConditionType::NamespaceOffloading).unwrap();
    assert_eq!(condition.reason, "MissingContractReference");
    assert_eq!(condition.message, "Missing Name or Namespace in Contract status");
    assert_eq!(store.count::<NamespaceOffloading>(), 0);
}

#[tokio::test]
async fn test_offloading_requires_peering_credentials() {
    let store = MemoryStore::new();
    let mut intent = stored_intent(&store, WorkloadType::Service).await;
    seed_peering(&store, "").await;
    let ctx = PhaseContext::new(&store, FLUIDOS, fast_policy());

    OffloadingDriver.create(&ctx, &mut intent).await.unwrap();

    let condition = intent.condition(ConditionType::NamespaceOffloading).unwrap();
    assert_eq!(condition.reason, "MissingPeeringTargetCredentials");
    assert_eq!(store.count::<NamespaceOffloading>(), 0);
}

#[tokio::test]
async fn test_offloading_contract_missing() {
    let store = MemoryStore::new();
    let mut intent = stored_intent(&store, WorkloadType::Service).await;
    seed_peering(&store, "cluster-7f3a").await;
    store.delete::<Contract>(FLUIDOS, "contract-7f3a").await.unwrap();
    let ctx = PhaseContext::new(&store, FLUIDOS, fast_policy());

    let step = OffloadingDriver.create(&ctx, &mut intent).await.unwrap();

    assert_eq!(step, Step::Wait);
    let condition = intent.condition(ConditionType::NamespaceOffloading).unwrap();
    assert_eq!(condition.status, ConditionStatus::False);
    assert_eq!(condition.reason, "ContractNotFound");
    assert!(condition.message.contains("contract-7f3a"));
    assert_eq!(store.count::<NamespaceOffloading>(), 0);
}

#[tokio::test]
async fn test_offloading_undecodable_reservation_is_missing() {
    let store = MemoryStore::new();
    let mut intent = stored_intent(&store, WorkloadType::Service).await;
    let name = reservation_name(NS);
    store.insert_raw::<Reservation>(
        FLUIDOS,
        &name,
        serde_json::json!({
            "apiVersion": "reservation.fluidos.eu/v1alpha1",
            "kind": "Reservation",
            "metadata": {"name": name, "namespace": FLUIDOS, "resourceVersion": "1"},
            "spec": "not-an-object"
        }),
    );
    let ctx = PhaseContext::new(&store, FLUIDOS, fast_policy());

    let step = OffloadingDriver.create(&ctx, &mut intent).await.unwrap();

    assert_eq!(step, Step::Wait);
    let condition = intent.condition(ConditionType::NamespaceOffloading).unwrap();
    assert_eq!(condition.status, ConditionStatus::False);
    assert_eq!(condition.reason, "ReservationNotFound");
    assert_eq!(store.count::<NamespaceOffloading>(), 0);
}

#[tokio::test]
async fn test_offloading_create_reports_update_of_stale_object() {
    let store = MemoryStore::new();
    let mut intent = stored_intent(&store, WorkloadType::Service).await;
    seed_peering(&store, "cluster-7f3a").await;
    let mut stale =
        NamespaceOffloading::new(NAMESPACE_OFFLOADING_NAME, NamespaceOffloadingSpec::default());
    stale.metadata.namespace = Some(NS.to_string());
    store.create(&stale).await.unwrap();
    let ctx = PhaseContext::new(&store, FLUIDOS, fast_policy());

    OffloadingDriver.create(&ctx, &mut intent).await.unwrap();

    let condition = intent.condition(ConditionType::NamespaceOffloading).unwrap();
    assert_eq!(condition.status, ConditionStatus::False);
    assert_eq!(condition.reason, "NamespaceOffloadingUpdateCompleted");
    assert_eq!(
        condition.message,
        "NamespaceOffloading has been updated, waiting for its solving."
    );
}

#[tokio::test]
async fn test_offloading_create_and_handle() {
    let store = MemoryStore::new();
    let mut intent = stored_intent(&store, WorkloadType::Service).await;
    seed_peering(&store, "cluster-7f3a").await;
    let ctx = PhaseContext::new(&store, FLUIDOS, fast_policy());

    let step = OffloadingDriver.create(&ctx, &mut intent).await.unwrap();
    assert_eq!(step, Step::Wait);

    let offloading: NamespaceOffloading = store.get(NS, NAMESPACE_OFFLOADING_NAME).await.unwrap();
    let values = offloading.spec.cluster_selector.node_selector_terms[0]
        .match_expressions
        .as_ref()
        .unwrap()[0]
        .values
        .clone();
    assert_eq!(values, Some(vec!["cluster-7f3a".to_string()]));
    let condition = intent.condition(ConditionType::NamespaceOffloading).unwrap();
    assert_eq!(condition.reason, "NamespaceOffloadingCreationCompleted");

    publish_offloading_phase(&store, OffloadingPhase::Ready).await;
    OffloadingDriver.handle(&ctx, &mut intent).await.unwrap();
    let condition = intent.condition(ConditionType::NamespaceOffloading).unwrap();
    assert_eq!(condition.status, ConditionStatus::True);
    assert_eq!(condition.reason, "Completed");

    // A disconnected cluster moves the condition back
    publish_offloading_phase(&store, OffloadingPhase::NoClusterSelected).await;
    OffloadingDriver.handle(&ctx, &mut intent).await.unwrap();
    let condition = intent.condition(ConditionType::NamespaceOffloading).unwrap();
    assert_eq!(condition.status, ConditionStatus::False);
    assert_eq!(condition.reason, "NoClusterSelected");
}

#[tokio::test]
async fn test_deploy_service_workload() {
    let store = MemoryStore::new();
    let mut intent = stored_intent(&store, WorkloadType::Service).await;
    let ctx = PhaseContext::new(&store, FLUIDOS, fast_policy());

    let step = DeployDriver.create(&ctx, &mut intent).await.unwrap();

    assert_eq!(step, Step::Continue);
    assert_eq!(store.count::<Service>(), 1);
    assert_eq!(store.count::<Ingress>(), 1);
    assert_eq!(store.count::<Deployment>(), 1);
    assert_eq!(store.count::<Job>(), 0);

    let deployment: Deployment = store.get(NS, NS).await.unwrap();
    let owner = &deployment.metadata.owner_references.unwrap()[0];
    assert_eq!(owner.kind, "Intent");
    assert_eq!(owner.name, "job42");
    assert_eq!(owner.controller, Some(true));

    let condition = intent.condition(ConditionType::Deploy).unwrap();
    assert_eq!(condition.status, ConditionStatus::True);
    assert_eq!(condition.reason, "KubernetesObjectsHandled");
}

#[tokio::test]
async fn test_deploy_reapply_is_a_noop() {
    let store = MemoryStore::new();
    let mut intent = stored_intent(&store, WorkloadType::Service).await;
    let ctx = PhaseContext::new(&store, FLUIDOS, fast_policy());
    DeployDriver.create(&ctx, &mut intent).await.unwrap();
    let service: Service = store.get(NS, NS).await.unwrap();
    let writes = store.write_count();

    DeployDriver.handle(&ctx, &mut intent).await.unwrap();

    assert_eq!(store.write_count(), writes);
    let again: Service = store.get(NS, NS).await.unwrap();
    assert_eq!(again.metadata.resource_version, service.metadata.resource_version);
}

#[tokio::test]
async fn test_deploy_converges_port_list() {
    let store = MemoryStore::new();
    let mut intent = stored_intent(&store, WorkloadType::Service).await;
    intent.spec.workload.ports.push(port(9090, false, None));
    let ctx = PhaseContext::new(&store, FLUIDOS, fast_policy());
    DeployDriver.create(&ctx, &mut intent).await.unwrap();

    intent.spec.workload.ports = vec![port(8080, true, Some("acme.example.com"))];
    DeployDriver.handle(&ctx, &mut intent).await.unwrap();

    let service: Service = store.get(NS, NS).await.unwrap();
    let ports = service.spec.unwrap().ports.unwrap();
    assert_eq!(ports.len(), 1);
    assert_eq!(ports[0].port, 8080);
    assert_eq!(ports[0].name.as_deref(), Some("tcp-8080"));
}

#[tokio::test]
async fn test_deploy_failure_names_the_kind() {
    let store = MemoryStore::new();
    let mut intent = stored_intent(&store, WorkloadType::Service).await;
    let ctx = PhaseContext::new(&store, FLUIDOS, fast_policy());
    store.fail_writes::<Ingress>(StoreError::Rejected("host already claimed".to_string()));

    let step = DeployDriver.create(&ctx, &mut intent).await.unwrap();

    assert_eq!(step, Step::Wait);
    let condition = intent.condition(ConditionType::Deploy).unwrap();
    assert_eq!(condition.status, ConditionStatus::False);
    assert_eq!(condition.reason, "IngressCreationFailed");
    assert!(condition.message.contains("host already claimed"));
    // The Deployment comes after the Ingress and is skipped this pass
    assert_eq!(store.count::<Service>(), 1);
    assert_eq!(store.count::<Deployment>(), 0);
}

#[tokio::test]
async fn test_deploy_batch_workload_creates_job_only() {
    let store = MemoryStore::new();
    let mut intent = stored_intent(&store, WorkloadType::Batch).await;
    let ctx = PhaseContext::new(&store, FLUIDOS, fast_policy());
    store.fail_writes::<Job>(StoreError::Transport("connection reset".to_string()));

    DeployDriver.create(&ctx, &mut intent).await.unwrap();
    assert_eq!(
        intent.condition(ConditionType::Deploy).unwrap().reason,
        "JobCreationFailed"
    );

    store.clear_failures();
    DeployDriver.handle(&ctx, &mut intent).await.unwrap();

    assert_eq!(store.count::<Job>(), 1);
    assert_eq!(store.count::<Service>(), 0);
    assert_eq!(store.count::<Deployment>(), 0);
    assert_eq!(
        intent.condition_status(ConditionType::Deploy),
        Some(ConditionStatus::True)
    );
}

//! Resources owned by other controllers
//!
//! Only the fields the operator reads or writes are modelled.

use k8s_openapi::api::core::v1::NodeSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Name of the NamespaceOffloading declaration inside an Intent namespace
pub const NAMESPACE_OFFLOADING_NAME: &str = "offloading";

/// Node label carrying the identity of the remote cluster a virtual node maps to
pub const REMOTE_CLUSTER_ID_LABEL: &str = "liqo.io/remote-cluster-id";

/// Flavor type requested from the solver
pub const K8SLICE_FLAVOR_TYPE: &str = "K8Slice";

/// Request to locate, reserve and peer with a remote provider
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "nodecore.fluidos.eu",
    version = "v1alpha1",
    kind = "Solver",
    plural = "solvers",
    namespaced,
    status = "SolverStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct SolverSpec {
    #[serde(rename = "intentID")]
    pub intent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<SolverSelector>,
    #[serde(default)]
    pub find_candidate: bool,
    #[serde(default)]
    pub reserve_and_buy: bool,
    #[serde(default)]
    pub establish_peering: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SolverSelector {
    pub flavor_type: String,
    /// Compiled filter document, opaque to the operator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SolverStatus {
    #[serde(default)]
    pub solver_phase: SolverPhaseStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SolverPhaseStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<SolverPhase>,
    #[serde(default)]
    pub message: String,
}

/// Lifecycle phase published by the solver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum SolverPhase {
    Solved,
    Failed,
    Running,
    Allocating,
    Idle,
    Timeout,
    Active,
    Pending,
    Inactive,
    #[serde(other)]
    Unrecognized,
}

impl Solver {
    pub fn observed_phase(&self) -> Option<SolverPhase> {
        self.status.as_ref().and_then(|s| s.solver_phase.phase)
    }

    pub fn observed_message(&self) -> &str {
        self.status
            .as_ref()
            .map(|s| s.solver_phase.message.as_str())
            .unwrap_or_default()
    }
}

/// Reservation of a remote flavor, completed by the solver with a contract
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "reservation.fluidos.eu",
    version = "v1alpha1",
    kind = "Reservation",
    plural = "reservations",
    namespaced,
    status = "ReservationStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ReservationSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solver_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReservationStatus {
    #[serde(default)]
    pub contract: GenericRef,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GenericRef {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

/// Contract reached with a remote provider
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "reservation.fluidos.eu",
    version = "v1alpha1",
    kind = "Contract",
    plural = "contracts",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ContractSpec {
    #[serde(default)]
    pub peering_target_credentials: PeeringCredentials,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PeeringCredentials {
    #[serde(default, rename = "clusterID")]
    pub cluster_id: String,
    #[serde(default, rename = "clusterName", skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,
}

/// Declaration extending a namespace onto remote clusters
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "offloading.liqo.io",
    version = "v1beta1",
    kind = "NamespaceOffloading",
    plural = "namespaceoffloadings",
    namespaced,
    status = "NamespaceOffloadingStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceOffloadingSpec {
    #[serde(default)]
    pub namespace_mapping_strategy: String,
    #[serde(default)]
    pub pod_offloading_strategy: String,
    #[serde(default)]
    pub cluster_selector: NodeSelector,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceOffloadingStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offloading_phase: Option<OffloadingPhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_namespace_name: Option<String>,
}

/// Aggregate phase published by the offloading system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum OffloadingPhase {
    Ready,
    NoClusterSelected,
    InProgress,
    SomeFailed,
    AllFailed,
    Terminating,
    #[serde(other)]
    Unrecognized,
}

impl NamespaceOffloading {
    pub fn observed_phase(&self) -> Option<OffloadingPhase> {
        self.status.as_ref().and_then(|s| s.offloading_phase)
    }
}

/// Strategy values written into the NamespaceOffloading spec
pub mod strategy {
    pub const DEFAULT_NAME_MAPPING: &str = "DefaultName";
    pub const REMOTE_POD_OFFLOADING: &str = "Remote";
}

//! The Intent custom resource
//!
//! An Intent is the user-declared workload plus the constraints a remote
//! compute provider has to satisfy. Only `status` is mutated by the operator.

use super::conditions::{Condition, ConditionStatus, Conditions, ConditionType};
use super::duration::WorkloadDuration;
use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

/// Desired state of an Intent
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "flare.clastix.io",
    version = "v1alpha1",
    kind = "Intent",
    plural = "intents",
    namespaced,
    status = "IntentStatus",
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp","description":"Time since creation"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct IntentSpec {
    #[serde(default, alias = "contraints")]
    pub constraints: IntentConstraint,
    /// Advisory only, not enforced by the reconciler
    #[serde(default)]
    pub objective: Objective,
    #[serde(default)]
    pub sla: IntentSla,
    pub workload: Workload,
}

/// Observed state of an Intent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IntentStatus {
    #[serde(default, skip_serializing_if = "Conditions::is_empty")]
    pub conditions: Conditions,
}

impl Intent {
    /// Look up the condition recorded for a phase
    pub fn condition(&self, condition_type: ConditionType) -> Option<&Condition> {
        self.status
            .as_ref()
            .and_then(|status| status.conditions.find(condition_type.as_str()))
    }

    /// Status of the condition recorded for a phase, if any
    pub fn condition_status(&self, condition_type: ConditionType) -> Option<ConditionStatus> {
        self.condition(condition_type).map(|c| c.status)
    }

    /// Merge a condition into the status, returning whether anything changed
    pub fn set_condition(&mut self, condition: Condition) -> bool {
        self.status
            .get_or_insert_with(IntentStatus::default)
            .conditions
            .set(condition)
    }

    /// Whether the Intent has been marked for deletion
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}

/// Optimisation objective
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Objective {
    #[default]
    BalancedOptimization,
    PerformanceMaximization,
    CostMinimization,
    LatencyMinimization,
    EnergyEfficiency,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IntentSla {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_strategy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_interruption_time: Option<WorkloadDuration>,
}

/// Placement constraints forwarded to the provider search
///
/// Apart from the resource block these are advisory and carried verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IntentConstraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_hourly_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_total_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
    #[serde(default = "default_max_latency_ms")]
    pub max_latency_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default, rename = "preEmptible")]
    pub preemptible: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub providers: Vec<String>,
    #[serde(default)]
    pub availability: AvailabilityConstraint,
    #[serde(default)]
    pub negotiation: NegotiationConstraint,
    #[serde(default)]
    pub energy: EnergyConstraint,
    #[serde(default)]
    pub compliance: ComplianceConstraint,
    #[serde(default)]
    pub performance: PerformanceConstraint,
    #[serde(default)]
    pub security: SecurityConstraint,
}

impl Default for IntentConstraint {
    fn default() -> Self {
        Self {
            max_hourly_cost: None,
            max_total_cost: None,
            location: None,
            availability_zone: None,
            max_latency_ms: default_max_latency_ms(),
            deadline: None,
            preemptible: false,
            providers: Vec::new(),
            availability: AvailabilityConstraint::default(),
            negotiation: NegotiationConstraint::default(),
            energy: EnergyConstraint::default(),
            compliance: ComplianceConstraint::default(),
            performance: PerformanceConstraint::default(),
            security: SecurityConstraint::default(),
        }
    }
}

fn default_max_latency_ms() -> i64 {
    100
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum DayOfWeek {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum MaintenanceFrequency {
    #[default]
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceWindow {
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub frequency: MaintenanceFrequency,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityConstraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_end: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub days_of_week: Vec<DayOfWeek>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blackout_dates: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub maintenance_windows: Vec<MaintenanceWindow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct NegotiationConstraint {
    pub max_negotiation_rounds: u32,
    pub price_flexibility: f64,
    pub resource_flexibility: f64,
    pub timeout_seconds: i64,
    pub fallback_strategy: String,
    pub auto_accept_threshold: f64,
}

impl Default for NegotiationConstraint {
    fn default() -> Self {
        Self {
            max_negotiation_rounds: 3,
            price_flexibility: 0.15,
            resource_flexibility: 0.3,
            timeout_seconds: 300,
            fallback_strategy: "queue".to_string(),
            auto_accept_threshold: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnergyConstraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_carbon_footprint: Option<String>,
    #[serde(default)]
    pub renewable_energy_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_efficiency_rating: Option<String>,
    #[serde(default = "default_power_usage_effectiveness")]
    pub power_usage_effectiveness: f32,
    #[serde(default)]
    pub green_certified_only: bool,
}

impl Default for EnergyConstraint {
    fn default() -> Self {
        Self {
            max_carbon_footprint: None,
            renewable_energy_only: false,
            energy_efficiency_rating: None,
            power_usage_effectiveness: default_power_usage_effectiveness(),
            green_certified_only: false,
        }
    }
}

fn default_power_usage_effectiveness() -> f32 {
    2.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Certification {
    #[serde(rename = "ISO27001")]
    Iso27001,
    #[serde(rename = "SOC2")]
    Soc2,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceConstraint {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_residency: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certifications: Vec<Certification>,
    #[serde(default)]
    pub encryption_at_rest: bool,
    #[serde(default)]
    pub encryption_in_transit: bool,
    #[serde(default)]
    pub audit_logging: bool,
    #[serde(default, rename = "gdprCompliant")]
    pub gdpr_compliant: bool,
    #[serde(default, rename = "hippaCompliant", alias = "hipaaCompliant")]
    pub hipaa_compliant: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct PerformanceConstraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_network_bandwidth: Option<Quantity>,
    pub max_jitter_ms: i64,
    pub min_uptime_percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cold_start_time: Option<WorkloadDuration>,
    pub gpu_utilization_target: f64,
    pub memory_utilization_target: f64,
}

impl Default for PerformanceConstraint {
    fn default() -> Self {
        Self {
            min_network_bandwidth: None,
            max_jitter_ms: 50,
            min_uptime_percent: 99.0,
            max_cold_start_time: None,
            gpu_utilization_target: 0.80,
            memory_utilization_target: 0.80,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum NetworkIsolation {
    #[default]
    Public,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum FirewallAction {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FirewallRule {
    pub port: i32,
    pub protocol: String,
    pub source: String,
    pub action: FirewallAction,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecurityConstraint {
    #[serde(default)]
    pub network_isolation: NetworkIsolation,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub firewall_rules: Vec<FirewallRule>,
    #[serde(default)]
    pub vpn_access: bool,
    #[serde(default)]
    pub bastion_host: bool,
    #[serde(default)]
    pub intrusion_detection: bool,
    #[serde(default)]
    pub vulnerability_scanning: bool,
}

/// Kind of runtime objects an Intent materialises into
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum WorkloadType {
    #[default]
    Service,
    Batch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum CommunicationPattern {
    AllReduce,
    Independent,
    Pipeline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum DeploymentStrategy {
    Colocated,
    Distributed,
    Flexible,
}

/// The container workload to run on the selected provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Workload {
    #[serde(rename = "type")]
    pub workload_type: WorkloadType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub communication_pattern: Option<CommunicationPattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_strategy: Option<DeploymentStrategy>,
    #[serde(default)]
    pub batch: BatchPolicy,
    pub name: String,
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<String>,
    /// Literal `KEY=VALUE` entries
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<WorkloadSecret>,
    #[serde(default)]
    pub storage: WorkloadStorage,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<WorkloadPort>,
    /// Accepted but not enforced: Deployments always run one replica
    #[serde(default)]
    pub scaling: WorkloadScaling,
    #[serde(default)]
    pub resources: WorkloadResources,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum CompletionPolicy {
    All,
    Any,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_policy: Option<CompletionPolicy>,
    #[serde(default = "default_max_retries")]
    pub max_retries: i32,
    #[serde(default = "default_parallel_tasks")]
    pub parallel_tasks: i32,
    #[serde(default = "default_batch_timeout")]
    pub timeout: WorkloadDuration,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            completion_policy: None,
            max_retries: default_max_retries(),
            parallel_tasks: default_parallel_tasks(),
            timeout: default_batch_timeout(),
        }
    }
}

fn default_max_retries() -> i32 {
    3
}

fn default_parallel_tasks() -> i32 {
    1
}

fn default_batch_timeout() -> WorkloadDuration {
    WorkloadDuration::from_secs(3600)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkloadScaling {
    #[serde(default)]
    pub auto_scale: bool,
    pub max_replicas: i32,
    pub min_replicas: i32,
    #[serde(rename = "targetCPUPercent")]
    pub target_cpu_percent: i32,
    #[serde(rename = "targetGPUPercent")]
    pub target_gpu_percent: i32,
}

impl Default for WorkloadScaling {
    fn default() -> Self {
        Self {
            auto_scale: false,
            max_replicas: 10,
            min_replicas: 1,
            target_cpu_percent: 70,
            target_gpu_percent: 80,
        }
    }
}

/// A key of the Intent's Secret injected as an environment variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct WorkloadSecret {
    /// Key inside the Secret named after the Intent
    pub name: String,
    /// Environment variable receiving the value
    pub env: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum StorageSourceType {
    S3,
    #[serde(rename = "GCS")]
    Gcs,
    Azure,
}

impl StorageSourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageSourceType::S3 => "S3",
            StorageSourceType::Gcs => "GCS",
            StorageSourceType::Azure => "Azure",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageVolumeSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub source_type: Option<StorageSourceType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum VolumeType {
    Persistent,
    Temporary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageVolume {
    pub name: String,
    pub path: String,
    pub size: Quantity,
    #[serde(default)]
    pub source: StorageVolumeSource,
    #[serde(rename = "type")]
    pub volume_type: VolumeType,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WorkloadStorage {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<StorageVolume>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum PortProtocol {
    #[default]
    #[serde(rename = "TCP")]
    Tcp,
    #[serde(rename = "UDP")]
    Udp,
}

impl PortProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortProtocol::Tcp => "TCP",
            PortProtocol::Udp => "UDP",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadPort {
    pub port: i32,
    #[serde(default)]
    pub protocol: PortProtocol,
    #[serde(default)]
    pub expose: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadResources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<Quantity>,
    #[serde(default)]
    pub gpu: GpuRequirements,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum GpuTopology {
    AllToAll,
    #[serde(alias = "Nvswitch")]
    NvSwitch,
    Ring,
    Mesh,
}

impl GpuTopology {
    pub fn as_str(&self) -> &'static str {
        match self {
            GpuTopology::AllToAll => "AllToAll",
            GpuTopology::NvSwitch => "NvSwitch",
            GpuTopology::Ring => "Ring",
            GpuTopology::Mesh => "Mesh",
        }
    }
}

/// GPU requirements
///
/// Every field is optional; an absent field places no constraint on the
/// provider search. On the wire, string fields holding `"Any"` or `""` are
/// read as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GpuRequirements {
    #[serde(default, deserialize_with = "any_as_none", skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_min: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_max: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cores_min: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cores_max: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clock_speed_min: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clock_speed_max: Option<Quantity>,
    #[serde(default, deserialize_with = "any_as_none", skip_serializing_if = "Option::is_none")]
    pub compute_capability: Option<String>,
    #[serde(default, deserialize_with = "any_as_none", skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    #[serde(default, deserialize_with = "any_as_none", skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared: Option<bool>,
    #[serde(default, deserialize_with = "any_as_none", skip_serializing_if = "Option::is_none")]
    pub interconnect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interruptible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_instance: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedicated: Option<bool>,
    #[serde(default, rename = "fp32TFlops", skip_serializing_if = "Option::is_none")]
    pub fp32_tflops: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topology: Option<GpuTopology>,
    #[serde(default, rename = "multiGPUEfficiency", skip_serializing_if = "Option::is_none")]
    pub multi_gpu_efficiency: Option<f64>,
}

fn any_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("any")))
}

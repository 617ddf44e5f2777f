//! Operator library for Flare Intents
//!
//! This crate provides the core functionality for:
//! - Intent and foreign resource definitions
//! - Compiling resource constraints into solver filters
//! - Synthesizing runtime objects from a workload
//! - Driving an Intent through its Solver, NamespaceOffloading and Deploy phases
//! - Routing watch events back to Intents
//! - Health checks and observability

pub mod controller;
pub mod crd;
pub mod error;
pub mod health;
pub mod observability;
pub mod phases;
pub mod reclaim;
pub mod reconciler;
pub mod router;
pub mod selector;
pub mod store;
pub mod synth;

pub use controller::{run_controller, ControllerConfig};
pub use crd::{Condition, ConditionStatus, ConditionType, Intent, IntentSpec, IntentStatus};
pub use error::{Error, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use observability::{OperatorMetrics, StructuredLogger};
pub use reclaim::{reclaim_external_resources, Reclaimed};
pub use reconciler::{ReconcileOutcome, Reconciler, ReconcilerConfig};
pub use store::{KubeStore, MemoryStore, ObjectStore, RetryPolicy, StoreError};

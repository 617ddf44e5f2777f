//! Object synthesizer
//!
//! Pure mutations from an Intent's workload onto the runtime objects it
//! materialises into. Every mutation works in place on the object read
//! back from the store so that fields defaulted by the API server are
//! left alone and re-applying the same Intent changes nothing.

mod pod_template;
mod service;
mod workload;

pub use pod_template::{apply_pod_template, parse_env};
pub use service::{apply_ingress, apply_service, exposed_ports, service_port_name};
pub use workload::{apply_deployment, apply_job};

use crate::crd::{Intent, WorkloadType};
use crate::error::{Error, Result};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};
use serde::Serialize;
use std::collections::BTreeMap;

/// Label selecting the pods of an Intent
pub const INTENT_LABEL: &str = "intent";

/// Namespace the Intent lives in, which also names its runtime objects
pub fn object_name(intent: &Intent) -> String {
    intent.namespace().unwrap_or_default()
}

/// Metadata of a runtime object owned by the Intent, before any mutation
pub fn object_meta(intent: &Intent) -> ObjectMeta {
    let name = object_name(intent);
    ObjectMeta {
        name: Some(name.clone()),
        namespace: Some(name),
        ..Default::default()
    }
}

pub(crate) fn intent_labels(intent: &Intent) -> BTreeMap<String, String> {
    BTreeMap::from([(INTENT_LABEL.to_string(), intent.name_any())])
}

/// Point the object at its owning Intent
///
/// An existing reference to the same Intent is replaced, any other owner is
/// kept untouched.
pub fn set_owner(meta: &mut ObjectMeta, intent: &Intent) -> Result<()> {
    let owner = intent
        .controller_owner_ref(&())
        .ok_or(Error::MissingField {
            kind: "Intent",
            field: "metadata.uid",
        })?;

    let refs = meta.owner_references.get_or_insert_with(Vec::new);
    match refs.iter_mut().find(|r| r.uid == owner.uid) {
        Some(existing) if *existing == owner => {}
        Some(existing) => *existing = owner,
        None => refs.push(owner),
    }
    Ok(())
}

/// Full set of runtime objects an Intent materialises into
#[derive(Debug, Clone, Default, Serialize)]
pub struct RuntimeObjects {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<Service>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingress: Option<Ingress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment: Option<Deployment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<Job>,
}

impl RuntimeObjects {
    pub fn len(&self) -> usize {
        [
            self.service.is_some(),
            self.ingress.is_some(),
            self.deployment.is_some(),
            self.job.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Whether a Service is part of the object set
pub fn wants_service(intent: &Intent) -> bool {
    intent.spec.workload.workload_type == WorkloadType::Service && !intent.spec.workload.ports.is_empty()
}

/// Whether an Ingress is part of the object set
pub fn wants_ingress(intent: &Intent) -> bool {
    intent.spec.workload.workload_type == WorkloadType::Service && !exposed_ports(intent).is_empty()
}

/// Render the desired objects from scratch, without owner references
///
/// Used for offline previews; the deploy phase applies the same mutations
/// to the objects it reads back from the store.
pub fn render(intent: &Intent) -> RuntimeObjects {
    let mut objects = RuntimeObjects::default();

    match intent.spec.workload.workload_type {
        WorkloadType::Service => {
            if wants_service(intent) {
                let mut service = Service {
                    metadata: object_meta(intent),
                    ..Default::default()
                };
                apply_service(&mut service, intent);
                objects.service = Some(service);
            }
            if wants_ingress(intent) {
                let mut ingress = Ingress {
                    metadata: object_meta(intent),
                    ..Default::default()
                };
                apply_ingress(&mut ingress, intent);
                objects.ingress = Some(ingress);
            }
            let mut deployment = Deployment {
                metadata: object_meta(intent),
                ..Default::default()
            };
            apply_deployment(&mut deployment, intent);
            objects.deployment = Some(deployment);
        }
        WorkloadType::Batch => {
            let mut job = Job {
                metadata: object_meta(intent),
                ..Default::default()
            };
            apply_job(&mut job, intent);
            objects.job = Some(job);
        }
    }

    objects
}


#[cfg(test)]
mod tests {
    use super::fixtures::{intent, port};
    use super::*;

    #[test]
    fn test_service_workload_renders_service_ingress_deployment() {
        let mut intent = intent(WorkloadType::Service);
        intent.spec.workload.ports = vec![port(80, true, Some("acme.example.com")), port(9090, false, None)];

        let objects = render(&intent);

        assert_eq!(objects.len(), 3);
        assert!(objects.job.is_none());
        let service = objects.service.unwrap();
        assert_eq!(service.metadata.name.as_deref(), Some("acme-job42"));
        assert_eq!(service.metadata.namespace.as_deref(), Some("acme-job42"));
    }

    #[test]
    fn test_service_workload_without_ports_renders_only_deployment() {
        let objects = render(&intent(WorkloadType::Service));
        assert_eq!(objects.len(), 1);
        assert!(objects.deployment.is_some());
    }

    #[test]
    fn test_batch_workload_renders_only_job() {
        let mut intent = intent(WorkloadType::Batch);
        intent.spec.workload.ports = vec![port(80, true, None)];

        let objects = render(&intent);

        assert_eq!(objects.len(), 1);
        assert!(objects.job.is_some());
    }

    #[test]
    fn test_set_owner_is_idempotent() {
        let intent = intent(WorkloadType::Service);
        let mut meta = object_meta(&intent);

        set_owner(&mut meta, &intent).unwrap();
        let first = meta.clone();
        set_owner(&mut meta, &intent).unwrap();

        assert_eq!(meta, first);
        let refs = meta.owner_references.unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].kind, "Intent");
        assert_eq!(refs[0].name, "job42");
        assert_eq!(refs[0].controller, Some(true));
    }

    #[test]
    fn test_set_owner_requires_uid() {
        let mut intent = intent(WorkloadType::Service);
        intent.metadata.uid = None;
        let mut meta = object_meta(&intent);

        let err = set_owner(&mut meta, &intent).unwrap_err();
        assert!(matches!(err, Error::MissingField { field: "metadata.uid", .. }));
    }
}

//! Event routing from watched objects back to the owning Intent
//!
//! An Intent named `name` for tenant `tenant` lives in namespace
//! `<tenant>-<name>`, and that namespace names every object created on its
//! behalf. Watch events on those objects are decoded back to the Intent's
//! `(namespace, name)` key here.

use crate::crd::{Intent, NamespaceOffloading, Solver};
use kube::runtime::reflector::ObjectRef;
use kube::{Resource, ResourceExt};

/// Namespace an Intent is created in
pub fn intent_namespace(tenant: &str, name: &str) -> String {
    format!("{}-{}", tenant, name)
}

/// Decode an Intent namespace into the Intent's key
///
/// Only `<tenant>-<name>` with both parts non-empty decodes; anything else
/// is not an Intent namespace.
pub fn intent_key_for_namespace(namespace: &str) -> Option<(String, String)> {
    let mut parts = namespace.split('-');
    let (tenant, name) = (parts.next()?, parts.next()?);
    if parts.next().is_some() || tenant.is_empty() || name.is_empty() {
        return None;
    }
    Some((namespace.to_string(), name.to_string()))
}

fn object_ref(key: (String, String)) -> ObjectRef<Intent> {
    let (namespace, name) = key;
    ObjectRef::new(&name).within(&namespace)
}

/// Intent to reconcile for a Solver event; Solvers are named by Intent namespace
pub fn intent_for_solver(solver: &Solver) -> Option<ObjectRef<Intent>> {
    intent_key_for_namespace(&solver.name_any()).map(object_ref)
}

/// Intent to reconcile for a NamespaceOffloading event
pub fn intent_for_offloading(offloading: &NamespaceOffloading) -> Option<ObjectRef<Intent>> {
    intent_key_for_namespace(&offloading.namespace()?).map(object_ref)
}

/// Intent controlling a runtime object, through its controller owner reference
pub fn intent_for_owned<K: Resource>(obj: &K) -> Option<ObjectRef<Intent>> {
    let namespace = obj.meta().namespace.as_deref()?;
    obj.owner_references()
        .iter()
        .find(|owner| {
            owner.controller == Some(true)
                && owner.kind == Intent::kind(&())
                && owner.api_version == Intent::api_version(&())
        })
        .map(|owner| ObjectRef::new(&owner.name).within(namespace))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{NamespaceOffloadingSpec, SolverSpec};
    use k8s_openapi::api::core::v1::Service;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

    #[test]
    fn test_namespace_round_trip() {
        let namespace = intent_namespace("acme", "job42");

        assert_eq!(namespace, "acme-job42");
        assert_eq!(
            intent_key_for_namespace(&namespace),
            Some(("acme-job42".to_string(), "job42".to_string()))
        );
    }

    #[test]
    fn test_undecodable_namespaces_are_dropped() {
        for namespace in ["fluidos", "acme-", "-job42", "acme-team-job42", ""] {
            assert_eq!(intent_key_for_namespace(namespace), None, "{}", namespace);
        }
    }

    #[test]
    fn test_solver_maps_by_name() {
        let mut solver = Solver::new("acme-job42", SolverSpec::default());
        solver.metadata.namespace = Some("fluidos".to_string());

        let target = intent_for_solver(&solver).unwrap();

        assert_eq!(target.name, "job42");
        assert_eq!(target.namespace.as_deref(), Some("acme-job42"));
    }

    #[test]
    fn test_offloading_maps_by_namespace() {
        let mut offloading = NamespaceOffloading::new("offloading", NamespaceOffloadingSpec::default());
        assert!(intent_for_offloading(&offloading).is_none());

        offloading.metadata.namespace = Some("acme-job42".to_string());
        let target = intent_for_offloading(&offloading).unwrap();
        assert_eq!(target.name, "job42");

        offloading.metadata.namespace = Some("liqo-tenant-x".to_string());
        assert!(intent_for_offloading(&offloading).is_none());
    }

    #[test]
    fn test_owned_objects_map_through_controller_reference() {
        let mut service = Service::default();
        service.metadata.namespace = Some("acme-job42".to_string());
        service.metadata.owner_references = Some(vec![OwnerReference {
            api_version: "flare.clastix.io/v1alpha1".to_string(),
            kind: "Intent".to_string(),
            name: "job42".to_string(),
            uid: "uid-1".to_string(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }]);

        let target = intent_for_owned(&service).unwrap();
        assert_eq!(target.name, "job42");
        assert_eq!(target.namespace.as_deref(), Some("acme-job42"));

        service.metadata.owner_references.as_mut().unwrap()[0].controller = Some(false);
        assert!(intent_for_owned(&service).is_none());
    }
}

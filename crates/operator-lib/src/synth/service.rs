//! Service and Ingress for Service workloads

use super::{intent_labels, object_name};
use crate::crd::{Intent, WorkloadPort};
use k8s_openapi::api::core::v1::{Service, ServicePort};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

/// Port name derived from protocol and number, e.g. `tcp-80`
pub fn service_port_name(port: &WorkloadPort) -> String {
    format!("{}-{}", port.protocol.as_str().to_lowercase(), port.port)
}

/// Ports flagged for external exposure, in declaration order
pub fn exposed_ports(intent: &Intent) -> Vec<&WorkloadPort> {
    intent
        .spec
        .workload
        .ports
        .iter()
        .filter(|p| p.expose)
        .collect()
}

/// Converge a ClusterIP Service onto the declared ports
pub fn apply_service(service: &mut Service, intent: &Intent) {
    let declared = &intent.spec.workload.ports;
    let spec = service.spec.get_or_insert_with(Default::default);

    spec.type_ = Some("ClusterIP".to_string());
    spec.selector = Some(intent_labels(intent));

    let ports = spec.ports.get_or_insert_with(Vec::new);
    if ports.len() != declared.len() {
        *ports = vec![ServicePort::default(); declared.len()];
    }
    for (slot, port) in ports.iter_mut().zip(declared) {
        slot.name = Some(service_port_name(port));
        slot.protocol = Some(port.protocol.as_str().to_string());
        slot.port = port.port;
        slot.target_port = Some(IntOrString::Int(port.port));
    }
}

/// Converge an Ingress onto the exposed ports, one rule per port
pub fn apply_ingress(ingress: &mut Ingress, intent: &Intent) {
    let exposed = exposed_ports(intent);
    let backend_service = object_name(intent);
    let spec = ingress.spec.get_or_insert_with(Default::default);

    let rules = spec.rules.get_or_insert_with(Vec::new);
    if rules.len() != exposed.len() {
        *rules = vec![IngressRule::default(); exposed.len()];
    }
    for (rule, port) in rules.iter_mut().zip(exposed) {
        rule.host = port.domain.clone();
        rule.http = Some(HTTPIngressRuleValue {
            paths: vec![HTTPIngressPath {
                path: Some("/".to_string()),
                path_type: "Prefix".to_string(),
                backend: IngressBackend {
                    resource: None,
                    service: Some(IngressServiceBackend {
                        name: backend_service.clone(),
                        port: Some(ServiceBackendPort {
                            name: None,
                            number: Some(port.port),
                        }),
                    }),
                },
            }],
        });
    }
}

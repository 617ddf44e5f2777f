//! Deployments and Jobs

use super::{apply_pod_template, intent_labels};
use crate::crd::{CompletionPolicy, Intent};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

/// Converge a single-replica Deployment onto the workload
pub fn apply_deployment(deployment: &mut Deployment, intent: &Intent) {
    let spec = deployment.spec.get_or_insert_with(Default::default);

    spec.replicas = Some(1);
    spec.selector = LabelSelector {
        match_labels: Some(intent_labels(intent)),
        match_expressions: None,
    };
    apply_pod_template(&mut spec.template, intent);
}

/// Converge a Job onto the workload's batch policy
///
/// The selector is left to the API server, which also stamps its own labels
/// onto the pod template.
pub fn apply_job(job: &mut Job, intent: &Intent) {
    let batch = &intent.spec.workload.batch;
    let spec = job.spec.get_or_insert_with(Default::default);

    spec.backoff_limit = Some(batch.max_retries);
    spec.parallelism = Some(batch.parallel_tasks);
    spec.active_deadline_seconds = Some(batch.timeout.as_secs() as i64);
    spec.completions = match batch.completion_policy {
        Some(CompletionPolicy::All) => Some(batch.parallel_tasks),
        _ => None,
    };

    apply_pod_template(&mut spec.template, intent);
    if let Some(pod) = spec.template.spec.as_mut() {
        pod.restart_policy = Some("Never".to_string());
    }
}

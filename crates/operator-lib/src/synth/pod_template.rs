//! Pod template shared by Deployments and Jobs

use super::INTENT_LABEL;
use crate::crd::{Intent, StorageVolume, VolumeType};
use k8s_openapi::api::core::v1::{
    CSIVolumeSource, Container, EmptyDirVolumeSource, EnvVar, EnvVarSource, LocalObjectReference,
    PodTemplateSpec, SecretKeySelector, Volume, VolumeMount,
};
use kube::ResourceExt;
use std::collections::BTreeMap;

/// Split literal `KEY=VALUE` entries on the first `=`
///
/// An entry without `=` yields an empty value.
pub fn parse_env(entries: &[String]) -> Vec<(String, String)> {
    entries
        .iter()
        .map(|entry| match entry.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (entry.clone(), String::new()),
        })
        .collect()
}

/// Converge a pod template onto the Intent's workload
pub fn apply_pod_template(template: &mut PodTemplateSpec, intent: &Intent) {
    let workload = &intent.spec.workload;

    let metadata = template.metadata.get_or_insert_with(Default::default);
    let labels = metadata.labels.get_or_insert_with(BTreeMap::new);
    labels.insert(INTENT_LABEL.to_string(), intent.name_any());

    let spec = template.spec.get_or_insert_with(Default::default);
    if spec.containers.len() != 1 {
        spec.containers = vec![Container::default()];
    }

    let container = &mut spec.containers[0];
    container.name = workload.name.clone();
    container.image = Some(workload.image.clone());
    container.command = non_empty(workload.commands.clone());
    container.env = non_empty(env_vars(intent));

    let volumes = &workload.storage.volumes;
    let mounts = container.volume_mounts.get_or_insert_with(Vec::new);
    if mounts.len() != volumes.len() {
        *mounts = vec![VolumeMount::default(); volumes.len()];
    }
    for (mount, volume) in mounts.iter_mut().zip(volumes) {
        mount.name = volume.name.clone();
        mount.mount_path = volume.path.clone();
    }
    if mounts.is_empty() {
        container.volume_mounts = None;
    }

    spec.volumes = non_empty(volumes.iter().map(pod_volume).collect());
}

/// Literal entries first, then one secret reference per declared secret
fn env_vars(intent: &Intent) -> Vec<EnvVar> {
    let workload = &intent.spec.workload;
    let mut vars: Vec<EnvVar> = parse_env(&workload.env)
        .into_iter()
        .map(|(name, value)| EnvVar {
            name,
            value: (!value.is_empty()).then_some(value),
            value_from: None,
        })
        .collect();

    vars.extend(workload.secrets.iter().map(|secret| EnvVar {
        name: secret.env.clone(),
        value: None,
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: Some(intent.name_any()),
                key: secret.name.clone(),
                optional: None,
            }),
            ..Default::default()
        }),
    }));

    vars
}

fn pod_volume(volume: &StorageVolume) -> Volume {
    let mut pod_volume = Volume {
        name: volume.name.clone(),
        ..Default::default()
    };

    match volume.volume_type {
        VolumeType::Temporary => {
            pod_volume.empty_dir = Some(EmptyDirVolumeSource {
                medium: None,
                size_limit: Some(volume.size.clone()),
            });
        }
        VolumeType::Persistent => {
            let source = &volume.source;
            pod_volume.csi = Some(CSIVolumeSource {
                driver: source
                    .source_type
                    .map(|t| t.as_str().to_string())
                    .unwrap_or_default(),
                volume_attributes: Some(BTreeMap::from([(
                    "uri".to_string(),
                    source.uri.clone().unwrap_or_default(),
                )])),
                node_publish_secret_ref: source
                    .credentials
                    .clone()
                    .map(|name| LocalObjectReference { name: Some(name) }),
                ..Default::default()
            });
        }
    }

    pod_volume
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    (!items.is_empty()).then_some(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{StorageSourceType, StorageVolumeSource, WorkloadSecret, WorkloadType};
    use crate::synth::fixtures::intent;
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

    fn container(template: &PodTemplateSpec) -> &Container {
        &template.spec.as_ref().unwrap().containers[0]
    }

    #[test]
    fn test_parse_env_splits_on_first_equals() {
        let parsed = parse_env(&[
            "MODE=prod".to_string(),
            "URL=postgres://u:p@db/x?a=b".to_string(),
            "FLAG".to_string(),
        ]);

        assert_eq!(parsed[0], ("MODE".to_string(), "prod".to_string()));
        assert_eq!(parsed[1], ("URL".to_string(), "postgres://u:p@db/x?a=b".to_string()));
        assert_eq!(parsed[2], ("FLAG".to_string(), String::new()));
    }

    #[test]
    fn test_env_literals_precede_secret_references() {
        let mut intent = intent(WorkloadType::Service);
        intent.spec.workload.env = vec!["MODE=prod".to_string(), "EMPTY".to_string()];
        intent.spec.workload.secrets = vec![WorkloadSecret {
            name: "api-token".to_string(),
            env: "API_TOKEN".to_string(),
        }];

        let mut template = PodTemplateSpec::default();
        apply_pod_template(&mut template, &intent);

        let env = container(&template).env.as_ref().unwrap();
        assert_eq!(env.len(), 3);
        assert_eq!(env[0].name, "MODE");
        assert_eq!(env[0].value.as_deref(), Some("prod"));
        assert_eq!(env[1].name, "EMPTY");
        assert_eq!(env[1].value.clone().unwrap_or_default(), "");
        assert_eq!(env[2].name, "API_TOKEN");
        let secret_ref = env[2]
            .value_from
            .as_ref()
            .and_then(|v| v.secret_key_ref.as_ref())
            .unwrap();
        assert_eq!(secret_ref.name.as_deref(), Some("job42"));
        assert_eq!(secret_ref.key, "api-token");
    }

    #[test]
    fn test_container_identity_and_labels() {
        let mut intent = intent(WorkloadType::Service);
        intent.spec.workload.commands = vec!["nginx".to_string(), "-g".to_string()];

        let mut template = PodTemplateSpec::default();
        apply_pod_template(&mut template, &intent);

        let c = container(&template);
        assert_eq!(c.name, "web");
        assert_eq!(c.image.as_deref(), Some("nginx:1.25"));
        assert_eq!(c.command.as_ref().unwrap(), &vec!["nginx".to_string(), "-g".to_string()]);
        let labels = template.metadata.as_ref().unwrap().labels.as_ref().unwrap();
        assert_eq!(labels.get(INTENT_LABEL).map(String::as_str), Some("job42"));
    }

    #[test]
    fn test_volume_kinds() {
        let mut intent = intent(WorkloadType::Batch);
        intent.spec.workload.storage.volumes = vec![
            StorageVolume {
                name: "scratch".to_string(),
                path: "/tmp/scratch".to_string(),
                size: Quantity("1Gi".to_string()),
                source: StorageVolumeSource::default(),
                volume_type: VolumeType::Temporary,
            },
            StorageVolume {
                name: "dataset".to_string(),
                path: "/data".to_string(),
                size: Quantity("100Gi".to_string()),
                source: StorageVolumeSource {
                    credentials: Some("s3-creds".to_string()),
                    source_type: Some(StorageSourceType::S3),
                    uri: Some("s3://bucket/train".to_string()),
                },
                volume_type: VolumeType::Persistent,
            },
        ];

        let mut template = PodTemplateSpec::default();
        apply_pod_template(&mut template, &intent);

        let volumes = template.spec.as_ref().unwrap().volumes.as_ref().unwrap();
        assert_eq!(volumes.len(), 2);
        let scratch = volumes[0].empty_dir.as_ref().unwrap();
        assert_eq!(scratch.size_limit, Some(Quantity("1Gi".to_string())));
        assert!(volumes[0].csi.is_none());

        let csi = volumes[1].csi.as_ref().unwrap();
        assert_eq!(csi.driver, "S3");
        assert_eq!(
            csi.volume_attributes.as_ref().unwrap().get("uri").map(String::as_str),
            Some("s3://bucket/train")
        );
        assert_eq!(
            csi.node_publish_secret_ref.as_ref().unwrap().name.as_deref(),
            Some("s3-creds")
        );

        let mounts = container(&template).volume_mounts.as_ref().unwrap();
        assert_eq!(mounts[1].name, "dataset");
        assert_eq!(mounts[1].mount_path, "/data");
    }

    #[test]
    fn test_reapply_drops_stale_volumes_and_keeps_defaults() {
        let mut intent = intent(WorkloadType::Service);
        intent.spec.workload.storage.volumes = vec![StorageVolume {
            name: "scratch".to_string(),
            path: "/tmp".to_string(),
            size: Quantity("1Gi".to_string()),
            source: StorageVolumeSource::default(),
            volume_type: VolumeType::Temporary,
        }];

        let mut template = PodTemplateSpec::default();
        apply_pod_template(&mut template, &intent);
        template.spec.as_mut().unwrap().containers[0].image_pull_policy =
            Some("IfNotPresent".to_string());

        intent.spec.workload.storage.volumes.clear();
        apply_pod_template(&mut template, &intent);

        let spec = template.spec.as_ref().unwrap();
        assert!(spec.volumes.is_none());
        assert!(spec.containers[0].volume_mounts.is_none());
        assert_eq!(spec.containers[0].image_pull_policy.as_deref(), Some("IfNotPresent"));
    }
}

//! Launcher-provider realization (§4.3 "For launcher providers").

use k8s_openapi::api::core::v1::{
    Affinity, HTTPGetAction, NodeAffinity, NodeSelector, NodeSelectorRequirement,
    NodeSelectorTerm, Pod, PodTemplateSpec, Probe,
};
use models::binding::BindingContext;
use models::srp::STUB_CONTAINER_NAME;
use models::{annotations, labels};

use crate::error::RealizerError;
use crate::nominal_hash;

const HOSTNAME_LABEL: &str = "kubernetes.io/hostname";

/// Volume name prefix used by the per-pod API-access projection this
/// system never wants on a shared launcher pod (removed in step 2 below).
const API_ACCESS_VOLUME_PREFIX: &str = "kube-api-access";

/// 1. Start from `LauncherConfig.podTemplate`.
/// 2. De-individualize: remove ephemeral containers and the per-pod
///    API-access volume and its mounts.
/// 3. Apply the same label set (§6) and pin to node.
/// 4. Set a fixed liveness probe (`/health` on the inference server's port).
/// 5. Compute a nominal hash over the realized pod JSON plus
///    `;gpus=all;node=<nodeName>`; store as an annotation.
pub fn realize_launcher(
    template: &PodTemplateSpec,
    ctx: &BindingContext,
    launcher_config_name: &str,
    inference_port: i32,
) -> Result<Pod, RealizerError> {
    let mut pod = Pod {
        metadata: template.metadata.clone().unwrap_or_default(),
        spec: template.spec.clone(),
        status: None,
    };

    de_individualize(&mut pod);
    apply_launcher_labels(&mut pod, ctx, launcher_config_name);
    pin_to_node(&mut pod, &ctx.node_name);
    set_liveness_probe(&mut pod, inference_port)?;

    let pod_value = serde_json::to_value(&pod).map_err(RealizerError::InvalidPatchJson)?;
    let hash = nominal_hash::compute(&pod_value, &ctx.node_name);
    models::meta::set_annotation(&mut pod.metadata, annotations::LAUNCHER_CONFIG_HASH, hash);

    Ok(pod)
}

fn de_individualize(pod: &mut Pod) {
    if let Some(spec) = pod.spec.as_mut() {
        spec.ephemeral_containers = None;
        spec.volumes = spec.volumes.take().map(|vols| {
            vols.into_iter()
                .filter(|v| !v.name.starts_with(API_ACCESS_VOLUME_PREFIX))
                .collect()
        });
        for container in spec.containers.iter_mut() {
            container.volume_mounts = container.volume_mounts.take().map(|mounts| {
                mounts
                    .into_iter()
                    .filter(|m| !m.name.starts_with(API_ACCESS_VOLUME_PREFIX))
                    .collect()
            });
        }
    }
}

fn apply_launcher_labels(pod: &mut Pod, ctx: &BindingContext, launcher_config_name: &str) {
    models::meta::set_label(&mut pod.metadata, labels::COMPONENT, labels::COMPONENT_LAUNCHER);
    models::meta::set_label(
        &mut pod.metadata,
        labels::GENERATED_BY,
        labels::GENERATED_BY_POPULATOR,
    );
    models::meta::set_label(&mut pod.metadata, labels::LAUNCHER_CONFIG_NAME, launcher_config_name);
    models::meta::set_label(&mut pod.metadata, labels::NODE_NAME, ctx.node_name.as_str());
    models::meta::set_annotation(&mut pod.metadata, annotations::LAUNCHER_BASED, "true");
}

fn pin_to_node(pod: &mut Pod, node_name: &str) {
    let term = NodeSelectorTerm {
        match_expressions: Some(vec![NodeSelectorRequirement {
            key: HOSTNAME_LABEL.to_string(),
            operator: "In".to_string(),
            values: Some(vec![node_name.to_string()]),
        }]),
        match_fields: None,
    };
    let node_affinity = NodeAffinity {
        required_during_scheduling_ignored_during_execution: Some(NodeSelector {
            node_selector_terms: vec![term],
        }),
        preferred_during_scheduling_ignored_during_execution: None,
    };
    let spec = pod.spec.get_or_insert_with(Default::default);
    spec.affinity
        .get_or_insert_with(Affinity::default)
        .node_affinity = Some(node_affinity);
}

fn set_liveness_probe(pod: &mut Pod, inference_port: i32) -> Result<(), RealizerError> {
    let container = pod
        .spec
        .as_mut()
        .and_then(|s| s.containers.iter_mut().find(|c| c.name == STUB_CONTAINER_NAME))
        .ok_or(RealizerError::MissingContainer(STUB_CONTAINER_NAME))?;

    container.liveness_probe = Some(Probe {
        http_get: Some(HTTPGetAction {
            path: Some("/health".to_string()),
            port: k8s_openapi::apimachinery::pkg::util::intstr::IntOrString::Int(inference_port),
            ..Default::default()
        }),
        ..Default::default()
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Container, PodSpec, Volume, VolumeMount};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn template_with_api_access() -> PodTemplateSpec {
        PodTemplateSpec {
            metadata: Some(ObjectMeta {
                name: Some("launcher-template".to_string()),
                ..Default::default()
            }),
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: STUB_CONTAINER_NAME.to_string(),
                    volume_mounts: Some(vec![VolumeMount {
                        name: "kube-api-access-abc12".to_string(),
                        mount_path: "/var/run/secrets".to_string(),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }],
                volumes: Some(vec![Volume {
                    name: "kube-api-access-abc12".to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
        }
    }

    fn ctx() -> BindingContext {
        BindingContext {
            node_name: "node-9".to_string(),
            accelerator_indices: vec![],
            local_volume: None,
        }
    }

    #[test]
    fn removes_api_access_volume_and_mount() {
        let realized = realize_launcher(&template_with_api_access(), &ctx(), "lc-a", 8000).unwrap();
        let spec = realized.spec.unwrap();
        assert!(spec.volumes.unwrap().is_empty());
        assert!(spec.containers[0].volume_mounts.as_ref().unwrap().is_empty());
    }

    #[test]
    fn applies_label_set_and_hash_annotation() {
        let realized = realize_launcher(&template_with_api_access(), &ctx(), "lc-a", 8000).unwrap();
        assert_eq!(
            realized.metadata.labels.as_ref().unwrap().get(labels::LAUNCHER_CONFIG_NAME),
            Some(&"lc-a".to_string())
        );
        assert!(realized
            .metadata
            .annotations
            .as_ref()
            .unwrap()
            .contains_key(annotations::LAUNCHER_CONFIG_HASH));
    }

    #[test]
    fn same_inputs_produce_same_hash() {
        let a = realize_launcher(&template_with_api_access(), &ctx(), "lc-a", 8000).unwrap();
        let b = realize_launcher(&template_with_api_access(), &ctx(), "lc-a", 8000).unwrap();
        let hash = |p: &Pod| {
            models::meta::get_annotation(&p.metadata, annotations::LAUNCHER_CONFIG_HASH)
                .unwrap()
                .to_string()
        };
        assert_eq!(hash(&a), hash(&b));
    }
}

//! Direct-provider realization (§4.3 "For direct providers").

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Affinity, EnvVar, NodeAffinity, NodeSelector, NodeSelectorRequirement, NodeSelectorTerm, Pod,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use models::binding::BindingContext;
use models::srp::STUB_CONTAINER_NAME;
use models::annotations;

use crate::error::RealizerError;
use crate::nominal_hash;
use crate::{patch, template};

const HOSTNAME_LABEL: &str = "kubernetes.io/hostname";
const NVIDIA_GPU_RESOURCE: &str = "nvidia.com/gpu";

/// Realizes a server-providing pod from an SRP + its `server-patch`
/// template + a binding context.
///
/// 1. Strip all annotations from a deep copy of the SRP.
/// 2. Expand the `server-patch` template against the context.
/// 3. Apply the expanded patch as a strategic merge patch.
/// 4. Pin the result to the node (node affinity to that hostname).
/// 5. Inject `CUDA_VISIBLE_DEVICES=<indices>`.
/// 6. Rewrite `nvidia.com/gpu` resource limits/requests on the
///    inference-server container to `"0"`.
/// 7. Compute the nominal hash (same basis as the launcher path) and
///    store it, so a later SRP's candidate search can recognize "this
///    unbound direct SPP is what I would realize today" without
///    re-realizing and structurally diffing (§4.4 candidate search,
///    direct case (a)).
pub fn realize_direct(
    srp: &Pod,
    patch_template: &str,
    ctx: &BindingContext,
) -> Result<Pod, RealizerError> {
    let mut stripped = srp.clone();
    stripped.metadata.annotations = None;

    let expanded = template::expand(patch_template, ctx)?;
    let patch_value: serde_json::Value = serde_json::from_str(&expanded)?;

    let mut pod_value = serde_json::to_value(&stripped).map_err(RealizerError::InvalidPatchJson)?;
    patch::merge(&mut pod_value, &patch_value);

    let mut realized: Pod =
        serde_json::from_value(pod_value).map_err(|e| RealizerError::MalformedPod(e.to_string()))?;

    pin_to_node(&mut realized, &ctx.node_name);
    inject_accelerator_env(&mut realized, ctx)?;
    zero_out_gpu_resource_claim(&mut realized)?;

    let pod_value = serde_json::to_value(&realized).map_err(RealizerError::InvalidPatchJson)?;
    let hash = nominal_hash::compute(&pod_value, &ctx.node_name);
    models::meta::set_annotation(&mut realized.metadata, annotations::LAUNCHER_CONFIG_HASH, hash);

    Ok(realized)
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

fn inject_accelerator_env(pod: &mut Pod, ctx: &BindingContext) -> Result<(), RealizerError> {
    let container = stub_container_mut(pod)?;
    let env = container.env.get_or_insert_with(Vec::new);
    env.retain(|e| e.name != "CUDA_VISIBLE_DEVICES");
    env.push(EnvVar {
        name: "CUDA_VISIBLE_DEVICES".to_string(),
        value: Some(ctx.cuda_visible_devices()),
        value_from: None,
    });
    Ok(())
}

fn zero_out_gpu_resource_claim(pod: &mut Pod) -> Result<(), RealizerError> {
    let container = stub_container_mut(pod)?;
    let resources = container.resources.get_or_insert_with(Default::default);
    for table in [&mut resources.limits, &mut resources.requests] {
        let map: &mut BTreeMap<String, Quantity> = table.get_or_insert_with(Default::default);
        map.insert(NVIDIA_GPU_RESOURCE.to_string(), Quantity("0".to_string()));
    }
    Ok(())
}

fn stub_container_mut(
    pod: &mut Pod,
) -> Result<&mut k8s_openapi::api::core::v1::Container, RealizerError> {
    pod.spec
        .as_mut()
        .and_then(|s| s.containers.iter_mut().find(|c| c.name == STUB_CONTAINER_NAME))
        .ok_or(RealizerError::MissingContainer(STUB_CONTAINER_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Container, PodSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn bare_srp() -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("srp-a".to_string()),
                annotations: Some(BTreeMap::from([("leftover".to_string(), "x".to_string())])),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: STUB_CONTAINER_NAME.to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn ctx() -> BindingContext {
        BindingContext {
            node_name: "node-3".to_string(),
            accelerator_indices: vec![1],
            local_volume: None,
        }
    }

    #[test]
    fn strips_annotations_and_pins_node() {
        let realized = realize_direct(&bare_srp(), "{}", &ctx()).unwrap();
        // Leftover SRP annotations are gone; only the nominal hash this
        // function itself adds remains.
        assert_eq!(
            realized.metadata.annotations.as_ref().unwrap().len(),
            1
        );
        assert!(realized
            .metadata
            .annotations
            .as_ref()
            .unwrap()
            .contains_key(annotations::LAUNCHER_CONFIG_HASH));
        let affinity = realized
            .spec
            .as_ref()
            .unwrap()
            .affinity
            .as_ref()
            .unwrap()
            .node_affinity
            .as_ref()
            .unwrap();
        let term = &affinity
            .required_during_scheduling_ignored_during_execution
            .as_ref()
            .unwrap()
            .node_selector_terms[0];
        assert_eq!(
            term.match_expressions.as_ref().unwrap()[0].values,
            Some(vec!["node-3".to_string()])
        );
    }

    #[test]
    fn injects_cuda_env_and_zeroes_gpu_resource() {
        let realized = realize_direct(&bare_srp(), "{}", &ctx()).unwrap();
        let container = &realized.spec.unwrap().containers[0];
        let cuda = container
            .env
            .as_ref()
            .unwrap()
            .iter()
            .find(|e| e.name == "CUDA_VISIBLE_DEVICES")
            .unwrap();
        assert_eq!(cuda.value.as_deref(), Some("1"));
        let limits = container.resources.as_ref().unwrap().limits.as_ref().unwrap();
        assert_eq!(limits.get(NVIDIA_GPU_RESOURCE).unwrap().0, "0");
    }

    #[test]
    fn applies_strategic_merge_patch() {
        let patch_template = r#"{"metadata": {"labels": {"pinned-node": "{{NodeName}}"}}}"#;
        let realized = realize_direct(&bare_srp(), patch_template, &ctx()).unwrap();
        assert_eq!(
            realized.metadata.labels.unwrap().get("pinned-node"),
            Some(&"node-3".to_string())
        );
    }

    #[test]
    fn missing_stub_container_is_an_error() {
        let mut srp = bare_srp();
        srp.spec.as_mut().unwrap().containers.clear();
        assert!(realize_direct(&srp, "{}", &ctx()).is_err());
    }

    #[test]
    fn nominal_hash_is_stable_for_identical_inputs() {
        let a = realize_direct(&bare_srp(), "{}", &ctx()).unwrap();
        let b = realize_direct(&bare_srp(), "{}", &ctx()).unwrap();
        let hash = |p: &Pod| {
            models::meta::get_annotation(&p.metadata, annotations::LAUNCHER_CONFIG_HASH)
                .unwrap()
                .to_string()
        };
        assert_eq!(hash(&a), hash(&b));
    }
}

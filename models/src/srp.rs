//! Server-requesting pod (SRP) view over `k8s_openapi::api::core::v1::Pod`
//! (§3).

use k8s_openapi::api::core::v1::Pod;

use crate::annotations;
use crate::error::ModelError;
use crate::labels;
use crate::meta::{self, parse_accelerators, render_accelerators};
use crate::status::SrpStatus;

/// The well-known container name the spec pins the stub server to (§3).
pub const STUB_CONTAINER_NAME: &str = "inference-server";

/// Finalizer the dual-pods controller places on every SRP it has observed,
/// so that deletion is never invisible to it: the object store keeps the
/// SRP around (with `deletionTimestamp` set) until the controller has
/// unbound/slept/deleted its paired SPP and removed this finalizer itself
/// (§4.4 "SRP deletion during Bound").
pub const FINALIZER: &str = "dual-pods.llm-d.ai/dual-pod-binding";

/// Read-only view. Build with [`SrpView::new`]; mutate through
/// [`SrpViewMut`].
pub struct SrpView<'a>(pub &'a Pod);

impl<'a> SrpView<'a> {
    pub fn new(pod: &'a Pod) -> Self {
        Self(pod)
    }

    pub fn name(&self) -> Result<&str, ModelError> {
        self.0
            .metadata
            .name
            .as_deref()
            .ok_or(ModelError::MissingName)
    }

    pub fn uid(&self) -> Option<&str> {
        self.0.metadata.uid.as_deref()
    }

    pub fn server_patch(&self) -> Option<&str> {
        meta::get_annotation(&self.0.metadata, annotations::SERVER_PATCH)
    }

    pub fn inference_server_config(&self) -> Option<&str> {
        meta::get_annotation(&self.0.metadata, annotations::INFERENCE_SERVER_CONFIG)
    }

    pub fn admin_port(&self) -> u16 {
        meta::get_annotation(&self.0.metadata, annotations::ADMIN_PORT)
            .and_then(|v| v.parse().ok())
            .unwrap_or(annotations::DEFAULT_ADMIN_PORT)
    }

    pub fn dual(&self) -> Option<&str> {
        meta::get_label(&self.0.metadata, labels::DUAL)
    }

    pub fn is_bound(&self) -> bool {
        self.dual().is_some()
    }

    pub fn accelerators(&self) -> Vec<String> {
        meta::get_annotation(&self.0.metadata, annotations::ACCELERATORS)
            .map(parse_accelerators)
            .unwrap_or_default()
    }

    pub fn has_accelerators(&self) -> bool {
        !self.accelerators().is_empty()
    }

    pub fn status(&self) -> Result<Option<SrpStatus>, ModelError> {
        meta::get_annotation(&self.0.metadata, annotations::STATUS)
            .map(|v| {
                serde_json::from_str(v).map_err(|source| ModelError::MalformedAnnotation {
                    key: annotations::STATUS,
                    source,
                })
            })
            .transpose()
    }

    /// Which node the scheduler assigned this SRP to, if any (read off
    /// `spec.nodeName`, populated once the cluster scheduler has placed it —
    /// the dual-pods controller never sets this itself; see §1 Non-goals).
    pub fn node_name(&self) -> Option<&str> {
        self.0.spec.as_ref()?.node_name.as_deref()
    }

    pub fn stub_port(&self) -> u16 {
        self.admin_port()
    }

    pub fn deletion_timestamp(&self) -> bool {
        self.0.metadata.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self) -> bool {
        meta::has_finalizer(&self.0.metadata, FINALIZER)
    }
}

/// Mutating view, used by the reconciler to write the controller-managed
/// subset of an SRP's metadata back before a patch call.
pub struct SrpViewMut<'a>(pub &'a mut Pod);

impl<'a> SrpViewMut<'a> {
    pub fn new(pod: &'a mut Pod) -> Self {
        Self(pod)
    }

    pub fn set_dual(&mut self, spp_name: &str) {
        meta::set_label(&mut self.0.metadata, labels::DUAL, spp_name);
    }

    pub fn clear_dual(&mut self) {
        meta::remove_label(&mut self.0.metadata, labels::DUAL);
    }

    pub fn set_accelerators(&mut self, ids: &[String]) {
        meta::set_annotation(
            &mut self.0.metadata,
            annotations::ACCELERATORS,
            render_accelerators(ids),
        );
    }

    pub fn set_status(&mut self, status: &SrpStatus) {
        meta::set_annotation(
            &mut self.0.metadata,
            annotations::STATUS,
            status.to_annotation_value(),
        );
    }

    pub fn clear_status(&mut self) {
        meta::remove_annotation(&mut self.0.metadata, annotations::STATUS);
    }

    pub fn add_finalizer(&mut self) {
        meta::add_finalizer(&mut self.0.metadata, FINALIZER);
    }

    pub fn remove_finalizer(&mut self) {
        meta::remove_finalizer(&mut self.0.metadata, FINALIZER);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn pod_with_annotations(annos: &[(&str, &str)]) -> Pod {
        let mut map = BTreeMap::new();
        for (k, v) in annos {
            map.insert(k.to_string(), v.to_string());
        }
        Pod {
            metadata: ObjectMeta {
                name: Some("srp-a".into()),
                annotations: Some(map),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn admin_port_defaults_to_8081() {
        let pod = pod_with_annotations(&[]);
        assert_eq!(SrpView::new(&pod).admin_port(), 8081);
    }

    #[test]
    fn admin_port_honors_override() {
        let pod = pod_with_annotations(&[(annotations::ADMIN_PORT, "9090")]);
        assert_eq!(SrpView::new(&pod).admin_port(), 9090);
    }

    #[test]
    fn accelerators_round_trip_sorted() {
        let mut pod = pod_with_annotations(&[]);
        SrpViewMut::new(&mut pod).set_accelerators(&["gpu-2".into(), "gpu-0".into()]);
        assert_eq!(
            SrpView::new(&pod).accelerators(),
            vec!["gpu-0".to_string(), "gpu-2".to_string()]
        );
    }

    #[test]
    fn finalizer_round_trips() {
        let mut pod = pod_with_annotations(&[]);
        assert!(!SrpView::new(&pod).has_finalizer());
        SrpViewMut::new(&mut pod).add_finalizer();
        assert!(SrpView::new(&pod).has_finalizer());
        SrpViewMut::new(&mut pod).remove_finalizer();
        assert!(!SrpView::new(&pod).has_finalizer());
    }

    #[test]
    fn add_finalizer_is_idempotent() {
        let mut pod = pod_with_annotations(&[]);
        SrpViewMut::new(&mut pod).add_finalizer();
        SrpViewMut::new(&mut pod).add_finalizer();
        assert_eq!(pod.metadata.finalizers.as_ref().map(Vec::len), Some(1));
    }
}

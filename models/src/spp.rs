//! Server-providing pod (SPP) view over `k8s_openapi::api::core::v1::Pod`
//! (§3) — either a direct provider or a launcher provider.

use k8s_openapi::api::core::v1::Pod;

use crate::annotations;
use crate::labels;
use crate::meta::{self, parse_accelerators, render_accelerators};

pub struct SppView<'a>(pub &'a Pod);

impl<'a> SppView<'a> {
    pub fn new(pod: &'a Pod) -> Self {
        Self(pod)
    }

    pub fn name(&self) -> Option<&str> {
        self.0.metadata.name.as_deref()
    }

    pub fn dual(&self) -> Option<&str> {
        meta::get_label(&self.0.metadata, labels::DUAL)
    }

    pub fn is_bound(&self) -> bool {
        self.dual().is_some()
    }

    pub fn is_launcher(&self) -> bool {
        meta::get_label(&self.0.metadata, labels::COMPONENT) == Some(labels::COMPONENT_LAUNCHER)
            || meta::get_annotation(&self.0.metadata, annotations::LAUNCHER_BASED) == Some("true")
    }

    pub fn sleeping(&self) -> Option<bool> {
        match meta::get_label(&self.0.metadata, labels::SLEEPING) {
            Some("true") => Some(true),
            Some("false") => Some(false),
            _ => None,
        }
    }

    pub fn launcher_config_name(&self) -> Option<&str> {
        meta::get_label(&self.0.metadata, labels::LAUNCHER_CONFIG_NAME)
    }

    pub fn node_name_label(&self) -> Option<&str> {
        meta::get_label(&self.0.metadata, labels::NODE_NAME)
    }

    pub fn scheduled_node_name(&self) -> Option<&str> {
        self.0.spec.as_ref()?.node_name.as_deref()
    }

    pub fn nominal_hash(&self) -> Option<&str> {
        meta::get_annotation(&self.0.metadata, annotations::LAUNCHER_CONFIG_HASH)
    }

    /// `(srp_uid, srp_name)`, parsed from `"<srp-uid> <srp-name>"` (§6).
    pub fn requester(&self) -> Option<(&str, &str)> {
        let raw = meta::get_annotation(&self.0.metadata, annotations::REQUESTER)?;
        raw.split_once(' ')
    }

    pub fn is_unhealthy(&self) -> bool {
        meta::get_annotation(&self.0.metadata, annotations::UNHEALTHY).is_some()
    }

    pub fn accelerators(&self) -> Vec<String> {
        meta::get_annotation(&self.0.metadata, annotations::ACCELERATORS)
            .map(parse_accelerators)
            .unwrap_or_default()
    }

    pub fn deletion_timestamp(&self) -> bool {
        self.0.metadata.deletion_timestamp.is_some()
    }

    pub fn creation_timestamp(&self) -> Option<&k8s_openapi::apimachinery::pkg::apis::meta::v1::Time> {
        self.0.metadata.creation_timestamp.as_ref()
    }

    /// Liveness/readiness signal the reconciler treats as "in trouble"
    /// (§4.4 Failure semantics): any container not ready, or any container
    /// that has restarted at least once while not ready.
    pub fn in_trouble(&self) -> bool {
        let Some(status) = &self.0.status else {
            return false;
        };
        status.container_statuses.iter().any(|cs| {
            !cs.ready && cs.restart_count > 0
        })
    }

    pub fn healthy_per_conditions(&self) -> bool {
        let Some(status) = &self.0.status else {
            return false;
        };
        status
            .conditions
            .iter()
            .any(|c| c.type_ == "Ready" && c.status == "True")
    }
}

pub struct SppViewMut<'a>(pub &'a mut Pod);

impl<'a> SppViewMut<'a> {
    pub fn new(pod: &'a mut Pod) -> Self {
        Self(pod)
    }

    pub fn set_dual(&mut self, srp_name: &str) {
        meta::set_label(&mut self.0.metadata, labels::DUAL, srp_name);
    }

    pub fn clear_dual(&mut self) {
        meta::remove_label(&mut self.0.metadata, labels::DUAL);
    }

    pub fn set_sleeping(&mut self, sleeping: bool) {
        meta::set_label(
            &mut self.0.metadata,
            labels::SLEEPING,
            if sleeping { "true" } else { "false" },
        );
    }

    pub fn set_requester(&mut self, srp_uid: &str, srp_name: &str) {
        meta::set_annotation(
            &mut self.0.metadata,
            annotations::REQUESTER,
            format!("{srp_uid} {srp_name}"),
        );
    }

    pub fn clear_requester(&mut self) {
        meta::remove_annotation(&mut self.0.metadata, annotations::REQUESTER);
    }

    pub fn set_accelerators(&mut self, ids: &[String]) {
        meta::set_annotation(
            &mut self.0.metadata,
            annotations::ACCELERATORS,
            render_accelerators(ids),
        );
    }

    pub fn set_unhealthy(&mut self, reason: &str) {
        meta::set_annotation(&mut self.0.metadata, annotations::UNHEALTHY, reason);
    }

    pub fn clear_unhealthy(&mut self) {
        meta::remove_annotation(&mut self.0.metadata, annotations::UNHEALTHY);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn bare_pod() -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("spp-a".into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn requester_round_trips() {
        let mut pod = bare_pod();
        SppViewMut::new(&mut pod).set_requester("uid-123", "srp-a");
        assert_eq!(SppView::new(&pod).requester(), Some(("uid-123", "srp-a")));
    }

    #[test]
    fn unbound_by_default() {
        let pod = bare_pod();
        assert!(!SppView::new(&pod).is_bound());
    }
}

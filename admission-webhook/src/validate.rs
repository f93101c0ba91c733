//! Pure boundary check (§4.7, C7): rejects user mutation of
//! controller-managed pod labels/annotations.
//!
//! Kept as a function of two `Pod`s plus a requester identity so it can be
//! unit tested without standing up an admission server.

use k8s_openapi::api::core::v1::Pod;
use models::{annotations, labels};

/// Identity of the caller making the UPDATE, as parsed from the admission
/// request's `userInfo.username`. Only an exact match against the
/// configured controller service account is treated as the controller
/// itself; everything else is "a user" for §4.7's purposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester<'a>(pub &'a str);

impl<'a> Requester<'a> {
    pub fn is_controller(&self, controller_service_account: &str) -> bool {
        self.0 == controller_service_account
    }
}

/// Result of a rejected validation: the field that changed, surfaced in the
/// admission response message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub field: String,
    pub old: Option<String>,
    pub new: Option<String>,
}

fn annotation<'a>(pod: &'a Pod, key: &str) -> Option<&'a str> {
    pod.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(key))
        .map(String::as_str)
}

fn label<'a>(pod: &'a Pod, key: &str) -> Option<&'a str> {
    pod.metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(key))
        .map(String::as_str)
}

fn is_bound(pod: &Pod) -> bool {
    label(pod, labels::DUAL).is_some()
}

/// Validates an UPDATE of `old` to `new`. Returns the first violation found,
/// if any; `None` means admit.
///
/// §4.7: the always-frozen annotations and controller-managed labels may
/// never change in a user-originated UPDATE. If `new` is (or `old` was) a
/// bound SRP, the request-defining annotations are frozen too — unbound
/// SRPs may freely edit their own request.
pub fn validate_update(old: &Pod, new: &Pod, requester: &Requester, controller_service_account: &str) -> Option<Violation> {
    if requester.is_controller(controller_service_account) {
        return None;
    }

    for key in annotations::ALWAYS_FROZEN {
        if annotation(old, key) != annotation(new, key) {
            return Some(Violation {
                field: format!("annotations[{key}]"),
                old: annotation(old, key).map(String::from),
                new: annotation(new, key).map(String::from),
            });
        }
    }

    for key in labels::CONTROLLER_MANAGED {
        if label(old, key) != label(new, key) {
            return Some(Violation {
                field: format!("labels[{key}]"),
                old: label(old, key).map(String::from),
                new: label(new, key).map(String::from),
            });
        }
    }

    if is_bound(old) || is_bound(new) {
        for key in annotations::BOUND_SRP_FROZEN {
            if annotation(old, key) != annotation(new, key) {
                return Some(Violation {
                    field: format!("annotations[{key}]"),
                    old: annotation(old, key).map(String::from),
                    new: annotation(new, key).map(String::from),
                });
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    const CONTROLLER_SA: &str = "system:serviceaccount:dual-pods:dual-pods-controller";

    fn pod(annotations: &[(&str, &str)], labels: &[(&str, &str)]) -> Pod {
        Pod {
            metadata: ObjectMeta {
                annotations: Some(
                    annotations
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect::<BTreeMap<_, _>>()
                        .into_iter()
                        .collect(),
                ),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect::<BTreeMap<_, _>>()
                        .into_iter()
                        .collect(),
                ),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn admits_unrelated_user_edit() {
        let old = pod(&[("foo", "bar")], &[]);
        let new = pod(&[("foo", "baz")], &[]);
        let req = Requester("system:serviceaccount:default:default");
        assert_eq!(validate_update(&old, &new, &req, CONTROLLER_SA), None);
    }

    #[test]
    fn rejects_user_editing_dual_label() {
        let old = pod(&[], &[(labels::DUAL, "spp-1")]);
        let new = pod(&[], &[]);
        let req = Requester("system:serviceaccount:default:default");
        let v = validate_update(&old, &new, &req, CONTROLLER_SA).expect("should reject");
        assert_eq!(v.field, format!("labels[{}]", labels::DUAL));
    }

    #[test]
    fn admits_controller_editing_dual_label() {
        let old = pod(&[], &[(labels::DUAL, "spp-1")]);
        let new = pod(&[], &[]);
        let req = Requester(CONTROLLER_SA);
        assert_eq!(validate_update(&old, &new, &req, CONTROLLER_SA), None);
    }

    #[test]
    fn rejects_user_editing_status_annotation() {
        let old = pod(&[(annotations::STATUS, "{}")], &[]);
        let new = pod(&[(annotations::STATUS, "{\"errors\":[\"x\"]}")], &[]);
        let req = Requester("system:serviceaccount:default:default");
        let v = validate_update(&old, &new, &req, CONTROLLER_SA).expect("should reject");
        assert_eq!(v.field, format!("annotations[{}]", annotations::STATUS));
    }

    #[test]
    fn rejects_edit_to_server_patch_on_bound_srp() {
        let old = pod(
            &[(annotations::SERVER_PATCH, "a")],
            &[(labels::DUAL, "spp-1")],
        );
        let new = pod(
            &[(annotations::SERVER_PATCH, "b")],
            &[(labels::DUAL, "spp-1")],
        );
        let req = Requester("system:serviceaccount:default:default");
        let v = validate_update(&old, &new, &req, CONTROLLER_SA).expect("should reject");
        assert_eq!(v.field, format!("annotations[{}]", annotations::SERVER_PATCH));
    }

    #[test]
    fn admits_edit_to_server_patch_on_unbound_srp() {
        let old = pod(&[(annotations::SERVER_PATCH, "a")], &[]);
        let new = pod(&[(annotations::SERVER_PATCH, "b")], &[]);
        let req = Requester("system:serviceaccount:default:default");
        assert_eq!(validate_update(&old, &new, &req, CONTROLLER_SA), None);
    }

    #[test]
    fn rejects_unbinding_that_also_edits_server_patch() {
        // Still bound in `old`; request both unbinds and edits the patch in one shot.
        let old = pod(
            &[(annotations::SERVER_PATCH, "a")],
            &[(labels::DUAL, "spp-1")],
        );
        let new = pod(&[(annotations::SERVER_PATCH, "b")], &[]);
        let req = Requester("system:serviceaccount:default:default");
        // dual label change is caught first.
        let v = validate_update(&old, &new, &req, CONTROLLER_SA).expect("should reject");
        assert_eq!(v.field, format!("labels[{}]", labels::DUAL));
    }
}

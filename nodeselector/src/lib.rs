//! Enhanced node-selector matcher (C2, SPEC_FULL.md §4.2).
//!
//! Grounded directly on this repository's
//! `InfralinkScheduler::{node_matches_selector, node_has_resources,
//! pod_tolerates_node_taints}` — the same three-part
//! label/resource/taint shape, generalized to the spec's
//! `{labelSelector, allocatableResources, acceleratorSelector}` triple.
//! Taints have no analogue here (the spec has no toleration concept); the
//! accelerator selector takes that slot instead, matched in the same
//! boolean-predicate style.

use k8s_openapi::api::core::v1::Node;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use models::node_selector::{AcceleratorInventory, EnhancedNodeSelector};
use models::ModelError;

/// `(a) label selector, (b) per-resource range, (c) accelerator selector` —
/// all three must hold (§4.2).
pub fn matches(
    selector: &EnhancedNodeSelector,
    node: &Node,
    inventory: &AcceleratorInventory,
) -> Result<bool, ModelError> {
    if !label_selector_matches(selector.label_selector.as_ref(), node)? {
        return Ok(false);
    }
    if !resources_in_range(selector, node) {
        return Ok(false);
    }
    if !accelerator_selector_satisfied(selector, inventory) {
        return Ok(false);
    }
    Ok(true)
}

fn label_selector_matches(selector: Option<&LabelSelector>, node: &Node) -> Result<bool, ModelError> {
    let Some(selector) = selector else {
        return Ok(true);
    };
    let empty = Default::default();
    let node_labels = node.metadata.labels.as_ref().unwrap_or(&empty);

    if let Some(match_labels) = &selector.match_labels {
        for (k, v) in match_labels {
            if node_labels.get(k) != Some(v) {
                return Ok(false);
            }
        }
    }

    if let Some(expressions) = &selector.match_expressions {
        for expr in expressions {
            if !expression_matches(expr, node_labels)? {
                return Ok(false);
            }
        }
    }

    Ok(true)
}

fn expression_matches(
    expr: &LabelSelectorRequirement,
    node_labels: &std::collections::BTreeMap<String, String>,
) -> Result<bool, ModelError> {
    let value = node_labels.get(&expr.key);
    let matches = match expr.operator.as_str() {
        "In" => {
            let wanted = expr.values.as_deref().unwrap_or(&[]);
            value.map_or(false, |v| wanted.iter().any(|w| w == v))
        }
        "NotIn" => {
            let wanted = expr.values.as_deref().unwrap_or(&[]);
            value.map_or(true, |v| !wanted.iter().any(|w| w == v))
        }
        "Exists" => value.is_some(),
        "DoesNotExist" => value.is_none(),
        other => return Err(ModelError::UnsupportedSelectorOperator(other.to_string())),
    };
    Ok(matches)
}

/// Every configured resource range must admit the node's allocatable
/// quantity. A missing quantity on the node is treated as zero; a missing
/// bound on the range is unconstrained on that side (§4.2b).
fn resources_in_range(selector: &EnhancedNodeSelector, node: &Node) -> bool {
    let empty = Default::default();
    let allocatable = node
        .status
        .as_ref()
        .and_then(|s| s.allocatable.as_ref())
        .unwrap_or(&empty);

    selector.allocatable_resources.iter().all(|(name, range)| {
        let have = allocatable
            .get(name)
            .and_then(|q| parse_quantity(q))
            .unwrap_or(0);
        range.min.map_or(true, |min| have >= min) && range.max.map_or(true, |max| have <= max)
    })
}

fn accelerator_selector_satisfied(
    selector: &EnhancedNodeSelector,
    inventory: &AcceleratorInventory,
) -> bool {
    let Some(sel) = &selector.accelerator_selector else {
        return true;
    };
    let count = inventory.count_matching(sel);
    count >= sel.min_count.unwrap_or(1)
}

/// Parses a Kubernetes resource quantity into a signed integer base-unit
/// count (bytes for memory, whole units for CPU millis already baked in by
/// the caller's resource-name choice). Supports the binary (`Ki`..`Ei`) and
/// decimal (`k`, `M`, `G`, `T`, `P`, `E`) SI suffixes plus a bare integer;
/// this covers every allocatable resource this system's node selectors
/// actually range over (memory bytes, accelerator-memory bytes, accelerator
/// counts).
fn parse_quantity(q: &Quantity) -> Option<i64> {
    let s = q.0.trim();
    const BINARY: &[(&str, i64)] = &[
        ("Ki", 1i64 << 10),
        ("Mi", 1i64 << 20),
        ("Gi", 1i64 << 30),
        ("Ti", 1i64 << 40),
        ("Pi", 1i64 << 50),
        ("Ei", 1i64 << 60),
    ];
    const DECIMAL: &[(&str, i64)] = &[
        ("k", 1_000),
        ("M", 1_000_000),
        ("G", 1_000_000_000),
        ("T", 1_000_000_000_000),
        ("P", 1_000_000_000_000_000),
        ("E", 1_000_000_000_000_000_000),
    ];

    for (suffix, mul) in BINARY.iter().chain(DECIMAL.iter()) {
        if let Some(num) = s.strip_suffix(suffix) {
            let base: f64 = num.parse().ok()?;
            return Some((base * (*mul as f64)) as i64);
        }
    }
    s.parse::<i64>().ok().or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::NodeStatus;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use models::node_selector::{Accelerator, AcceleratorSelector, ResourceRange};
    use std::collections::BTreeMap;

    fn node_with(labels: &[(&str, &str)], allocatable: &[(&str, &str)]) -> Node {
        let mut label_map = BTreeMap::new();
        for (k, v) in labels {
            label_map.insert(k.to_string(), v.to_string());
        }
        let mut alloc_map = BTreeMap::new();
        for (k, v) in allocatable {
            alloc_map.insert(k.to_string(), Quantity(v.to_string()));
        }
        Node {
            metadata: ObjectMeta {
                labels: Some(label_map),
                ..Default::default()
            },
            status: Some(NodeStatus {
                allocatable: Some(alloc_map),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn label_selector_rejects_mismatched_label() {
        let node = node_with(&[("zone", "us-east")], &[]);
        let selector = EnhancedNodeSelector {
            label_selector: Some(LabelSelector {
                match_labels: Some(BTreeMap::from([("zone".to_string(), "us-west".to_string())])),
                ..Default::default()
            }),
            ..Default::default()
        };
        let inventory = AcceleratorInventory::default();
        assert!(!matches(&selector, &node, &inventory).unwrap());
    }

    #[test]
    fn resource_range_honors_missing_quantity_as_zero() {
        let node = node_with(&[], &[]);
        let mut ranges = BTreeMap::new();
        ranges.insert(
            "memory".to_string(),
            ResourceRange {
                min: Some(1),
                max: None,
            },
        );
        let selector = EnhancedNodeSelector {
            allocatable_resources: ranges,
            ..Default::default()
        };
        let inventory = AcceleratorInventory::default();
        assert!(!matches(&selector, &node, &inventory).unwrap());
    }

    #[test]
    fn binary_suffix_quantities_parse() {
        let node = node_with(&[], &[("memory", "32Gi")]);
        let mut ranges = BTreeMap::new();
        ranges.insert(
            "memory".to_string(),
            ResourceRange {
                min: Some(16 << 30),
                max: None,
            },
        );
        let selector = EnhancedNodeSelector {
            allocatable_resources: ranges,
            ..Default::default()
        };
        let inventory = AcceleratorInventory::default();
        assert!(matches(&selector, &node, &inventory).unwrap());
    }

    #[test]
    fn accelerator_selector_counts_matching_type_and_memory() {
        let node = node_with(&[], &[]);
        let selector = EnhancedNodeSelector {
            accelerator_selector: Some(AcceleratorSelector {
                accelerator_type: "a100".to_string(),
                min_memory_bytes: Some(40 << 30),
                min_count: Some(2),
            }),
            ..Default::default()
        };
        let inventory = AcceleratorInventory {
            accelerators: vec![
                Accelerator {
                    id: "gpu-0".into(),
                    accelerator_type: "a100".into(),
                    memory_bytes: 80 << 30,
                },
                Accelerator {
                    id: "gpu-1".into(),
                    accelerator_type: "a100".into(),
                    memory_bytes: 80 << 30,
                },
                Accelerator {
                    id: "gpu-2".into(),
                    accelerator_type: "v100".into(),
                    memory_bytes: 16 << 30,
                },
            ],
        };
        assert!(matches(&selector, &node, &inventory).unwrap());
    }

    #[test]
    fn accelerator_selector_rejects_insufficient_count() {
        let node = node_with(&[], &[]);
        let selector = EnhancedNodeSelector {
            accelerator_selector: Some(AcceleratorSelector {
                accelerator_type: "a100".to_string(),
                min_memory_bytes: None,
                min_count: Some(3),
            }),
            ..Default::default()
        };
        let inventory = AcceleratorInventory {
            accelerators: vec![Accelerator {
                id: "gpu-0".into(),
                accelerator_type: "a100".into(),
                memory_bytes: 80 << 30,
            }],
        };
        assert!(!matches(&selector, &node, &inventory).unwrap());
    }

    #[test]
    fn unsupported_operator_is_an_error() {
        let node = node_with(&[], &[]);
        let selector = EnhancedNodeSelector {
            label_selector: Some(LabelSelector {
                match_expressions: Some(vec![LabelSelectorRequirement {
                    key: "zone".to_string(),
                    operator: "Gt".to_string(),
                    values: None,
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let inventory = AcceleratorInventory::default();
        assert!(matches(&selector, &node, &inventory).is_err());
    }
}

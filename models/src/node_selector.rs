//! Enhanced node selector types (§3, §4.2, §6 `EnhancedNodeSelector`).
//!
//! Matching logic lives in the `nodeselector` crate (C2); this module only
//! defines the shape, since it is part of the `LauncherPopulationPolicy` CRD
//! wire format and must be `Serialize`/`Deserialize`/`JsonSchema`.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// `{labelSelector, allocatableResources: {<resourceName>: {min?, max?}},
/// acceleratorSelector?}` (§6).
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedNodeSelector {
    #[serde(default)]
    pub label_selector: Option<LabelSelector>,

    #[serde(default)]
    pub allocatable_resources: BTreeMap<String, ResourceRange>,

    #[serde(default)]
    pub accelerator_selector: Option<AcceleratorSelector>,
}

/// Inclusive range on a single allocatable resource quantity. A missing
/// bound is unconstrained on that side (§4.2b).
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRange {
    #[serde(default)]
    pub min: Option<i64>,
    #[serde(default)]
    pub max: Option<i64>,
}

/// `(type, optional memory, optional count)` — satisfied by at least one
/// accelerator set on the node (§4.2c).
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AcceleratorSelector {
    pub accelerator_type: String,
    #[serde(default)]
    pub min_memory_bytes: Option<i64>,
    #[serde(default)]
    pub min_count: Option<u32>,
}

/// A single accelerator on a node, as advertised by the (out-of-scope)
/// device-plugin layer. `nodeselector` and `realizer` both consume this.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord)]
pub struct Accelerator {
    pub id: String,
    pub accelerator_type: String,
    pub memory_bytes: i64,
}

/// Everything C2's matcher needs about a node that isn't already on
/// `k8s_openapi::api::core::v1::Node`: the accelerator inventory. Allocatable
/// resource quantities and labels are read directly off the real `Node`
/// object; this is passed alongside it.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct AcceleratorInventory {
    pub accelerators: Vec<Accelerator>,
}

impl AcceleratorInventory {
    pub fn count_matching(&self, sel: &AcceleratorSelector) -> u32 {
        self.accelerators
            .iter()
            .filter(|a| {
                a.accelerator_type == sel.accelerator_type
                    && sel.min_memory_bytes.map_or(true, |m| a.memory_bytes >= m)
            })
            .count() as u32
    }
}

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::node_selector::{AcceleratorSelector, EnhancedNodeSelector};

/// `LauncherPopulationPolicy` CR (§3, §6): for each matched node type, a
/// list of `(launcherConfigName → count)`.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "fma.llm-d.ai",
    version = "v1alpha1",
    kind = "LauncherPopulationPolicy",
    singular = "launcherpopulationpolicy",
    plural = "launcherpopulationpolicies",
    shortname = "lpp",
    namespaced,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct LauncherPopulationPolicySpec {
    pub launcher_population_for_node_types: Vec<EnhancedNodeSelectorForNodeType>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedNodeSelectorForNodeType {
    pub enhanced_node_selector: EnhancedNodeSelector,
    pub count_for_launcher: Vec<CountForLauncher>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CountForLauncher {
    pub launcher_config_name: String,
    pub launcher_count: u32,
    #[serde(default)]
    pub accelerator_selector: Option<AcceleratorSelector>,
}

//! Desired launcher-pod population computation (§4.5 steps 1-2).

use std::collections::HashMap;

use models::crd::LauncherPopulationPolicy;

use crate::errors::ReconcileError;
use crate::store::ObjectStore;

/// `(node name, launcher-config name) -> desired pod count`.
pub type DesiredPopulation = HashMap<(String, String), u32>;

/// `P(node, c) = max` over every LPP entry whose enhanced node selector
/// matches the node, across every LPP in the cluster (§4.5 steps 1-2). A
/// `countForLauncher` entry's own `acceleratorSelector`, when set, narrows
/// that entry further than its enclosing `enhancedNodeSelector` already
/// did — lets one node-type block hand out different counts per
/// accelerator configuration on otherwise-identical nodes.
pub async fn compute_desired(store: &dyn ObjectStore) -> Result<DesiredPopulation, ReconcileError> {
    let policies: Vec<LauncherPopulationPolicy> = store.list_launcher_population_policies().await?;
    let nodes = store.list_nodes().await?;

    let mut desired: DesiredPopulation = HashMap::new();
    for node in &nodes {
        let Some(node_name) = node.metadata.name.clone() else {
            continue;
        };
        let inventory = store.accelerator_inventory(&node_name).await?;

        for policy in &policies {
            for entry in &policy.spec.launcher_population_for_node_types {
                let node_type_matches =
                    nodeselector::matches(&entry.enhanced_node_selector, node, &inventory)
                        .map_err(|e| ReconcileError::SemanticInput(e.to_string()))?;
                if !node_type_matches {
                    continue;
                }

                for count in &entry.count_for_launcher {
                    if let Some(sel) = &count.accelerator_selector {
                        if inventory.count_matching(sel) < sel.min_count.unwrap_or(1) {
                            continue;
                        }
                    }
                    let key = (node_name.clone(), count.launcher_config_name.clone());
                    let slot = desired.entry(key).or_insert(0);
                    *slot = (*slot).max(count.launcher_count);
                }
            }
        }
    }
    Ok(desired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FakeObjectStore;
    use k8s_openapi::api::core::v1::Node;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use models::crd::launcher_population_policy::{
        CountForLauncher, EnhancedNodeSelectorForNodeType, LauncherPopulationPolicySpec,
    };
    use models::crd::LauncherPopulationPolicy;
    use models::node_selector::EnhancedNodeSelector;

    fn node(name: &str) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn lpp(name: &str, lc: &str, count: u32) -> LauncherPopulationPolicy {
        LauncherPopulationPolicy::new(
            name,
            LauncherPopulationPolicySpec {
                launcher_population_for_node_types: vec![EnhancedNodeSelectorForNodeType {
                    enhanced_node_selector: EnhancedNodeSelector::default(),
                    count_for_launcher: vec![CountForLauncher {
                        launcher_config_name: lc.to_string(),
                        launcher_count: count,
                        accelerator_selector: None,
                    }],
                }],
            },
        )
    }

    #[tokio::test]
    async fn takes_the_max_across_overlapping_policies() {
        let store = FakeObjectStore::new();
        store.seed_node(node("n1"));
        store.seed_lpp(lpp("lpp-a", "lc-1", 2));
        store.seed_lpp(lpp("lpp-b", "lc-1", 5));

        let desired = compute_desired(&store).await.unwrap();
        assert_eq!(desired.get(&("n1".to_string(), "lc-1".to_string())), Some(&5));
    }
}

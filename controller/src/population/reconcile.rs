//! Diff-based create/delete of launcher pods against the desired
//! population (§4.5 steps 3-5).

use std::collections::{HashMap, HashSet};

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use models::binding::BindingContext;
use models::{hosted, labels};
use rand::Rng;
use tracing::{info, warn};

use crate::errors::ReconcileError;
use crate::metrics::Metrics;
use crate::population::policy::{self, DesiredPopulation};
use crate::store::{LabelQuery, ObjectStore};

const LAUNCHER_CONFIG_API_VERSION: &str = "fma.llm-d.ai/v1alpha1";
const LAUNCHER_CONFIG_KIND: &str = "LauncherConfig";

/// One pass over the whole cluster: compute the desired map, diff it
/// against every `(node, launcherConfig)` tuple actually present, and
/// create or delete pods to close the gap (§4.5).
pub async fn reconcile_population(store: &dyn ObjectStore, metrics: &Metrics) -> Result<(), ReconcileError> {
    let desired = policy::compute_desired(store).await?;
    let existing = list_existing(store).await?;

    let mut tuples: HashSet<(String, String)> = desired.keys().cloned().collect();
    tuples.extend(existing.keys().cloned());

    for tuple in tuples {
        let want = desired.get(&tuple).copied().unwrap_or(0);
        let have = existing.get(&tuple).cloned().unwrap_or_default();
        reconcile_tuple(store, metrics, &tuple, want, &have).await?;
    }
    Ok(())
}

/// Existing launcher pods, grouped by `(node-name label, launcher-config-
/// name label)`, newest-first within each group (so "delete idle LIFO"
/// is just "take from the front").
async fn list_existing(
    store: &dyn ObjectStore,
) -> Result<HashMap<(String, String), Vec<Pod>>, ReconcileError> {
    let selector = LabelQuery::new().eq(labels::COMPONENT, labels::COMPONENT_LAUNCHER);
    let pods = store.list_pods(&selector).await?;

    let mut grouped: HashMap<(String, String), Vec<Pod>> = HashMap::new();
    for pod in pods {
        let node_name = models::meta::get_label(&pod.metadata, labels::NODE_NAME)
            .unwrap_or_default()
            .to_string();
        let lc_name = models::meta::get_label(&pod.metadata, labels::LAUNCHER_CONFIG_NAME)
            .unwrap_or_default()
            .to_string();
        grouped.entry((node_name, lc_name)).or_default().push(pod);
    }
    for pods in grouped.values_mut() {
        pods.sort_by(|a, b| {
            b.metadata
                .creation_timestamp
                .as_ref()
                .map(|t| t.0)
                .cmp(&a.metadata.creation_timestamp.as_ref().map(|t| t.0))
        });
    }
    Ok(grouped)
}

async fn reconcile_tuple(
    store: &dyn ObjectStore,
    metrics: &Metrics,
    (node_name, lc_name): &(String, String),
    want: u32,
    have: &[Pod],
) -> Result<(), ReconcileError> {
    let current = have.len() as u32;
    if want > current {
        for _ in 0..(want - current) {
            create_one(store, metrics, node_name, lc_name).await?;
        }
    } else if want < current {
        let mut to_remove = current - want;
        // LIFO: `have` is newest-first; only idle pods (no hosted
        // instances) are eligible, a pod mid-serving is never deleted out
        // from under its SRP (§4.4 invariants still apply here).
        for pod in have {
            if to_remove == 0 {
                break;
            }
            if !hosted::read(&pod.metadata).is_empty() {
                continue;
            }
            let Some(name) = pod.metadata.name.clone() else {
                continue;
            };
            store.delete_pod(&name).await?;
            Metrics::inc(&metrics.population_deleted);
            to_remove -= 1;
        }
        if to_remove > 0 {
            warn!(
                node = node_name,
                launcher_config = lc_name,
                still_over_by = to_remove,
                "population over target but all excess pods are hosting instances"
            );
        }
    }
    Ok(())
}

async fn create_one(
    store: &dyn ObjectStore,
    metrics: &Metrics,
    node_name: &str,
    lc_name: &str,
) -> Result<(), ReconcileError> {
    let Some(lc) = store.get_launcher_config(lc_name).await? else {
        return Err(ReconcileError::SemanticInput(format!(
            "LauncherPopulationPolicy references unknown LauncherConfig `{lc_name}`"
        )));
    };
    let inference_port = lc
        .spec
        .pod_template
        .spec
        .as_ref()
        .and_then(|s| s.containers.first())
        .and_then(|c| c.ports.as_ref())
        .and_then(|p| p.first())
        .map(|p| p.container_port)
        .unwrap_or(8000);

    let ctx = BindingContext {
        node_name: node_name.to_string(),
        accelerator_indices: Vec::new(),
        local_volume: None,
    };
    let mut pod = realizer::realize_launcher(&lc.spec.pod_template, &ctx, lc_name, inference_port)
        .map_err(|e| ReconcileError::SemanticInput(e.to_string()))?;

    if let Some(uid) = lc.metadata.uid.clone() {
        pod.metadata.owner_references = Some(vec![OwnerReference {
            api_version: LAUNCHER_CONFIG_API_VERSION.to_string(),
            kind: LAUNCHER_CONFIG_KIND.to_string(),
            name: lc_name.to_string(),
            uid,
            controller: Some(true),
            block_owner_deletion: Some(true),
        }]);
    }
    pod.metadata.name = Some(generate_pod_name(lc_name, node_name));
    pod.metadata.namespace = lc.metadata.namespace.clone();

    store.create_pod(pod).await?;
    Metrics::inc(&metrics.population_created);
    info!(node = node_name, launcher_config = lc_name, "created launcher pool pod");
    Ok(())
}

fn generate_pod_name(lc_name: &str, node_name: &str) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000);
    let short_node = node_name.chars().filter(|c| c.is_alphanumeric()).take(8).collect::<String>();
    format!("{lc_name}-{short_node}-{suffix:06}").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FakeObjectStore;
    use k8s_openapi::api::core::v1::{Container, Node, PodSpec, PodTemplateSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use models::crd::launcher_population_policy::{CountForLauncher, EnhancedNodeSelectorForNodeType};
    use models::crd::{LauncherConfig, LauncherConfigSpec, LauncherPopulationPolicy, LauncherPopulationPolicySpec};
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

    fn launcher_config(name: &str) -> LauncherConfig {
        LauncherConfig::new(
            name,
            LauncherConfigSpec {
                pod_template: PodTemplateSpec {
                    metadata: Some(ObjectMeta::default()),
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: models::srp::STUB_CONTAINER_NAME.to_string(),
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                },
                max_sleeping_instances: 1,
            },
        )
    }

    fn policy_wanting(lc_name: &str, count: u32) -> LauncherPopulationPolicy {
        LauncherPopulationPolicy::new(
            "lpp-1",
            LauncherPopulationPolicySpec {
                launcher_population_for_node_types: vec![EnhancedNodeSelectorForNodeType {
                    enhanced_node_selector: EnhancedNodeSelector::default(),
                    count_for_launcher: vec![CountForLauncher {
                        launcher_config_name: lc_name.to_string(),
                        launcher_count: count,
                        accelerator_selector: None,
                    }],
                }],
            },
        )
    }

    #[tokio::test]
    async fn creates_pods_up_to_the_desired_count() {
        let store = FakeObjectStore::new();
        store.seed_node(node("n1"));
        store.seed_lc("lc-1", launcher_config("lc-1"));
        store.seed_lpp(policy_wanting("lc-1", 3));
        let metrics = Metrics::default();

        reconcile_population(&store, &metrics).await.unwrap();

        assert_eq!(store.pod_count(), 3);
        assert_eq!(metrics.population_created.load(std::sync::atomic::Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn deletes_idle_pods_down_to_zero_when_policy_is_gone() {
        let store = FakeObjectStore::new();
        store.seed_node(node("n1"));
        store.seed_lc("lc-1", launcher_config("lc-1"));
        store.seed_lpp(policy_wanting("lc-1", 2));
        let metrics = Metrics::default();
        reconcile_population(&store, &metrics).await.unwrap();
        assert_eq!(store.pod_count(), 2);

        // The LPP is gone now: every tuple's desired count is implicitly
        // zero, even though it's absent from the map entirely.
        let store2 = FakeObjectStore::new();
        store2.seed_node(node("n1"));
        for pod in store.list_pods(&LabelQuery::new()).await.unwrap() {
            store2.seed_pod(pod);
        }
        reconcile_population(&store2, &metrics).await.unwrap();
        assert_eq!(store2.pod_count(), 0);
    }
}

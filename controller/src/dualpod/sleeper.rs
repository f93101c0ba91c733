//! Sleeper cap enforcement (§4.4 "Sleeper cap enforcement"): per node,
//! `|sleeping instances| <= SleeperLimit`, evict-oldest.

use std::sync::atomic::{AtomicU64, Ordering};

use k8s_openapi::api::core::v1::Pod;
use models::hosted;
use models::labels;

use crate::clients::ClientFactory;
use crate::errors::ReconcileError;
use crate::metrics::Metrics;
use crate::store::{LabelQuery, ObjectStore};

/// Monotonic stamp for sleep transitions, giving a total order over
/// "oldest sleeping instance" across launcher pods that share no clock
/// (§4.4 sleeper cap "evict-oldest"). One instance lives for the whole
/// controller process, shared by every reconcile.
#[derive(Default)]
pub struct SleepSequencer(AtomicU64);

impl SleepSequencer {
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

/// Scans every launcher pod on `node_name`, and if the node's total
/// sleeping-instance count exceeds `sleeper_limit`, evicts the globally
/// oldest sleeping instances (by `slept_seq`) until it no longer does —
/// even when that means reaching into a different launcher pod than the
/// one that just triggered the check.
pub async fn enforce_sleeper_cap(
    store: &dyn ObjectStore,
    clients: &dyn ClientFactory,
    metrics: &Metrics,
    node_name: &str,
    sleeper_limit: u32,
) -> Result<(), ReconcileError> {
    let selector = LabelQuery::new()
        .eq(labels::COMPONENT, labels::COMPONENT_LAUNCHER)
        .eq(labels::NODE_NAME, node_name);
    let pods = store.list_pods(&selector).await?;

    let mut entries: Vec<(Pod, String, u64)> = Vec::new();
    for pod in &pods {
        let hosted = hosted::read(&pod.metadata);
        for instance in &hosted.sleeping {
            entries.push((pod.clone(), instance.instance_id.clone(), instance.slept_seq));
        }
    }

    if entries.len() as u32 <= sleeper_limit {
        return Ok(());
    }
    let overflow = entries.len() as u32 - sleeper_limit;
    entries.sort_by_key(|(_, _, seq)| *seq);

    for (pod, instance_id, _) in entries.into_iter().take(overflow as usize) {
        evict_one(store, clients, &pod, &instance_id).await?;
        Metrics::inc(&metrics.sleeper_evictions);
    }
    Ok(())
}

/// The launcher's listening port isn't recoverable from its pod name or
/// labels alone; it was baked into the realized container spec at
/// creation time, so read it back from there instead of re-resolving the
/// `LauncherConfig` this pod was realized from.
fn launcher_port(pod: &Pod) -> i32 {
    pod.spec
        .as_ref()
        .and_then(|s| s.containers.first())
        .and_then(|c| c.ports.as_ref())
        .and_then(|ports| ports.first())
        .map(|p| p.container_port)
        .unwrap_or(8000)
}

async fn evict_one(
    store: &dyn ObjectStore,
    clients: &dyn ClientFactory,
    pod: &Pod,
    instance_id: &str,
) -> Result<(), ReconcileError> {
    if let Some(launcher) = clients.launcher_for(pod, launcher_port(pod)) {
        launcher
            .delete_instance(instance_id)
            .await
            .map_err(|e| ReconcileError::Transient(e.to_string()))?;
    }

    let mut hosted = hosted::read(&pod.metadata);
    hosted.evict_sleeping(instance_id);
    let mut updated = pod.clone();
    hosted::write(&mut updated.metadata, &hosted);
    store.update_pod(updated).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequencer_is_monotonic() {
        let seq = SleepSequencer::default();
        let a = seq.next();
        let b = seq.next();
        assert!(b > a);
    }
}

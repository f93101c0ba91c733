//! Wires C5's single-worker workqueue to watches over LPPs, LCs, Nodes,
//! and launcher pods (§4.5 "On any LPP/LC/Node/launcher-pod event").
//!
//! Every event, regardless of source, enqueues the same fixed key: C5
//! doesn't reconcile one object, it recomputes the whole desired
//! population map and diffs it against cluster state in one pass, so
//! there is exactly one unit of work, and the workqueue's per-key
//! coalescing collapses a burst of events into a single pending run.

use std::sync::Arc;

use futures_util::StreamExt;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client};
use models::crd::{LauncherConfig, LauncherPopulationPolicy};
use tracing::{error, warn};
use workqueue::{run_workers, InitialSyncGate, Item, ProcessOutcome, Queue};

use crate::metrics::Metrics;
use crate::population::reconcile::reconcile_population;
use crate::store::ObjectStore;

const POPULATION_KEY: &str = "population";

pub struct PopulationController {
    pub store: Arc<dyn ObjectStore>,
    pub metrics: Arc<Metrics>,
}

impl PopulationController {
    /// Single worker, per §4.5 "Single-worker queue".
    pub async fn spawn(self: Arc<Self>, client: Client, namespace: &str) -> Arc<InitialSyncGate> {
        let queue: Arc<Queue<Item<String>>> = Queue::with_default_backoff();

        let this = self.clone();
        let gate = run_workers(queue.clone(), 1, move |_key: String| {
            let this = this.clone();
            async move {
                match reconcile_population(this.store.as_ref(), this.metrics.as_ref()).await {
                    Ok(()) => ProcessOutcome::Success,
                    Err(e) if e.is_retryable() => ProcessOutcome::Requeue,
                    Err(e) => ProcessOutcome::Drop(Box::new(e)),
                }
            }
        })
        .await;

        let lpp_api: Api<LauncherPopulationPolicy> = Api::namespaced(client.clone(), namespace);
        let lc_api: Api<LauncherConfig> = Api::namespaced(client.clone(), namespace);
        let node_api: Api<Node> = Api::all(client.clone());
        let pod_api: Api<Pod> = Api::namespaced(client, namespace);

        tokio::spawn(watch_and_enqueue(lpp_api, queue.clone(), "LauncherPopulationPolicy"));
        tokio::spawn(watch_and_enqueue(lc_api, queue.clone(), "LauncherConfig"));
        tokio::spawn(watch_and_enqueue(node_api, queue.clone(), "Node"));
        tokio::spawn(watch_and_enqueue(pod_api, queue, "Pod"));

        gate
    }
}

async fn watch_and_enqueue<K>(api: Api<K>, queue: Arc<Queue<Item<String>>>, kind: &'static str)
where
    K: kube::Resource + Clone + std::fmt::Debug + serde::de::DeserializeOwned + Send + 'static,
    K::DynamicType: Default,
{
    let mut stream = Box::pin(watcher(api, watcher::Config::default()).default_backoff());
    while let Some(event) = stream.next().await {
        match event {
            Ok(_) => queue.add(Item::Key(POPULATION_KEY.to_string())).await,
            Err(e) => warn!(kind, error = %e, "watch stream error, retrying"),
        }
    }
    error!(kind, "watcher stream ended unexpectedly");
}

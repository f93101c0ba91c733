//! Wires C4's workqueue, watcher, and reconcile function into a single
//! running control loop (§4.1 concurrency core, §4.4).

use std::sync::Arc;

use futures_util::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::watcher;
use kube::Api;
use models::srp::SrpView;
use tracing::{error, info, warn};
use workqueue::{run_workers, InitialSyncGate, Item, ProcessOutcome, Queue};

use crate::clients::ClientFactory;
use crate::dualpod::reconcile::{reconcile_srp, Outcome, ReconcileContext};
use crate::dualpod::sleeper::SleepSequencer;
use crate::metrics::Metrics;
use crate::store::ObjectStore;

/// Everything a running C4 loop needs, owned behind `Arc`s so the
/// workqueue's per-key worker tasks (which must be `'static`) can each
/// hold a cheap clone.
pub struct DualPodController {
    pub store: Arc<dyn ObjectStore>,
    pub clients: Arc<dyn ClientFactory>,
    pub metrics: Arc<Metrics>,
    pub sleeper_limit: u32,
}

impl DualPodController {
    /// Spawns `num_workers` reconcile workers plus a watcher task feeding
    /// them, returning the gate so startup can wait for initial sync.
    pub async fn spawn(self: Arc<Self>, pod_api: Api<Pod>, num_workers: usize) -> Arc<InitialSyncGate> {
        let queue: Arc<Queue<Item<String>>> = Queue::with_default_backoff();
        let sleep_seq = Arc::new(SleepSequencer::default());

        let this = self.clone();
        let gate = run_workers(queue.clone(), num_workers, move |key: String| {
            let this = this.clone();
            let sleep_seq = sleep_seq.clone();
            async move {
                let ctx = ReconcileContext {
                    store: this.store.as_ref(),
                    clients: this.clients.as_ref(),
                    metrics: this.metrics.as_ref(),
                    sleep_seq: sleep_seq.as_ref(),
                    sleeper_limit: this.sleeper_limit,
                };
                match reconcile_srp(&ctx, &key).await {
                    Ok(Outcome::Settled) => ProcessOutcome::Success,
                    Ok(Outcome::Requeue) => ProcessOutcome::Requeue,
                    Ok(Outcome::Dropped) => ProcessOutcome::Success,
                    Err(e) if e.is_retryable() => ProcessOutcome::Requeue,
                    Err(e) => ProcessOutcome::Drop(Box::new(e)),
                }
            }
        })
        .await;

        tokio::spawn(watch_srps(pod_api, queue));
        gate
    }
}

/// Watches all pods in the namespace and enqueues the ones that are SRPs
/// (carry either `server-patch` or `inference-server-config`) on every
/// ADDED/MODIFIED/DELETED event. A plain namespace-wide watch rather than
/// a label selector, since "is this pod an SRP" is an annotation-presence
/// predicate the apiserver can't select on server-side.
///
/// Deletion only reaches `reconcile_srp` because `reconcile_srp` places
/// [`models::srp::FINALIZER`] on every SRP it sees: the apiserver turns a
/// delete of a finalized pod into a `deletionTimestamp` update rather than
/// an outright removal, which still fires `Applied` here and still passes
/// the SRP predicate below, so the name gets requeued instead of
/// vanishing before the reconciler's termination branch ever runs.
async fn watch_srps(pod_api: Api<Pod>, queue: Arc<Queue<Item<String>>>) {
    use kube::runtime::WatchStreamExt;

    let mut stream = Box::pin(watcher(pod_api, watcher::Config::default()).default_backoff());
    while let Some(event) = stream.next().await {
        match event {
            Ok(watcher::Event::Applied(pod)) => enqueue_if_srp(&queue, &pod).await,
            Ok(watcher::Event::Deleted(pod)) => enqueue_if_srp(&queue, &pod).await,
            Ok(watcher::Event::Restarted(pods)) => {
                for pod in &pods {
                    enqueue_if_srp(&queue, pod).await;
                }
            }
            Err(e) => warn!(error = %e, "SRP watch stream error, retrying"),
        }
    }
    error!("SRP watcher stream ended unexpectedly");
}

async fn enqueue_if_srp(queue: &Arc<Queue<Item<String>>>, pod: &Pod) {
    let view = SrpView::new(pod);
    if view.server_patch().is_some() || view.inference_server_config().is_some() {
        if let Ok(name) = view.name() {
            info!(srp = name, "enqueueing SRP reconcile");
            queue.add(Item::Key(name.to_string())).await;
        }
    }
}

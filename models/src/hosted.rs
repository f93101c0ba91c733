//! Per-launcher-pod hosted-instance bookkeeping.
//!
//! Not part of the distilled spec's controller-managed metadata table
//! (§6) — that table only names the pod-level `sleeping` label (a single
//! bool). But §4.4's candidate search step 2a ("an unbound launcher pod ...
//! with a sleeping instance whose instance-identity matches this SRP") and
//! the per-SPP state machine (`Empty → Hosting(id, active) →
//! Hosting(id, sleeping) → Empty`, up to `MaxSleepingInstances` sleeping at
//! once) both presuppose the controller can name *which* instances a
//! launcher pod currently holds and what each one's fast-path identity is.
//! Since the launcher's own HTTP surface (§4.6) only reports a pod-wide
//! `is_sleeping` bool, not a per-instance list, the controller is the only
//! place that can track this — so it is carried as its own annotation
//! alongside `sleeping`, written only by the controller (never part of
//! admission's frozen-on-user-edit set, since a user never has a reason to
//! see or set it).

use serde::{Deserialize, Serialize};

use crate::instance_identity::InstanceIdentity;
use crate::meta;

pub const HOSTED_INSTANCES: &str = "dual-pods.llm-d.ai/hosted-instances";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HostedInstance {
    pub instance_id: String,
    pub identity: InstanceIdentity,
    /// Monotonic counter stamped when this instance went to sleep, not a
    /// wall-clock timestamp. Sleeper-cap eviction (§4.4) is node-wide, so
    /// "oldest" has to be comparable across different launcher pods'
    /// independent sleeping lists; a shared counter the controller
    /// increments on every sleep transition gives a total order without
    /// relying on clock sync between reconciler passes.
    #[serde(default)]
    pub slept_seq: u64,
}

/// A launcher pod's current hosted set: at most one active instance, plus
/// up to `LauncherConfig.maxSleepingInstances` sleeping ones (invariant
/// I4).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LauncherHostedState {
    pub active: Option<HostedInstance>,
    #[serde(default)]
    pub sleeping: Vec<HostedInstance>,
}

impl LauncherHostedState {
    pub fn is_empty(&self) -> bool {
        self.active.is_none() && self.sleeping.is_empty()
    }

    pub fn sleeping_count(&self) -> usize {
        self.sleeping.len()
    }

    /// §4.4 candidate search step 2a: a sleeping instance whose identity
    /// matches the requested one, eligible for the wake fast path.
    pub fn find_sleeping_match(&self, wanted: &InstanceIdentity) -> Option<&HostedInstance> {
        self.sleeping.iter().find(|h| &h.identity == wanted)
    }

    pub fn wake(&mut self, instance_id: &str) -> Option<HostedInstance> {
        let idx = self.sleeping.iter().position(|h| h.instance_id == instance_id)?;
        let instance = self.sleeping.remove(idx);
        self.active = Some(instance.clone());
        Some(instance)
    }

    pub fn put_to_sleep(&mut self, slept_seq: u64) -> Option<HostedInstance> {
        let mut instance = self.active.take()?;
        instance.slept_seq = slept_seq;
        self.sleeping.push(instance.clone());
        Some(instance)
    }

    pub fn swap_in(&mut self, instance_id: impl Into<String>, identity: InstanceIdentity) {
        self.active = Some(HostedInstance {
            instance_id: instance_id.into(),
            identity,
            slept_seq: 0,
        });
    }

    pub fn evict_sleeping(&mut self, instance_id: &str) -> Option<HostedInstance> {
        let idx = self.sleeping.iter().position(|h| h.instance_id == instance_id)?;
        Some(self.sleeping.remove(idx))
    }

    /// Oldest-first eviction order is a queue invariant (insertion order),
    /// not a timestamp — the controller always pushes newly-slept
    /// instances to the back, so the front is always the longest-sleeping
    /// one (§4.4 sleeper cap "evict-oldest").
    pub fn oldest_sleeping(&self) -> Option<&HostedInstance> {
        self.sleeping.first()
    }
}

pub fn read(meta: &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta) -> LauncherHostedState {
    meta::get_annotation(meta, HOSTED_INSTANCES)
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_default()
}

pub fn write(
    meta: &mut k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta,
    state: &LauncherHostedState,
) {
    let raw = serde_json::to_string(state).expect("LauncherHostedState serializes infallibly");
    meta::set_annotation(meta, HOSTED_INSTANCES, raw);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(model: &str) -> InstanceIdentity {
        InstanceIdentity::new(model, "", [])
    }

    fn hosted(id: &str, model: &str, slept_seq: u64) -> HostedInstance {
        HostedInstance {
            instance_id: id.into(),
            identity: identity(model),
            slept_seq,
        }
    }

    #[test]
    fn wake_moves_instance_from_sleeping_to_active() {
        let mut state = LauncherHostedState::default();
        state.sleeping.push(hosted("i1", "llama", 0));
        let woke = state.wake("i1").unwrap();
        assert_eq!(woke.instance_id, "i1");
        assert!(state.sleeping.is_empty());
        assert_eq!(state.active.as_ref().unwrap().instance_id, "i1");
    }

    #[test]
    fn oldest_sleeping_is_first_inserted() {
        let mut state = LauncherHostedState::default();
        state.sleeping.push(hosted("old", "a", 1));
        state.sleeping.push(hosted("new", "b", 2));
        assert_eq!(state.oldest_sleeping().unwrap().instance_id, "old");
    }

    #[test]
    fn put_to_sleep_stamps_the_given_sequence() {
        let mut state = LauncherHostedState::default();
        state.active = Some(hosted("i1", "llama", 0));
        let slept = state.put_to_sleep(42).unwrap();
        assert_eq!(slept.slept_seq, 42);
        assert_eq!(state.sleeping[0].slept_seq, 42);
    }

    #[test]
    fn find_sleeping_match_by_identity() {
        let mut state = LauncherHostedState::default();
        state.sleeping.push(hosted("i1", "llama-3-8b", 0));
        assert!(state.find_sleeping_match(&identity("llama-3-8b")).is_some());
        assert!(state.find_sleeping_match(&identity("llama-3-70b")).is_none());
    }
}

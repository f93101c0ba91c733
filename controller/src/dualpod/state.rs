//! Per-SRP state machine (§4.4 "State machine (per SRP)").
//!
//! `SrpState` is derived, never stored directly — it is read off the
//! observed SRP/SPP pair on every reconcile (§5 "reconciliation must be
//! formulated as a pure function of observed state + time"), so there is
//! no risk of it drifting out of sync with the labels/annotations that are
//! the real source of truth.

use models::spp::SppView;
use models::srp::SrpView;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindKind {
    Fresh,
    Reused,
    Awakened,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SrpState {
    /// SRP observed; no `accelerators` annotation; stub not yet polled.
    New,
    /// Stub polled but has not returned a non-empty list; retry with
    /// exponential backoff.
    AcceleratorsPending,
    /// `dual` labels established on both SRP and SPP.
    Bound(BindKind),
    /// SPP reports `/health` OK; SRP's `/become-ready` invoked.
    Ready,
    /// SRP deleted → controller unbinds SPP.
    Terminating,
}

/// Derives the current `SrpState` from an observed SRP (and its paired SPP,
/// if bound). `bind_kind` is only meaningful immediately after a bind
/// decision is made (§4.4 "Bound(fresh|reused|awakened)"); once observed on
/// a later reconcile there is no durable record of *which* path produced
/// the binding, so a rebind-observed SRP is reported as `Bound(Reused)` —
/// the distinction only matters for the one reconcile pass that performs
/// the bind and logs/metrics it (see `dualpod::binding::BindDecision`).
pub fn derive_state(srp: &SrpView<'_>, spp_ready: Option<bool>) -> SrpState {
    if srp.deletion_timestamp() {
        return SrpState::Terminating;
    }
    if !srp.is_bound() {
        return if srp.has_accelerators() {
            // Accelerators known but not yet bound: still pending the
            // binding-selection step, which the reconciler performs in the
            // same pass it observes a non-empty accelerator list.
            SrpState::AcceleratorsPending
        } else {
            SrpState::New
        };
    }
    match spp_ready {
        Some(true) => SrpState::Ready,
        _ => SrpState::Bound(BindKind::Reused),
    }
}

/// Per-launcher-SPP hosted-instance lifecycle (§4.4 "Per-SPP states
/// (launcher only)"): `Empty → Hosting(active) → Hosting(sleeping) →
/// Empty`. Exposed for logging/metrics; the authoritative state lives in
/// `models::hosted::LauncherHostedState`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LauncherSlotState {
    Empty,
    HostingActive,
    HostingSleeping,
}

pub fn launcher_slot_state(spp: &SppView<'_>, hosted: &models::hosted::LauncherHostedState) -> LauncherSlotState {
    let _ = spp;
    if hosted.active.is_some() {
        LauncherSlotState::HostingActive
    } else if !hosted.sleeping.is_empty() {
        LauncherSlotState::HostingSleeping
    } else {
        LauncherSlotState::Empty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Pod;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn bare_pod() -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("srp-a".into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn unbound_without_accelerators_is_new() {
        let pod = bare_pod();
        assert_eq!(derive_state(&SrpView::new(&pod), None), SrpState::New);
    }

    #[test]
    fn deleted_srp_is_terminating_regardless_of_binding() {
        let mut pod = bare_pod();
        pod.metadata.deletion_timestamp = Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(
            chrono::Utc::now(),
        ));
        assert_eq!(derive_state(&SrpView::new(&pod), None), SrpState::Terminating);
    }
}

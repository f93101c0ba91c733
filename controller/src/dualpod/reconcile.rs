//! Top-level per-SRP reconcile function (C4, §4.4): composes state
//! derivation, accelerator polling, binding selection, atomic bind, and
//! the bound→ready→failure lifecycle into the single entry point the
//! workqueue worker calls per key.

use dualpod_clients::CreateInstanceRequest;
use models::crd::{InferenceServerConfig, LauncherConfig};
use models::spp::{SppView, SppViewMut};
use models::srp::{SrpView, SrpViewMut};
use models::status::SrpStatus;
use models::hosted;
use rand::Rng;

use crate::clients::ClientFactory;
use crate::dualpod::binding::{self, BindPath, LauncherCandidate};
use crate::dualpod::provider::Provider;
use crate::dualpod::sleeper::{self, SleepSequencer};
use crate::dualpod::state::{derive_state, SrpState};
use crate::errors::ReconcileError;
use crate::metrics::Metrics;
use crate::store::{ObjectStore, StoreError};

pub struct ReconcileContext<'a> {
    pub store: &'a dyn ObjectStore,
    pub clients: &'a dyn ClientFactory,
    pub metrics: &'a Metrics,
    pub sleep_seq: &'a SleepSequencer,
    pub sleeper_limit: u32,
}

/// Outcome of one reconcile pass, matching the workqueue harness's
/// `ProcessOutcome` vocabulary one level up from `ReconcileError` — see
/// `crate::dualpod::controller` for the translation.
pub enum Outcome {
    Settled,
    Requeue,
    Dropped,
}

pub async fn reconcile_srp(ctx: &ReconcileContext<'_>, srp_name: &str) -> Result<Outcome, ReconcileError> {
    let Some(srp) = ctx.store.get_pod(srp_name).await? else {
        return Ok(Outcome::Settled);
    };
    let view = SrpView::new(&srp);

    if view.deletion_timestamp() {
        return handle_terminating(ctx, &srp, &view).await;
    }

    if !view.has_finalizer() {
        // Placed before any other processing so a delete racing the very
        // first reconcile still gets observed (§4.4 "SRP deletion during
        // Bound", §9 orphan-healing): the object store must not finish
        // removing this SRP until the controller itself clears the
        // finalizer in `handle_terminating`.
        let mut updated = srp.clone();
        SrpViewMut::new(&mut updated).add_finalizer();
        ctx.store.update_pod(updated).await?;
        return Ok(Outcome::Requeue);
    }

    match derive_state(&view, None) {
        SrpState::New => poll_accelerators(ctx, &srp, &view).await,
        SrpState::AcceleratorsPending => select_and_bind(ctx, &srp, &view).await,
        SrpState::Bound(_) | SrpState::Ready => evaluate_bound(ctx, &srp, &view).await,
        SrpState::Terminating => unreachable!("handled above"),
    }
}

async fn poll_accelerators(
    ctx: &ReconcileContext<'_>,
    srp: &k8s_openapi::api::core::v1::Pod,
    view: &SrpView<'_>,
) -> Result<Outcome, ReconcileError> {
    let Some(stub) = ctx.clients.stub_for(srp, view.admin_port()) else {
        // No pod IP yet: not scheduled/started. Not a failure, just early.
        return Ok(Outcome::Requeue);
    };
    let accelerators = match stub.accelerators().await {
        Ok(ids) => ids,
        Err(_) => return Ok(Outcome::Requeue), // §4.4 "stub poll failure -> backoff, no SPP created"
    };
    if accelerators.is_empty() {
        return Ok(Outcome::Requeue);
    }

    let mut updated = srp.clone();
    SrpViewMut::new(&mut updated).set_accelerators(&accelerators);
    ctx.store.update_pod(updated).await?;
    Ok(Outcome::Requeue)
}

async fn select_and_bind(
    ctx: &ReconcileContext<'_>,
    srp: &k8s_openapi::api::core::v1::Pod,
    view: &SrpView<'_>,
) -> Result<Outcome, ReconcileError> {
    let (isc, lc) = match resolve_config(ctx, view).await {
        Ok(pair) => pair,
        Err(ReconcileError::SemanticInput(msg)) => {
            record_semantic_error(ctx, srp, &msg).await;
            return Ok(Outcome::Dropped);
        }
        Err(other) => return Err(other),
    };

    let Some(node_name) = view.node_name().map(str::to_string) else {
        // Not yet scheduled; nothing to select against.
        return Ok(Outcome::Requeue);
    };

    let provider = binding::determine_provider(view, isc.as_ref(), lc.as_ref())?;
    let accelerator_ids = view.accelerators();

    let bind_result = if provider.is_launcher() {
        bind_launcher(ctx, srp, view, &provider, lc.as_ref().expect("launcher provider implies an LC"), &node_name)
            .await
    } else {
        bind_direct(ctx, srp, view, &provider, &node_name).await
    };

    match bind_result {
        Ok((path, spp)) => {
            match binding::bind_atomic(ctx.store, srp.clone(), spp, &accelerator_ids).await {
                Ok(_) => {
                    record_bind_metric(ctx.metrics, path);
                    Ok(Outcome::Requeue)
                }
                Err(ReconcileError::Store(e)) if e.is_conflict() => Ok(Outcome::Requeue),
                Err(other) => Err(other),
            }
        }
        Err(ReconcileError::SemanticInput(msg)) => {
            record_semantic_error(ctx, srp, &msg).await;
            Ok(Outcome::Dropped)
        }
        Err(other) => Err(other),
    }
}

async fn resolve_config(
    ctx: &ReconcileContext<'_>,
    view: &SrpView<'_>,
) -> Result<(Option<InferenceServerConfig>, Option<LauncherConfig>), ReconcileError> {
    let Some(isc_name) = view.inference_server_config() else {
        return Ok((None, None));
    };
    let isc = ctx
        .store
        .get_inference_server_config(isc_name)
        .await?
        .ok_or_else(|| ReconcileError::SemanticInput(format!("unresolvable InferenceServerConfig `{isc_name}`")))?;
    let lc = match &isc.spec.launcher_config_name {
        None => None,
        Some(lc_name) => Some(
            ctx.store
                .get_launcher_config(lc_name)
                .await?
                .ok_or_else(|| ReconcileError::SemanticInput(format!("unresolvable LauncherConfig `{lc_name}`")))?,
        ),
    };
    Ok((Some(isc), lc))
}

async fn bind_direct(
    ctx: &ReconcileContext<'_>,
    srp: &k8s_openapi::api::core::v1::Pod,
    view: &SrpView<'_>,
    provider: &Provider,
    node_name: &str,
) -> Result<(BindPath, k8s_openapi::api::core::v1::Pod), ReconcileError> {
    let (realized, hash) = binding::expected_direct_hash(provider, srp, view, node_name)?;

    if let Some(existing) = binding::search_direct_candidate(ctx.store, node_name, &hash).await? {
        return Ok((BindPath::DirectRebind, existing));
    }

    let created = create_pod_with_retry(ctx, realized).await?;
    Ok((BindPath::DirectFresh, created))
}

async fn bind_launcher(
    ctx: &ReconcileContext<'_>,
    srp: &k8s_openapi::api::core::v1::Pod,
    view: &SrpView<'_>,
    provider: &Provider,
    lc: &LauncherConfig,
    node_name: &str,
) -> Result<(BindPath, k8s_openapi::api::core::v1::Pod), ReconcileError> {
    let Provider::Launcher {
        launcher_config_name,
        max_sleeping_instances,
        inference_port,
        identity,
    } = provider
    else {
        unreachable!("bind_launcher called with a non-launcher provider");
    };

    let candidate = binding::search_launcher_candidates(
        ctx.store,
        node_name,
        launcher_config_name,
        *max_sleeping_instances,
        identity,
    )
    .await?;

    match candidate {
        Some(LauncherCandidate::Wake { pod, instance_id }) => {
            let launcher = ctx
                .clients
                .launcher_for(&pod, *inference_port)
                .ok_or_else(|| ReconcileError::Transient("launcher pod has no IP yet".into()))?;
            launcher
                .wake_up()
                .await
                .map_err(|e| ReconcileError::Transient(e.to_string()))?;

            let mut hosted_state = hosted::read(&pod.metadata);
            hosted_state.wake(&instance_id);
            let mut updated = pod;
            hosted::write(&mut updated.metadata, &hosted_state);
            SppViewMut::new(&mut updated).set_sleeping(false);
            let persisted = ctx.store.update_pod(updated).await?;
            Ok((BindPath::LauncherAwaken, persisted))
        }
        Some(LauncherCandidate::SwapIn { pod }) => {
            let persisted = cold_start_into(ctx, pod, *inference_port, identity).await?;
            Ok((BindPath::LauncherSwapInExisting, persisted))
        }
        None => {
            let realized = binding::realize_new_launcher_pod(provider, &lc.spec.pod_template, view, node_name)?;
            let created = create_pod_with_retry(ctx, realized).await?;
            Metrics::inc(&ctx.metrics.cold_starts);
            let persisted = cold_start_into(ctx, created, *inference_port, identity).await?;
            Ok((BindPath::LauncherSwapInFresh, persisted))
        }
    }
}

async fn cold_start_into(
    ctx: &ReconcileContext<'_>,
    pod: k8s_openapi::api::core::v1::Pod,
    inference_port: i32,
    identity: &models::instance_identity::InstanceIdentity,
) -> Result<k8s_openapi::api::core::v1::Pod, ReconcileError> {
    let launcher = ctx
        .clients
        .launcher_for(&pod, inference_port)
        .ok_or_else(|| ReconcileError::Transient("launcher pod has no IP yet".into()))?;
    let request = CreateInstanceRequest {
        model_name: identity.model_name.clone(),
        options: identity.startup_options.clone(),
        env_vars: identity.env_vars.clone(),
    };
    let instance_id = launcher
        .create_instance(&request)
        .await
        .map_err(|e| ReconcileError::Transient(e.to_string()))?;

    let mut hosted_state = hosted::read(&pod.metadata);
    hosted_state.swap_in(instance_id, identity.clone());
    let mut updated = pod;
    hosted::write(&mut updated.metadata, &hosted_state);
    SppViewMut::new(&mut updated).set_sleeping(false);
    Ok(ctx.store.update_pod(updated).await?)
}

/// §4.4 Failure semantics: "SPP creation conflict (name taken) ->
/// regenerate name, retry."
async fn create_pod_with_retry(
    ctx: &ReconcileContext<'_>,
    mut pod: k8s_openapi::api::core::v1::Pod,
) -> Result<k8s_openapi::api::core::v1::Pod, ReconcileError> {
    const MAX_ATTEMPTS: u32 = 3;
    for attempt in 0..MAX_ATTEMPTS {
        match ctx.store.create_pod(pod.clone()).await {
            Ok(created) => return Ok(created),
            Err(StoreError::AlreadyExists { .. }) if attempt + 1 < MAX_ATTEMPTS => {
                let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000);
                let base = pod.metadata.name.clone().unwrap_or_default();
                pod.metadata.name = Some(format!("{base}-{suffix:06}"));
            }
            Err(other) => return Err(other.into()),
        }
    }
    unreachable!("loop either returns Ok or Err before exhausting MAX_ATTEMPTS")
}

fn record_bind_metric(metrics: &Metrics, path: BindPath) {
    match path.kind() {
        crate::dualpod::state::BindKind::Fresh => Metrics::inc(&metrics.binds_fresh),
        crate::dualpod::state::BindKind::Reused => Metrics::inc(&metrics.binds_reused),
        crate::dualpod::state::BindKind::Awakened => Metrics::inc(&metrics.binds_awakened),
    }
}

async fn evaluate_bound(
    ctx: &ReconcileContext<'_>,
    srp: &k8s_openapi::api::core::v1::Pod,
    view: &SrpView<'_>,
) -> Result<Outcome, ReconcileError> {
    let spp_name = view.dual().expect("Bound state implies a dual label");
    let Some(spp) = ctx.store.get_pod(spp_name).await? else {
        // SPP vanished out from under a bound SRP: unbind and let the next
        // pass reselect (§4.4 Failure semantics "not-ready SPP -> unbind +
        // reselect").
        unbind_srp(ctx, srp).await?;
        return Ok(Outcome::Requeue);
    };
    let spp_view = SppView::new(&spp);

    if spp_view.is_unhealthy() {
        unbind_srp(ctx, srp).await?;
        return Ok(Outcome::Requeue);
    }

    if spp_view.in_trouble() {
        recover_troubled_spp(ctx, &spp, &spp_view).await?;
        unbind_srp(ctx, srp).await?;
        return Ok(Outcome::Requeue);
    }

    let ready = if spp_view.is_launcher() {
        let port = spp
            .spec
            .as_ref()
            .and_then(|s| s.containers.first())
            .and_then(|c| c.ports.as_ref())
            .and_then(|ports| ports.first())
            .map(|p| p.container_port)
            .unwrap_or(8000);
        match ctx.clients.launcher_for(&spp, port) {
            Some(launcher) => match launcher.health().await {
                Ok(healthy) => healthy,
                Err(_) => return Ok(Outcome::Requeue), // backoff, don't mark unhealthy here; that is M-failures-tracked elsewhere
            },
            None => return Ok(Outcome::Requeue),
        }
    } else {
        spp_view.healthy_per_conditions()
    };

    if !ready {
        return Ok(Outcome::Requeue);
    }

    if let Some(stub) = ctx.clients.stub_for(srp, view.admin_port()) {
        let _ = stub.become_ready().await;
    }
    Ok(Outcome::Settled)
}

async fn recover_troubled_spp(
    ctx: &ReconcileContext<'_>,
    spp: &k8s_openapi::api::core::v1::Pod,
    spp_view: &SppView<'_>,
) -> Result<(), ReconcileError> {
    if spp_view.is_launcher() {
        if let Some(instance_id) = hosted::read(&spp.metadata).active.map(|a| a.instance_id) {
            let port = spp
                .spec
                .as_ref()
                .and_then(|s| s.containers.first())
                .and_then(|c| c.ports.as_ref())
                .and_then(|ports| ports.first())
                .map(|p| p.container_port)
                .unwrap_or(8000);
            if let Some(launcher) = ctx.clients.launcher_for(spp, port) {
                let _ = launcher.delete_instance(&instance_id).await;
            }
            let mut hosted_state = hosted::read(&spp.metadata);
            hosted_state.active = None;
            let mut updated = spp.clone();
            hosted::write(&mut updated.metadata, &hosted_state);
            SppViewMut::new(&mut updated).clear_dual();
            SppViewMut::new(&mut updated).clear_requester();
            let _ = ctx.store.update_pod(updated).await;
        }
    } else {
        let _ = ctx.store.delete_pod(spp_view.name().unwrap_or_default()).await;
    }
    Ok(())
}

async fn unbind_srp(ctx: &ReconcileContext<'_>, srp: &k8s_openapi::api::core::v1::Pod) -> Result<(), ReconcileError> {
    let mut updated = srp.clone();
    SrpViewMut::new(&mut updated).clear_dual();
    match ctx.store.update_pod(updated).await {
        Ok(_) | Err(StoreError::Conflict { .. }) => Ok(()),
        Err(other) => Err(other.into()),
    }
}

/// §4.4 Failure semantics: "SRP deletion during Bound -> unbind, delete
/// (direct) or sleep + Empty (launcher)." Finishes by clearing the
/// finalizer so the object store is free to actually remove the SRP;
/// until then its `deletionTimestamp` being set is what keeps this
/// reconcile entry point reachable at all (§9 orphan-healing).
async fn handle_terminating(
    ctx: &ReconcileContext<'_>,
    srp: &k8s_openapi::api::core::v1::Pod,
    view: &SrpView<'_>,
) -> Result<Outcome, ReconcileError> {
    if !view.has_finalizer() {
        return Ok(Outcome::Settled);
    }

    let Some(spp_name) = view.dual() else {
        return release_finalizer(ctx, srp).await;
    };
    let Some(spp) = ctx.store.get_pod(spp_name).await? else {
        return release_finalizer(ctx, srp).await;
    };
    let spp_view = SppView::new(&spp);

    if spp_view.is_launcher() {
        let port = spp
            .spec
            .as_ref()
            .and_then(|s| s.containers.first())
            .and_then(|c| c.ports.as_ref())
            .and_then(|ports| ports.first())
            .map(|p| p.container_port)
            .unwrap_or(8000);
        if let Some(launcher) = ctx.clients.launcher_for(&spp, port) {
            let _ = launcher.sleep().await;
        }
        let mut hosted_state = hosted::read(&spp.metadata);
        hosted_state.put_to_sleep(ctx.sleep_seq.next());
        let mut updated = spp.clone();
        hosted::write(&mut updated.metadata, &hosted_state);
        SppViewMut::new(&mut updated).set_sleeping(true);
        SppViewMut::new(&mut updated).clear_dual();
        SppViewMut::new(&mut updated).clear_requester();
        ctx.store.update_pod(updated).await?;

        let node_name = spp_view
            .node_name_label()
            .or_else(|| spp_view.scheduled_node_name())
            .unwrap_or_default()
            .to_string();
        sleeper::enforce_sleeper_cap(ctx.store, ctx.clients, ctx.metrics, &node_name, ctx.sleeper_limit).await?;
    } else {
        ctx.store.delete_pod(spp_view.name().unwrap_or_default()).await?;
    }
    release_finalizer(ctx, srp).await
}

/// Clears [`models::srp::FINALIZER`] on a terminating SRP, letting the
/// object store finish removing it.
async fn release_finalizer(
    ctx: &ReconcileContext<'_>,
    srp: &k8s_openapi::api::core::v1::Pod,
) -> Result<Outcome, ReconcileError> {
    let mut updated = srp.clone();
    SrpViewMut::new(&mut updated).remove_finalizer();
    match ctx.store.update_pod(updated).await {
        Ok(_) | Err(StoreError::Conflict { .. }) => Ok(Outcome::Settled),
        Err(other) => Err(other.into()),
    }
}

async fn record_semantic_error(ctx: &ReconcileContext<'_>, srp: &k8s_openapi::api::core::v1::Pod, message: &str) {
    let mut updated = srp.clone();
    SrpViewMut::new(&mut updated).set_status(&SrpStatus::with_error(message));
    let _ = ctx.store.update_pod(updated).await;
    Metrics::inc(&ctx.metrics.reconcile_errors);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::fake::{FakeClientFactory, FakeLauncherApi};
    use crate::store::FakeObjectStore;
    use k8s_openapi::api::core::v1::Pod;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use models::{hosted, labels};

    fn srp(name: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn direct_spp(name: &str, dual: &str) -> Pod {
        let mut pod = Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        SppViewMut::new(&mut pod).set_dual(dual);
        pod
    }

    fn launcher_spp(name: &str, dual: &str, instance_id: &str) -> Pod {
        let mut pod = Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(
                    [(labels::COMPONENT.to_string(), labels::COMPONENT_LAUNCHER.to_string())]
                        .into_iter()
                        .collect(),
                ),
                ..Default::default()
            },
            ..Default::default()
        };
        SppViewMut::new(&mut pod).set_dual(dual);
        let mut state = hosted::LauncherHostedState::default();
        state.swap_in(
            instance_id,
            models::instance_identity::InstanceIdentity::new("model-a", "{}", []),
        );
        hosted::write(&mut pod.metadata, &state);
        pod
    }

    fn ctx<'a>(store: &'a FakeObjectStore, clients: &'a FakeClientFactory, metrics: &'a Metrics, seq: &'a SleepSequencer) -> ReconcileContext<'a> {
        ReconcileContext {
            store,
            clients,
            metrics,
            sleep_seq: seq,
            sleeper_limit: 1,
        }
    }

    #[tokio::test]
    async fn first_reconcile_adds_finalizer_and_requeues() {
        let store = FakeObjectStore::new();
        store.seed_pod(srp("srp-a"));
        let clients = FakeClientFactory::new();
        let metrics = Metrics::default();
        let seq = SleepSequencer::default();

        let outcome = reconcile_srp(&ctx(&store, &clients, &metrics, &seq), "srp-a").await.unwrap();

        assert!(matches!(outcome, Outcome::Requeue));
        let persisted = store.get_pod("srp-a").await.unwrap().unwrap();
        assert!(SrpView::new(&persisted).has_finalizer());
    }

    #[tokio::test]
    async fn terminating_direct_srp_deletes_spp_and_clears_finalizer() {
        let store = FakeObjectStore::new();
        let mut pod = srp("srp-a");
        SrpViewMut::new(&mut pod).set_dual("spp-a");
        SrpViewMut::new(&mut pod).add_finalizer();
        store.seed_pod(pod);
        store.seed_pod(direct_spp("spp-a", "srp-a"));
        let clients = FakeClientFactory::new();
        let metrics = Metrics::default();
        let seq = SleepSequencer::default();

        store.delete_pod("srp-a").await.unwrap();
        let still_there = store.get_pod("srp-a").await.unwrap();
        assert!(still_there.is_some(), "finalized pod must stay observable after delete");

        let outcome = reconcile_srp(&ctx(&store, &clients, &metrics, &seq), "srp-a").await.unwrap();

        assert!(matches!(outcome, Outcome::Settled));
        assert!(store.get_pod("srp-a").await.unwrap().is_none(), "finalizer clear must let the delete finish");
        assert!(store.get_pod("spp-a").await.unwrap().is_none(), "direct SPP must be deleted");
    }

    #[tokio::test]
    async fn terminating_launcher_srp_sleeps_spp_and_clears_finalizer() {
        let store = FakeObjectStore::new();
        let mut pod = srp("srp-a");
        SrpViewMut::new(&mut pod).set_dual("spp-a");
        SrpViewMut::new(&mut pod).add_finalizer();
        store.seed_pod(pod);
        store.seed_pod(launcher_spp("spp-a", "srp-a", "inst-1"));
        let clients = FakeClientFactory::new().with_launcher("spp-a", std::sync::Arc::new(FakeLauncherApi::empty()));
        let metrics = Metrics::default();
        let seq = SleepSequencer::default();

        store.delete_pod("srp-a").await.unwrap();

        let outcome = reconcile_srp(&ctx(&store, &clients, &metrics, &seq), "srp-a").await.unwrap();

        assert!(matches!(outcome, Outcome::Settled));
        assert!(store.get_pod("srp-a").await.unwrap().is_none());
        let spp = store.get_pod("spp-a").await.unwrap().expect("launcher SPP is kept, only slept");
        assert_eq!(SppView::new(&spp).sleeping(), Some(true));
        assert!(!SppView::new(&spp).is_bound(), "unbound on termination");
        assert!(hosted::read(&spp.metadata).active.is_none());
        assert_eq!(hosted::read(&spp.metadata).sleeping.len(), 1);
    }

    #[tokio::test]
    async fn terminating_srp_with_no_dual_just_clears_finalizer() {
        let store = FakeObjectStore::new();
        let mut pod = srp("srp-a");
        SrpViewMut::new(&mut pod).add_finalizer();
        store.seed_pod(pod);
        let clients = FakeClientFactory::new();
        let metrics = Metrics::default();
        let seq = SleepSequencer::default();

        store.delete_pod("srp-a").await.unwrap();
        let outcome = reconcile_srp(&ctx(&store, &clients, &metrics, &seq), "srp-a").await.unwrap();

        assert!(matches!(outcome, Outcome::Settled));
        assert!(store.get_pod("srp-a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn non_finalized_delete_is_immediately_final() {
        // A pod that never went through a reconcile pass (no finalizer
        // yet) deletes the ordinary way: nothing is blocking it.
        let store = FakeObjectStore::new();
        store.seed_pod(srp("srp-a"));
        store.delete_pod("srp-a").await.unwrap();
        assert!(store.get_pod("srp-a").await.unwrap().is_none());
    }
}

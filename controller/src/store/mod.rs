//! The reconciler's only window onto cluster state (§5 "the object-store
//! cache is read-only from the reconciler's view; mutation happens only via
//! API calls whose results are re-observed as events").
//!
//! Reconcile logic in [`crate::dualpod`] and [`crate::population`] is
//! written purely against [`ObjectStore`], never against `kube::Api`
//! directly. That is what lets SPEC_FULL.md §6's "fake object store" test
//! strategy work: [`fake::FakeObjectStore`] implements the same trait
//! in-memory, with its own `resourceVersion` counter, so every reconcile
//! function can be exercised without a toolchain or a real apiserver.

mod fake;
mod kube_store;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use models::crd::{InferenceServerConfig, LauncherConfig, LauncherPopulationPolicy};
use models::node_selector::AcceleratorInventory;
use thiserror::Error;

pub use fake::FakeObjectStore;
pub use kube_store::KubeObjectStore;

/// A label-equality query (the only shape the reconciler ever needs: exact
/// match on one or more `key=value` pairs, e.g. `dual-pods.llm-d.ai/
/// launcher-config-name=lc1,dual-pods.llm-d.ai/node-name=n1`).
#[derive(Clone, Debug, Default)]
pub struct LabelQuery(pub Vec<(String, String)>);

impl LabelQuery {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn eq(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.push((key.into(), value.into()));
        self
    }

    pub fn matches(&self, pod: &Pod) -> bool {
        let empty = Default::default();
        let labels = pod.metadata.labels.as_ref().unwrap_or(&empty);
        self.0.iter().all(|(k, v)| labels.get(k) == Some(v))
    }

    /// Kubernetes selector syntax, used by the real `kube::Api` backend.
    pub fn to_selector_string(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object {kind} `{name}` not found")]
    NotFound { kind: &'static str, name: String },

    #[error("optimistic concurrency conflict updating {kind} `{name}`: expected resourceVersion `{expected}`, object has moved on")]
    Conflict {
        kind: &'static str,
        name: String,
        expected: String,
    },

    #[error("object {kind} `{name}` already exists")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("object store request failed: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether this is the specific "someone else wrote it first" failure
    /// that the binding algorithm's "on conflict, restart selection" clause
    /// names (§4.4 step 3), as opposed to any other backend failure.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// The narrow surface the dual-pods and launcher-population reconcilers
/// actually call through. Deliberately Pod/Node/CRD-shaped rather than a
/// generic `kube::Api<K>` passthrough, so a fake in-memory implementation
/// can back it without reimplementing a Kubernetes apiserver.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_pod(&self, name: &str) -> Result<Option<Pod>, StoreError>;

    async fn list_pods(&self, selector: &LabelQuery) -> Result<Vec<Pod>, StoreError>;

    /// Create, letting the backend assign `uid`/`creationTimestamp`/
    /// `resourceVersion`. Returns [`StoreError::AlreadyExists`] on a name
    /// collision (§4.4 Failure semantics: "SPP creation conflict (name
    /// taken) → regenerate name, retry").
    async fn create_pod(&self, pod: Pod) -> Result<Pod, StoreError>;

    /// Replace, enforcing that `pod.metadata.resource_version` still
    /// matches the stored object (§5 "all pod label/annotation writes use
    /// optimistic concurrency via the object-store's resourceVersion").
    /// Returns the object as persisted (with its new resourceVersion).
    async fn update_pod(&self, pod: Pod) -> Result<Pod, StoreError>;

    async fn delete_pod(&self, name: &str) -> Result<(), StoreError>;

    async fn get_node(&self, name: &str) -> Result<Option<Node>, StoreError>;

    async fn list_nodes(&self) -> Result<Vec<Node>, StoreError>;

    /// Accelerator inventory for a node. Sourced from the (out-of-scope)
    /// device-plugin layer; modeled here as part of the object store's
    /// surface since the reconciler only ever reads it, never writes it.
    async fn accelerator_inventory(&self, node_name: &str) -> Result<AcceleratorInventory, StoreError>;

    async fn get_inference_server_config(
        &self,
        name: &str,
    ) -> Result<Option<InferenceServerConfig>, StoreError>;

    async fn get_launcher_config(&self, name: &str) -> Result<Option<LauncherConfig>, StoreError>;

    async fn list_launcher_population_policies(&self) -> Result<Vec<LauncherPopulationPolicy>, StoreError>;
}

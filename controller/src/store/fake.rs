//! In-memory [`ObjectStore`] used by `controller`'s own test suite
//! (SPEC_FULL.md §6 "controller's reconcile functions get tests against an
//! in-memory fake object store ... since they cannot honestly be tested
//! against a real apiserver without the toolchain").
//!
//! Not behind `#[cfg(test)]` at the module level so both `dualpod::tests`
//! and `population::tests` can import it across module boundaries within
//! this crate; it is still never constructed from `main`.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use models::crd::{InferenceServerConfig, LauncherConfig, LauncherPopulationPolicy};
use models::node_selector::AcceleratorInventory;

use super::{LabelQuery, ObjectStore, StoreError};

#[derive(Default)]
struct Inner {
    pods: HashMap<String, Pod>,
    next_rv: u64,
    nodes: HashMap<String, Node>,
    inventories: HashMap<String, AcceleratorInventory>,
    iscs: HashMap<String, InferenceServerConfig>,
    lcs: HashMap<String, LauncherConfig>,
    lpps: Vec<LauncherPopulationPolicy>,
}

/// A `HashMap`-backed stand-in for the cluster object store, narrow enough
/// to implement by hand and faithful enough (resourceVersion bump on every
/// write, conflict on stale replace) to exercise the binding algorithm's
/// concurrency story.
pub struct FakeObjectStore {
    inner: Mutex<Inner>,
}

impl FakeObjectStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    fn next_rv(inner: &mut Inner) -> String {
        inner.next_rv += 1;
        inner.next_rv.to_string()
    }

    /// Test helper: seed a pod directly, bypassing `create_pod`'s
    /// collision check, with a fresh resourceVersion assigned.
    pub fn seed_pod(&self, mut pod: Pod) {
        let mut inner = self.inner.lock().unwrap();
        let rv = Self::next_rv(&mut inner);
        pod.metadata.resource_version = Some(rv);
        if pod.metadata.creation_timestamp.is_none() {
            pod.metadata.creation_timestamp =
                Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(
                    chrono::DateTime::from_timestamp(inner.next_rv as i64, 0).unwrap(),
                ));
        }
        let name = pod.metadata.name.clone().expect("seeded pod needs a name");
        inner.pods.insert(name, pod);
    }

    pub fn seed_node(&self, node: Node) {
        let name = node.metadata.name.clone().expect("seeded node needs a name");
        self.inner.lock().unwrap().nodes.insert(name, node);
    }

    pub fn seed_inventory(&self, node_name: impl Into<String>, inventory: AcceleratorInventory) {
        self.inner.lock().unwrap().inventories.insert(node_name.into(), inventory);
    }

    pub fn seed_isc(&self, name: impl Into<String>, isc: InferenceServerConfig) {
        self.inner.lock().unwrap().iscs.insert(name.into(), isc);
    }

    pub fn seed_lc(&self, name: impl Into<String>, lc: LauncherConfig) {
        self.inner.lock().unwrap().lcs.insert(name.into(), lc);
    }

    pub fn seed_lpp(&self, lpp: LauncherPopulationPolicy) {
        self.inner.lock().unwrap().lpps.push(lpp);
    }

    pub fn pod_count(&self) -> usize {
        self.inner.lock().unwrap().pods.len()
    }
}

impl Default for FakeObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn get_pod(&self, name: &str) -> Result<Option<Pod>, StoreError> {
        Ok(self.inner.lock().unwrap().pods.get(name).cloned())
    }

    async fn list_pods(&self, selector: &LabelQuery) -> Result<Vec<Pod>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .pods
            .values()
            .filter(|p| selector.matches(p))
            .cloned()
            .collect())
    }

    async fn create_pod(&self, mut pod: Pod) -> Result<Pod, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let name = pod.metadata.name.clone().ok_or_else(|| StoreError::Backend("pod has no name".into()))?;
        if inner.pods.contains_key(&name) {
            return Err(StoreError::AlreadyExists { kind: "Pod", name });
        }
        let rv = Self::next_rv(&mut inner);
        pod.metadata.resource_version = Some(rv);
        if pod.metadata.creation_timestamp.is_none() {
            pod.metadata.creation_timestamp =
                Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(
                    chrono::DateTime::from_timestamp(inner.next_rv as i64, 0).unwrap(),
                ));
        }
        if pod.metadata.uid.is_none() {
            pod.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        }
        inner.pods.insert(name, pod.clone());
        Ok(pod)
    }

    async fn update_pod(&self, mut pod: Pod) -> Result<Pod, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let name = pod.metadata.name.clone().ok_or_else(|| StoreError::Backend("pod has no name".into()))?;
        let current = inner
            .pods
            .get(&name)
            .ok_or_else(|| StoreError::NotFound { kind: "Pod", name: name.clone() })?;
        let expected = pod.metadata.resource_version.clone();
        if expected != current.metadata.resource_version {
            return Err(StoreError::Conflict {
                kind: "Pod",
                name,
                expected: expected.unwrap_or_default(),
            });
        }
        let rv = Self::next_rv(&mut inner);
        pod.metadata.resource_version = Some(rv);
        pod.metadata.creation_timestamp = current.metadata.creation_timestamp.clone();
        pod.metadata.uid = current.metadata.uid.clone();

        // Mirrors the apiserver finishing a pending delete the moment the
        // last finalizer clears: once `deletionTimestamp` is set, the
        // object disappears for good as soon as `finalizers` goes empty,
        // rather than staying around for a caller to remove explicitly.
        if pod.metadata.deletion_timestamp.is_some()
            && pod.metadata.finalizers.as_ref().map(Vec::is_empty).unwrap_or(true)
        {
            inner.pods.remove(&name);
            return Ok(pod);
        }

        inner.pods.insert(name, pod.clone());
        Ok(pod)
    }

    /// Mirrors the apiserver: a pod carrying finalizers is marked for
    /// deletion (`deletionTimestamp` set) but stays observable until the
    /// controller clears them via `update_pod`; only a pod with no
    /// finalizers is removed immediately.
    async fn delete_pod(&self, name: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let has_finalizers = inner
            .pods
            .get(name)
            .ok_or_else(|| StoreError::NotFound { kind: "Pod", name: name.to_string() })?
            .metadata
            .finalizers
            .as_ref()
            .map(|f| !f.is_empty())
            .unwrap_or(false);

        if has_finalizers {
            let rv = Self::next_rv(&mut inner);
            let pod = inner.pods.get_mut(name).expect("checked above");
            pod.metadata.resource_version = Some(rv);
            pod.metadata.deletion_timestamp =
                Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(chrono::Utc::now()));
            Ok(())
        } else {
            inner.pods.remove(name);
            Ok(())
        }
    }

    async fn get_node(&self, name: &str) -> Result<Option<Node>, StoreError> {
        Ok(self.inner.lock().unwrap().nodes.get(name).cloned())
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, StoreError> {
        Ok(self.inner.lock().unwrap().nodes.values().cloned().collect())
    }

    async fn accelerator_inventory(&self, node_name: &str) -> Result<AcceleratorInventory, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .inventories
            .get(node_name)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_inference_server_config(
        &self,
        name: &str,
    ) -> Result<Option<InferenceServerConfig>, StoreError> {
        Ok(self.inner.lock().unwrap().iscs.get(name).cloned())
    }

    async fn get_launcher_config(&self, name: &str) -> Result<Option<LauncherConfig>, StoreError> {
        Ok(self.inner.lock().unwrap().lcs.get(name).cloned())
    }

    async fn list_launcher_population_policies(&self) -> Result<Vec<LauncherPopulationPolicy>, StoreError> {
        Ok(self.inner.lock().unwrap().lpps.clone())
    }
}

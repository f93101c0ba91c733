//! Real [`ObjectStore`] backend: a thin client of the cluster's object
//! store (Kubernetes apiserver), built on `kube`/`k8s-openapi` (§1 "the
//! cluster's object store / API server ... controller and
//! admission-webhook are clients of it, not a reimplementation of it").

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, ListParams, PostParams};
use kube::Client;
use models::crd::{InferenceServerConfig, LauncherConfig, LauncherPopulationPolicy};
use models::node_selector::AcceleratorInventory;

use super::{LabelQuery, ObjectStore, StoreError};

/// Annotation the (out-of-scope) device-plugin layer is assumed to stamp
/// onto a `Node` with its accelerator inventory, serialized the same way
/// `models::node_selector::AcceleratorInventory` round-trips through JSON.
/// Reading it here, rather than a dedicated CRD, keeps this client-only
/// crate from having to own a fourth CRD type for something §1 places
/// outside the reconciliation engine's scope.
const ACCELERATOR_INVENTORY_ANNOTATION: &str = "dual-pods.llm-d.ai/accelerator-inventory";

pub struct KubeObjectStore {
    pods: Api<Pod>,
    nodes: Api<Node>,
    iscs: Api<InferenceServerConfig>,
    lcs: Api<LauncherConfig>,
    lpps: Api<LauncherPopulationPolicy>,
}

impl KubeObjectStore {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            pods: Api::namespaced(client.clone(), namespace),
            nodes: Api::all(client.clone()),
            iscs: Api::namespaced(client.clone(), namespace),
            lcs: Api::namespaced(client.clone(), namespace),
            lpps: Api::namespaced(client, namespace),
        }
    }
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    async fn get_pod(&self, name: &str) -> Result<Option<Pod>, StoreError> {
        match self.pods.get(name).await {
            Ok(pod) => Ok(Some(pod)),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
            Err(e) => Err(StoreError::Backend(e.to_string())),
        }
    }

    async fn list_pods(&self, selector: &LabelQuery) -> Result<Vec<Pod>, StoreError> {
        let lp = ListParams::default().labels(&selector.to_selector_string());
        let list = self.pods.list(&lp).await.map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(list.items)
    }

    async fn create_pod(&self, pod: Pod) -> Result<Pod, StoreError> {
        let name = pod.metadata.name.clone().unwrap_or_default();
        match self.pods.create(&PostParams::default(), &pod).await {
            Ok(created) => Ok(created),
            Err(kube::Error::Api(e)) if e.code == 409 => {
                Err(StoreError::AlreadyExists { kind: "Pod", name })
            }
            Err(e) => Err(StoreError::Backend(e.to_string())),
        }
    }

    async fn update_pod(&self, pod: Pod) -> Result<Pod, StoreError> {
        let name = pod.metadata.name.clone().unwrap_or_default();
        let expected_rv = pod.metadata.resource_version.clone().unwrap_or_default();
        // `replace` sends the resourceVersion in the body; the apiserver
        // enforces optimistic concurrency and returns 409 on mismatch,
        // which is exactly the precondition §5 asks for.
        match self.pods.replace(&name, &PostParams::default(), &pod).await {
            Ok(updated) => Ok(updated),
            Err(kube::Error::Api(e)) if e.code == 409 => Err(StoreError::Conflict {
                kind: "Pod",
                name,
                expected: expected_rv,
            }),
            Err(e) => Err(StoreError::Backend(e.to_string())),
        }
    }

    async fn delete_pod(&self, name: &str) -> Result<(), StoreError> {
        match self.pods.delete(name, &Default::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(e) => Err(StoreError::Backend(e.to_string())),
        }
    }

    async fn get_node(&self, name: &str) -> Result<Option<Node>, StoreError> {
        match self.nodes.get(name).await {
            Ok(node) => Ok(Some(node)),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
            Err(e) => Err(StoreError::Backend(e.to_string())),
        }
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, StoreError> {
        let list = self
            .nodes
            .list(&ListParams::default())
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(list.items)
    }

    async fn accelerator_inventory(&self, node_name: &str) -> Result<AcceleratorInventory, StoreError> {
        let Some(node) = self.get_node(node_name).await? else {
            return Ok(AcceleratorInventory::default());
        };
        let Some(raw) = node
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(ACCELERATOR_INVENTORY_ANNOTATION))
        else {
            return Ok(AcceleratorInventory::default());
        };
        serde_json::from_str(raw).map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn get_inference_server_config(
        &self,
        name: &str,
    ) -> Result<Option<InferenceServerConfig>, StoreError> {
        match self.iscs.get(name).await {
            Ok(isc) => Ok(Some(isc)),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
            Err(e) => Err(StoreError::Backend(e.to_string())),
        }
    }

    async fn get_launcher_config(&self, name: &str) -> Result<Option<LauncherConfig>, StoreError> {
        match self.lcs.get(name).await {
            Ok(lc) => Ok(Some(lc)),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
            Err(e) => Err(StoreError::Backend(e.to_string())),
        }
    }

    async fn list_launcher_population_policies(&self) -> Result<Vec<LauncherPopulationPolicy>, StoreError> {
        let list = self
            .lpps
            .list(&ListParams::default())
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(list.items)
    }
}

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// `InferenceServerConfig` CR (§3, §6): model name, startup options, env,
/// referenced `LauncherConfig` (milestone-3).
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "fma.llm-d.ai",
    version = "v1alpha1",
    kind = "InferenceServerConfig",
    singular = "inferenceserverconfig",
    plural = "inferenceserverconfigs",
    shortname = "isc",
    namespaced,
    printcolumn = r#"{"name":"LauncherConfig", "type":"string", "jsonPath":".spec.launcherConfigName"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct InferenceServerConfigSpec {
    pub model_server_config: ModelServerConfig,

    /// Absent means this ISC resolves to a direct provider; present means
    /// launcher (§4.4 step 1).
    #[serde(default)]
    pub launcher_config_name: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModelServerConfig {
    pub model_name: String,

    pub port: u16,

    #[serde(default)]
    pub options: String,

    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl InferenceServerConfigSpec {
    pub fn is_launcher_based(&self) -> bool {
        self.launcher_config_name.is_some()
    }

    pub fn instance_identity(&self) -> crate::instance_identity::InstanceIdentity {
        crate::instance_identity::InstanceIdentity::new(
            self.model_server_config.model_name.clone(),
            self.model_server_config.options.clone(),
            self.model_server_config.env_vars.clone(),
        )
    }
}

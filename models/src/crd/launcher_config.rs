use k8s_openapi::api::core::v1::PodTemplateSpec;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// `LauncherConfig` CR (§3, §6): pod template for a launcher;
/// `maxSleepingInstances`.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "fma.llm-d.ai",
    version = "v1alpha1",
    kind = "LauncherConfig",
    singular = "launcherconfig",
    plural = "launcherconfigs",
    shortname = "lc",
    namespaced,
    printcolumn = r#"{"name":"MaxSleeping", "type":"integer", "jsonPath":".spec.maxSleepingInstances"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct LauncherConfigSpec {
    pub pod_template: PodTemplateSpec,

    /// Invariant I4: a launcher pod never hosts more than this many
    /// sleeping instances plus one active one.
    pub max_sleeping_instances: u32,
}

//! The three CRDs (§3, §6). Canonical shape decision recorded in
//! SPEC_FULL.md §9: `group = "fma.llm-d.ai"`, `version = "v1alpha1"` — the
//! spec's Open Question calls the `fma/v1alpha1` `LauncherPopulationPolicy`
//! "most complete" among several coexisting shapes; the other two CRDs are
//! given matching group/version for a single coherent API group.

pub mod inference_server_config;
pub mod launcher_config;
pub mod launcher_population_policy;

pub use inference_server_config::{InferenceServerConfig, InferenceServerConfigSpec, ModelServerConfig};
pub use launcher_config::{LauncherConfig, LauncherConfigSpec};
pub use launcher_population_policy::{
    CountForLauncher, EnhancedNodeSelectorForNodeType, LauncherPopulationPolicy,
    LauncherPopulationPolicySpec,
};

//! Direct-vs-launcher polymorphism as a tagged variant (§9 "Dynamic
//! dispatch / polymorphism"): `Provider = Direct { .. } | Launcher { .. }`
//! with a common capability set the reconciler dispatches on rather than
//! reaching for a trait object.

use k8s_openapi::api::core::v1::{Pod, PodTemplateSpec};
use models::binding::BindingContext;
use models::instance_identity::InstanceIdentity;

use realizer::RealizerError;

#[derive(Clone, Debug)]
pub enum Provider {
    Direct {
        patch_template: String,
    },
    Launcher {
        launcher_config_name: String,
        max_sleeping_instances: u32,
        inference_port: i32,
        identity: InstanceIdentity,
    },
}

impl Provider {
    pub fn is_launcher(&self) -> bool {
        matches!(self, Provider::Launcher { .. })
    }

    /// `realize(ctx) → PodSpec` (§9). Only meaningful for `Direct`: a
    /// launcher realization needs the `LauncherConfig`'s pod template,
    /// which the caller must supply since it is not part of the binding
    /// decision itself (a launcher pod, once it exists, is realized once
    /// at creation time — see `realize_launcher_pod`).
    pub fn realize_direct(&self, srp: &Pod, ctx: &BindingContext) -> Result<Pod, RealizerError> {
        match self {
            Provider::Direct { patch_template } => realizer::realize_direct(srp, patch_template, ctx),
            Provider::Launcher { .. } => {
                unreachable!("realize_direct called on a Launcher provider")
            }
        }
    }

    pub fn realize_launcher_pod(
        &self,
        template: &PodTemplateSpec,
        ctx: &BindingContext,
    ) -> Result<Pod, RealizerError> {
        match self {
            Provider::Launcher {
                launcher_config_name,
                inference_port,
                ..
            } => realizer::realize_launcher(template, ctx, launcher_config_name, *inference_port),
            Provider::Direct { .. } => unreachable!("realize_launcher_pod called on a Direct provider"),
        }
    }
}

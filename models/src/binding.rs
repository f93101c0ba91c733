//! Binding context (§4.3): the inputs a pod template realization needs
//! beyond the template itself.

use serde::{Deserialize, Serialize};

/// `{NodeName, AcceleratorIndices, LocalVolume}` — the three fields the
/// `server-patch` template whitelist may reference (§9 Templating), and the
/// context the realizer pins a pod to.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BindingContext {
    pub node_name: String,

    /// Ordered, deterministic — this ordering is what makes the realizer's
    /// output byte-identical for identical inputs (§4.3 Determinism).
    pub accelerator_indices: Vec<u32>,

    pub local_volume: Option<String>,
}

impl BindingContext {
    /// `CUDA_VISIBLE_DEVICES` value for this context's accelerator set.
    pub fn cuda_visible_devices(&self) -> String {
        self.accelerator_indices
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

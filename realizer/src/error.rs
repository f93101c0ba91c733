use thiserror::Error;

/// Errors produced while turning a template + binding context into a
/// concrete server-providing pod (§4.3).
#[derive(Debug, Error)]
pub enum RealizerError {
    #[error(transparent)]
    Model(#[from] models::ModelError),

    #[error("server-patch template is not valid JSON once expanded: {0}")]
    InvalidPatchJson(#[from] serde_json::Error),

    #[error("realized pod has no `{0}` container to inject accelerator/probe settings into")]
    MissingContainer(&'static str),

    #[error("realized value did not round-trip to a Pod: {0}")]
    MalformedPod(String),
}

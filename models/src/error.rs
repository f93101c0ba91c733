use thiserror::Error;

/// Errors produced while reading or writing the SRP/SPP label/annotation
/// protocol.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("pod is missing required annotation `{0}`")]
    MissingAnnotation(&'static str),

    #[error("pod annotation `{key}` could not be parsed: {source}")]
    MalformedAnnotation {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("pod is missing metadata.name")]
    MissingName,

    #[error("node selector references an unsupported operator `{0}`")]
    UnsupportedSelectorOperator(String),

    #[error("server-patch template references an unknown field `{{{0}}}`")]
    UnknownTemplateField(String),

    #[error("server-patch template is malformed: {0}")]
    MalformedTemplate(String),
}

use thiserror::Error;

/// Errors talking to the (out-of-scope) stub server or launcher process.
/// One variant per failure the reconciler's failure semantics (§4.4) needs
/// to distinguish between transient-retry and give-up.
#[derive(Debug, Error)]
pub enum DualPodClientError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned non-success status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("response body from {url} was not the expected shape: {source}")]
    MalformedBody {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} timed out")]
    Timeout { url: String },
}

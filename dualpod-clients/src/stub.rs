//! Client for the requester-side stub server (C6, §4.6). The stub process
//! itself is out of scope (§1); this is the client facade the reconciler
//! calls through.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::DualPodClientError;
use crate::timeout::DEFAULT_TIMEOUT;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AcceleratorMemoryResponse {
    pub bytes_per_accelerator: std::collections::BTreeMap<String, i64>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LogResponse {
    pub lines: Vec<String>,
    pub next_start_pos: u64,
}

/// One client per SRP's admin port; constructed from a shared
/// `reqwest::Client` (connection pooling, consistent timeouts), matching
/// the `services/health.rs` pattern of one configured client per process
/// rather than one per call (§4.6 Ambient addition).
#[derive(Clone)]
pub struct StubClient {
    client: Client,
    base_url: String,
}

impl StubClient {
    pub fn new(client: Client, host: &str, admin_port: u16) -> Self {
        Self {
            client,
            base_url: format!("http://{host}:{admin_port}"),
        }
    }

    /// `GET /dual-pod/accelerators` — a bare JSON array, not an object
    /// (§4.6/§6): `["gpu-0","gpu-1"]`, non-empty meaning discovery is
    /// complete.
    pub async fn accelerators(&self) -> Result<Vec<String>, DualPodClientError> {
        self.get("/dual-pod/accelerators").await
    }

    pub async fn accelerator_memory(&self) -> Result<AcceleratorMemoryResponse, DualPodClientError> {
        self.get("/dual-pod/accelerator-memory").await
    }

    pub async fn ready(&self) -> Result<bool, DualPodClientError> {
        let resp: ReadyResponse = self.get("/ready").await?;
        Ok(resp.ready)
    }

    pub async fn become_ready(&self) -> Result<(), DualPodClientError> {
        self.post_empty("/become-ready").await
    }

    pub async fn become_unready(&self) -> Result<(), DualPodClientError> {
        self.post_empty("/become-unready").await
    }

    pub async fn log(&self, start_pos: u64) -> Result<LogResponse, DualPodClientError> {
        let url = format!("{}/log?startPos={start_pos}", self.base_url);
        let resp = self
            .client
            .get(&url)
            .timeout(DEFAULT_TIMEOUT)
            .send()
            .await
            .map_err(|source| to_request_error(&url, source))?;
        check_status(&url, &resp)?;
        resp.json()
            .await
            .map_err(|source| DualPodClientError::MalformedBody { url, source })
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, DualPodClientError> {
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .client
            .get(&url)
            .timeout(DEFAULT_TIMEOUT)
            .send()
            .await
            .map_err(|source| to_request_error(&url, source))?;
        check_status(&url, &resp)?;
        resp.json()
            .await
            .map_err(|source| DualPodClientError::MalformedBody { url, source })
    }

    async fn post_empty(&self, path: &str) -> Result<(), DualPodClientError> {
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .client
            .post(&url)
            .timeout(DEFAULT_TIMEOUT)
            .send()
            .await
            .map_err(|source| to_request_error(&url, source))?;
        check_status(&url, &resp)
    }
}

fn to_request_error(url: &str, source: reqwest::Error) -> DualPodClientError {
    if source.is_timeout() {
        DualPodClientError::Timeout { url: url.to_string() }
    } else {
        DualPodClientError::Request {
            url: url.to_string(),
            source,
        }
    }
}

fn check_status(url: &str, resp: &reqwest::Response) -> Result<(), DualPodClientError> {
    if resp.status().is_success() {
        Ok(())
    } else {
        Err(DualPodClientError::Status {
            url: url.to_string(),
            status: resp.status(),
        })
    }
}

/// Accelerator-availability poll cadence (§4.6): ~1s plus jitter, so that
/// many stub clients polling in lockstep don't thunder against the same
/// process on restart.
pub fn accelerator_poll_interval() -> Duration {
    crate::timeout::jittered(Duration::from_secs(1), Duration::from_millis(250))
}

/// Health poll cadence (§4.6): ~5s.
pub fn health_poll_interval() -> Duration {
    Duration::from_secs(5)
}

#[cfg(test)]
mod tests {
    #[test]
    fn accelerators_response_is_a_bare_array() {
        // §4.6/§6: "JSON array of accelerator identifiers", not an object.
        let ids: Vec<String> = serde_json::from_str(r#"["gpu-0","gpu-1"]"#).unwrap();
        assert_eq!(ids, vec!["gpu-0".to_string(), "gpu-1".to_string()]);
    }
}

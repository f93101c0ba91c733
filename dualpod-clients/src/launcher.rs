//! Client for the launcher process (C6, §4.6). The launcher process
//! itself is out of scope (§1); this is the client facade the reconciler
//! calls through for instance create/delete/sleep/wake.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::DualPodClientError;
use crate::timeout::{DEFAULT_TIMEOUT, MODEL_LEVEL_TIMEOUT};

#[derive(Clone, Debug, Serialize)]
pub struct CreateInstanceRequest {
    pub model_name: String,
    pub options: String,
    pub env_vars: std::collections::BTreeMap<String, String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CreateInstanceResponse {
    pub id: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct IsSleepingResponse {
    pub is_sleeping: bool,
}

/// One client per launcher SPP, sharing a process-wide `reqwest::Client`
/// (§4.6 Ambient addition).
#[derive(Clone)]
pub struct LauncherClient {
    client: Client,
    base_url: String,
}

impl LauncherClient {
    pub fn new(client: Client, host: &str, port: u16) -> Self {
        Self {
            client,
            base_url: format!("http://{host}:{port}"),
        }
    }

    /// `POST /v2/vllm/instances` — model-level op, 30s deadline.
    pub async fn create_instance(
        &self,
        req: &CreateInstanceRequest,
    ) -> Result<CreateInstanceResponse, DualPodClientError> {
        let url = format!("{}/v2/vllm/instances", self.base_url);
        let resp = self
            .client
            .post(&url)
            .timeout(MODEL_LEVEL_TIMEOUT)
            .json(req)
            .send()
            .await
            .map_err(|source| to_request_error(&url, source))?;
        check_status(&url, &resp)?;
        resp.json()
            .await
            .map_err(|source| DualPodClientError::MalformedBody { url, source })
    }

    /// `DELETE /v2/vllm/instances/{id}`.
    pub async fn delete_instance(&self, instance_id: &str) -> Result<(), DualPodClientError> {
        let url = format!("{}/v2/vllm/instances/{instance_id}", self.base_url);
        let resp = self
            .client
            .delete(&url)
            .timeout(DEFAULT_TIMEOUT)
            .send()
            .await
            .map_err(|source| to_request_error(&url, source))?;
        check_status(&url, &resp)
    }

    /// `GET /is_sleeping`.
    pub async fn is_sleeping(&self) -> Result<bool, DualPodClientError> {
        let url = format!("{}/is_sleeping", self.base_url);
        let resp = self
            .client
            .get(&url)
            .timeout(DEFAULT_TIMEOUT)
            .send()
            .await
            .map_err(|source| to_request_error(&url, source))?;
        check_status(&url, &resp)?;
        let body: IsSleepingResponse = resp
            .json()
            .await
            .map_err(|source| DualPodClientError::MalformedBody { url, source })?;
        Ok(body.is_sleeping)
    }

    /// `POST /sleep` — model-level op, 30s deadline.
    pub async fn sleep(&self) -> Result<(), DualPodClientError> {
        let url = format!("{}/sleep", self.base_url);
        let resp = self
            .client
            .post(&url)
            .timeout(MODEL_LEVEL_TIMEOUT)
            .send()
            .await
            .map_err(|source| to_request_error(&url, source))?;
        check_status(&url, &resp)
    }

    /// `POST /wake_up` — model-level op, 30s deadline.
    pub async fn wake_up(&self) -> Result<(), DualPodClientError> {
        let url = format!("{}/wake_up", self.base_url);
        let resp = self
            .client
            .post(&url)
            .timeout(MODEL_LEVEL_TIMEOUT)
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

/// Sleep-state poll cadence (§4.6): on-demand right after a sleep/wake
/// call, plus a ~30s heartbeat otherwise.
pub fn sleep_state_heartbeat() -> Duration {
    Duration::from_secs(30)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_instance_response_matches_wire_format() {
        // §6: "Swap-in: POST /v2/vllm/instances ... -> 201 with `{id}`".
        let body: CreateInstanceResponse = serde_json::from_str(r#"{"id":"inst-1"}"#).unwrap();
        assert_eq!(body.id, "inst-1");
    }

    #[test]
    fn is_sleeping_response_matches_wire_format() {
        // §6: `GET /is_sleeping` -> `{"is_sleeping": bool}`.
        let body: IsSleepingResponse = serde_json::from_str(r#"{"is_sleeping":true}"#).unwrap();
        assert!(body.is_sleeping);
    }
}

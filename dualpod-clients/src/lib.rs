//! Stub/launcher HTTP clients (C6, SPEC_FULL.md §4.6).
//!
//! Grounded on `principal/src/services/health.rs`'s
//! `Client::builder().timeout(..).build()` + `tokio::time::sleep` poll loop
//! shape, and on the providers' one-struct-per-endpoint-set client
//! convention. Both clients here share a single `reqwest::Client`
//! constructed once at `controller` startup, matching that same
//! one-configured-client-per-process pattern rather than building one per
//! call.

mod error;
mod launcher;
mod stub;
mod timeout;

pub use error::DualPodClientError;
pub use launcher::{
    sleep_state_heartbeat, CreateInstanceRequest, CreateInstanceResponse, IsSleepingResponse,
    LauncherClient,
};
pub use stub::{
    accelerator_poll_interval, health_poll_interval, AcceleratorMemoryResponse, LogResponse,
    ReadyResponse, StubClient,
};
pub use timeout::{jittered, DEFAULT_TIMEOUT, MODEL_LEVEL_TIMEOUT};

use reqwest::Client;

/// Builds the single shared HTTP client every `StubClient`/`LauncherClient`
/// in the process is constructed from.
pub fn shared_http_client() -> reqwest::Result<Client> {
    Client::builder().timeout(DEFAULT_TIMEOUT).build()
}

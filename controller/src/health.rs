//! `/healthz` and `/metrics`, in the `principal/src/api/server.rs` /
//! `api/handlers/health.rs` style: a small axum router, state handed in
//! through `Extension`, bound with a plain `TcpListener` + `axum::serve`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::Extension;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::metrics::Metrics;

pub async fn serve(addr: SocketAddr, metrics: Arc<Metrics>) -> std::io::Result<()> {
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .layer(Extension(metrics))
        .layer(TraceLayer::new_for_http());

    info!(%addr, "health/metrics server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn metrics_handler(Extension(metrics): Extension<Arc<Metrics>>) -> impl IntoResponse {
    Json(metrics.snapshot())
}

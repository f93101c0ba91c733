//! HTTP surface for the boundary check: a single `/validate` route speaking
//! the `ValidatingWebhookConfiguration` wire contract, in the same axum
//! `Router` + `Extension<State>` shape the controller's `health` server
//! uses.

use std::sync::Arc;

use axum::extract::Extension;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use k8s_openapi::api::core::v1::Pod;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use kube::core::DynamicObject;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::validate::{validate_update, Requester};

#[derive(Clone)]
pub struct AppState {
    /// Exact `userInfo.username` the controller's own requests present;
    /// any other requester is treated as a user edit (§4.7).
    pub controller_service_account: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/validate", post(validate_handler))
        .layer(Extension(Arc::new(state)))
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn validate_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(review): Json<AdmissionReview<Pod>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let req: AdmissionRequest<Pod> = match review.request {
        Some(req) => req,
        None => {
            warn!("admission review carried no request");
            return Json(AdmissionResponse::invalid("missing admission request").into_review());
        }
    };

    let response = handle(&req, &state.controller_service_account);
    Json(response.into_review())
}

fn handle(req: &AdmissionRequest<Pod>, controller_service_account: &str) -> AdmissionResponse {
    let base = AdmissionResponse::from(req);

    // Only UPDATE is constrained by §4.7; CREATE/DELETE pass through.
    if !matches!(req.operation, Operation::Update) {
        return base;
    }

    let (Some(old), Some(new)) = (req.old_object.as_ref(), req.object.as_ref()) else {
        return base;
    };

    let username = req.user_info.username.as_deref().unwrap_or("");
    let requester = Requester(username);
    match validate_update(old, new, &requester, controller_service_account) {
        None => base,
        Some(violation) => {
            let message = format!(
                "dual-pods admission: {} is controller-managed and cannot be changed by {} (old={:?}, new={:?})",
                violation.field, requester.0, violation.old, violation.new
            );
            info!(field = %violation.field, requester = %requester.0, "rejected pod update");
            base.deny(message)
        }
    }
}

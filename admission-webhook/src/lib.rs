//! Admission boundary check (§4.7, C7): a `ValidatingWebhookConfiguration`
//! backend that rejects non-controller UPDATEs of controller-managed pod
//! labels/annotations.
//!
//! Out of scope per §1: this crate is the boundary check only, not the
//! admission-policy infrastructure (webhook registration, TLS cert
//! provisioning) around it.

pub mod server;
pub mod validate;

pub use server::{router, AppState};

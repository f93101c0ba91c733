//! Shared data model for the dual-pods reconciliation engine.
//!
//! This crate owns everything the spec calls DATA MODEL (§3): the
//! label/annotation protocol that turns a plain `Pod` into a
//! server-requesting or server-providing pod, the three CRDs, the enhanced
//! node selector, and the binding context the realizer consumes.
//!
//! Pods themselves are not reinvented here — SRP/SPP are views over
//! `k8s_openapi::api::core::v1::Pod`, since the object store that owns the
//! wire shape of `Pod` is out of scope for this repository.

pub mod annotations;
pub mod binding;
pub mod crd;
pub mod error;
pub mod hosted;
pub mod instance_identity;
pub mod labels;
pub mod meta;
pub mod node_selector;
pub mod spp;
pub mod srp;
pub mod status;

pub use error::ModelError;

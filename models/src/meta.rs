//! Small helpers for reading/writing labels and annotations on a
//! `k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta`, shared by
//! [`crate::srp`] and [`crate::spp`].

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

pub fn get_label<'a>(meta: &'a ObjectMeta, key: &str) -> Option<&'a str> {
    meta.labels.as_ref()?.get(key).map(String::as_str)
}

pub fn get_annotation<'a>(meta: &'a ObjectMeta, key: &str) -> Option<&'a str> {
    meta.annotations.as_ref()?.get(key).map(String::as_str)
}

pub fn set_label(meta: &mut ObjectMeta, key: &str, value: impl Into<String>) {
    meta.labels
        .get_or_insert_with(Default::default)
        .insert(key.to_string(), value.into());
}

pub fn set_annotation(meta: &mut ObjectMeta, key: &str, value: impl Into<String>) {
    meta.annotations
        .get_or_insert_with(Default::default)
        .insert(key.to_string(), value.into());
}

pub fn remove_label(meta: &mut ObjectMeta, key: &str) {
    if let Some(labels) = meta.labels.as_mut() {
        labels.remove(key);
    }
}

pub fn remove_annotation(meta: &mut ObjectMeta, key: &str) {
    if let Some(annotations) = meta.annotations.as_mut() {
        annotations.remove(key);
    }
}

/// Blocks the object store from actually removing an object until the
/// controller has run its cleanup and removed the finalizer itself (§4.4
/// "SRP deletion during Bound", §9 orphan-healing): as long as this is
/// present on an SRP with a non-null `deletionTimestamp`, the object stays
/// observable (`get`/watch still return it) so `handle_terminating` can run
/// before the real delete goes through.
pub fn has_finalizer(meta: &ObjectMeta, finalizer: &str) -> bool {
    meta.finalizers
        .as_ref()
        .map(|f| f.iter().any(|existing| existing == finalizer))
        .unwrap_or(false)
}

pub fn add_finalizer(meta: &mut ObjectMeta, finalizer: &str) {
    let finalizers = meta.finalizers.get_or_insert_with(Vec::new);
    if !finalizers.iter().any(|existing| existing == finalizer) {
        finalizers.push(finalizer.to_string());
    }
}

pub fn remove_finalizer(meta: &mut ObjectMeta, finalizer: &str) {
    if let Some(finalizers) = meta.finalizers.as_mut() {
        finalizers.retain(|existing| existing != finalizer);
    }
}

/// Render a set of accelerator IDs the way invariant I6 requires: sorted,
/// comma-joined.
pub fn render_accelerators(ids: &[String]) -> String {
    let mut sorted = ids.to_vec();
    sorted.sort();
    sorted.join(",")
}

pub fn parse_accelerators(value: &str) -> Vec<String> {
    if value.is_empty() {
        return Vec::new();
    }
    value.split(',').map(str::to_string).collect()
}

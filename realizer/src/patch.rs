//! Recursive JSON merge, the "strategic merge patch" step of §4.3.
//!
//! Hand-rolled over `serde_json::Value` rather than pulling in a dedicated
//! patch crate: objects merge key-by-key recursively, anything else
//! (scalars, arrays) is a wholesale replace. `serde_json`'s default
//! (non-`preserve_order`) map is a `BTreeMap`, so key order in the merged
//! output is always alphabetical — this is what makes the realizer's output
//! byte-identical for identical inputs (§4.3 Determinism).

use serde_json::Value;

pub fn merge(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                if patch_value.is_null() {
                    base_map.remove(key);
                    continue;
                }
                match base_map.get_mut(key) {
                    Some(base_value) => merge(base_value, patch_value),
                    None => {
                        base_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (base_slot, patch_value) => {
            *base_slot = patch_value.clone();
        }
    }
}

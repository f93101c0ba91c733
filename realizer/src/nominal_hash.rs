//! Nominal hash (§4.3 launcher step 5): a content fingerprint of a realized
//! launcher pod, used to detect "this launcher pod already matches what
//! would be realized today" without re-realizing and diffing structurally.

use sha2::{Digest, Sha256};

/// Hashes the realized pod's canonical JSON plus `;gpus=all;node=<node>`,
/// matching the spec's literal suffix. Canonical JSON here means
/// `serde_json::to_string` over a `Value`, whose default map is a
/// `BTreeMap` — key order is always alphabetical, so this is stable across
/// processes and runs for identical input (§4.3 Determinism).
pub fn compute(pod_json: &serde_json::Value, node_name: &str) -> String {
    let canonical = serde_json::to_string(pod_json).expect("Value always serializes");
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hasher.update(format!(";gpus=all;node={node_name}").as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stable_for_identical_input() {
        let pod = json!({"metadata": {"name": "a"}});
        assert_eq!(compute(&pod, "node-1"), compute(&pod, "node-1"));
    }

    #[test]
    fn differs_by_node() {
        let pod = json!({"metadata": {"name": "a"}});
        assert_ne!(compute(&pod, "node-1"), compute(&pod, "node-2"));
    }
}

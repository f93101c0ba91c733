//! Fast-path eligibility: "same instance" predicate (§9 Open Questions).
//!
//! The distilled spec leaves the hash basis for "model + options + env
//! hash" unpinned. Decision recorded here: model name, startup options
//! string, and env vars (sorted by key) are each canonicalized then hashed
//! together with SHA-256. Two SRPs that would produce the same
//! `InstanceIdentity` are eligible for the wake fast path (§4.4 step 2a).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InstanceIdentity {
    pub model_name: String,
    pub startup_options: String,
    pub env_vars: BTreeMap<String, String>,
}

impl InstanceIdentity {
    pub fn new(
        model_name: impl Into<String>,
        startup_options: impl Into<String>,
        env_vars: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            startup_options: startup_options.into(),
            env_vars: env_vars.into_iter().collect(),
        }
    }

    /// Stable hex-encoded SHA-256 over the canonical form of this identity.
    /// `env_vars` is a `BTreeMap` so iteration order is already sorted;
    /// everything is joined with `\n`-separated `key=value` pairs so the
    /// hash is independent of any particular serializer's map ordering.
    pub fn fingerprint(&self) -> String {
        let mut canonical = String::new();
        canonical.push_str(&self.model_name);
        canonical.push('\n');
        canonical.push_str(&self.startup_options);
        canonical.push('\n');
        for (k, v) in &self.env_vars {
            canonical.push_str(k);
            canonical.push('=');
            canonical.push_str(v);
            canonical.push('\n');
        }

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Two identities are the same instance iff their fingerprints match.
impl PartialEq for InstanceIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint() == other.fingerprint()
    }
}
impl Eq for InstanceIdentity {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_under_env_reordering() {
        let a = InstanceIdentity::new(
            "llama-3-8b",
            "--max-model-len 4096",
            [
                ("B".to_string(), "2".to_string()),
                ("A".to_string(), "1".to_string()),
            ],
        );
        let b = InstanceIdentity::new(
            "llama-3-8b",
            "--max-model-len 4096",
            [
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "2".to_string()),
            ],
        );
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a, b);
    }

    #[test]
    fn different_options_yield_different_fingerprints() {
        let a = InstanceIdentity::new("llama-3-8b", "--max-model-len 4096", []);
        let b = InstanceIdentity::new("llama-3-8b", "--max-model-len 8192", []);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}

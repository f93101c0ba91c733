//! Controller-managed pod annotations, namespace `dual-pods.llm-d.ai/` (§6).

/// SRP only (milestone-2). Expandable template yielding a strategic merge
/// patch when expanded against a [`crate::binding::BindingContext`].
pub const SERVER_PATCH: &str = "dual-pods.llm-d.ai/server-patch";

/// SRP only (milestone-3). Name of an `InferenceServerConfig` CR.
pub const INFERENCE_SERVER_CONFIG: &str = "dual-pods.llm-d.ai/inference-server-config";

/// SRP only. Stub port on the `inference-server` container. Default 8081.
pub const ADMIN_PORT: &str = "dual-pods.llm-d.ai/admin-port";
pub const DEFAULT_ADMIN_PORT: u16 = 8081;

/// SRP only. JSON `{errors: [string]}`.
pub const STATUS: &str = "dual-pods.llm-d.ai/status";

/// SRP and SPP. Sorted accelerator IDs, comma-joined (invariant I6).
pub const ACCELERATORS: &str = "dual-pods.llm-d.ai/accelerators";

/// SPP (both direct and launcher). Nominal hash of the realized pod (§4.3,
/// §4.4 candidate search: direct rebind and launcher-pod reuse are both
/// keyed off this value matching what realizing the current request would
/// produce). Named `launcher-config-hash` after its original launcher-only
/// use in §6's metadata table; kept on direct SPPs under the same key
/// rather than introducing a second annotation for the same concept.
pub const LAUNCHER_CONFIG_HASH: &str = "dual-pods.llm-d.ai/launcher-config-hash";

/// SPP only. `"<srp-uid> <srp-name>"`.
pub const REQUESTER: &str = "dual-pods.llm-d.ai/requester";

/// SPP only. `"true"` iff the provider is a launcher (vs. direct). Set once
/// at realize time and frozen thereafter (§4.7 names this explicitly as one
/// of the fields admission must not let a user flip).
pub const LAUNCHER_BASED: &str = "dual-pods.llm-d.ai/launcher-based";

/// SPP only. Set when M consecutive launcher HTTP failures have occurred;
/// makes the SPP unavailable for new binds without deleting it (§4.4
/// Failure semantics).
pub const UNHEALTHY: &str = "dual-pods.llm-d.ai/unhealthy";

/// Request-defining annotations on a bound SRP; frozen against non-controller
/// updates once bound (invariant I2 / §4.7).
pub const BOUND_SRP_FROZEN: &[&str] = &[SERVER_PATCH, INFERENCE_SERVER_CONFIG, ADMIN_PORT];

/// All annotations admission additionally freezes unconditionally on any
/// pod carrying them, regardless of bound/unbound (§4.7).
pub const ALWAYS_FROZEN: &[&str] = &[
    STATUS,
    ACCELERATORS,
    LAUNCHER_CONFIG_HASH,
    REQUESTER,
    LAUNCHER_BASED,
];

//! Controller-managed pod labels, namespace `dual-pods.llm-d.ai/` (§6).

/// Name of the paired pod. Absent on an SRP means unbound; absent on an SPP
/// means unbound. Present and reciprocal means bound (invariant I1).
pub const DUAL: &str = "dual-pods.llm-d.ai/dual";

/// `"true"` / `"false"` — whether a launcher SPP's hosted instance is
/// currently sleeping. Kept within bounded staleness of the launcher's
/// `/is_sleeping` reply (invariant I5).
pub const SLEEPING: &str = "dual-pods.llm-d.ai/sleeping";

/// Always `"launcher"` on a launcher SPP.
pub const COMPONENT: &str = "app.kubernetes.io/component";
pub const COMPONENT_LAUNCHER: &str = "launcher";

/// Always `"launcher-populator"` on a launcher SPP created by C5.
pub const GENERATED_BY: &str = "dual-pods.llm-d.ai/generated-by";
pub const GENERATED_BY_POPULATOR: &str = "launcher-populator";

/// `LauncherConfig` name a launcher SPP was realized from.
pub const LAUNCHER_CONFIG_NAME: &str = "dual-pods.llm-d.ai/launcher-config-name";

/// Node a launcher SPP is pinned to (mirrors the affinity, useful as a
/// cache-friendly label selector for C5's per-node listing).
pub const NODE_NAME: &str = "dual-pods.llm-d.ai/node-name";

/// All labels a user must never set or clear on a bound pod directly;
/// admission (C7) enforces this (§4.7).
pub const CONTROLLER_MANAGED: &[&str] = &[DUAL, SLEEPING];

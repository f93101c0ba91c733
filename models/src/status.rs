//! The `status` annotation wire contract (§6: JSON `{errors: [string]}`),
//! plus the supplemented in-memory condition history (SPEC_FULL.md §3
//! "Status conditions, not just a flat status annotation").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Exact wire shape of the `status` annotation.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SrpStatus {
    #[serde(default)]
    pub errors: Vec<String>,
}

impl SrpStatus {
    pub fn with_error(message: impl Into<String>) -> Self {
        Self {
            errors: vec![message.into()],
        }
    }

    pub fn to_annotation_value(&self) -> String {
        serde_json::to_string(self).expect("SrpStatus serializes infallibly")
    }
}

/// A condition in the supplemented history. Not part of the wire contract —
/// surfaced through structured logging and the controller's `/metrics`
/// endpoint rather than written back to the object store, so it never
/// competes with the `status` annotation as a source of truth.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Condition {
    pub kind: ConditionKind,
    pub observed_at: DateTime<Utc>,
    pub detail: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionKind {
    Bound,
    Ready,
    Degraded,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StatusConditions {
    pub history: Vec<Condition>,
}

impl StatusConditions {
    pub fn record(&mut self, kind: ConditionKind, detail: Option<String>, now: DateTime<Utc>) {
        self.history.push(Condition {
            kind,
            observed_at: now,
            detail,
        });
    }

    pub fn latest(&self, kind: ConditionKind) -> Option<&Condition> {
        self.history.iter().rev().find(|c| c.kind == kind)
    }
}

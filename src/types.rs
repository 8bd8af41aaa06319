//! Plain Rust views of the protocol messages that carry JSON payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version printed in the handshake line.
pub const PROTOCOL_VERSION: u32 = 1;

/// First field of the handshake line printed to stdout.
pub const HANDSHAKE_PREFIX: &str = "SKYTAP_PROVIDER";

/// One attribute that a plan would change. `before` is `None` for values
/// being set for the first time and `after` is `None` for values going away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    pub path: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

impl AttributeChange {
    pub fn added(path: impl Into<String>, value: Value) -> Self {
        Self { path: path.into(), before: None, after: Some(value) }
    }

    pub fn removed(path: impl Into<String>, value: Value) -> Self {
        Self { path: path.into(), before: Some(value), after: None }
    }

    pub fn modified(path: impl Into<String>, before: Value, after: Value) -> Self {
        Self { path: path.into(), before: Some(before), after: Some(after) }
    }
}

impl From<AttributeChange> for crate::generated::AttributeChange {
    fn from(change: AttributeChange) -> Self {
        let bytes = |value: Option<Value>| {
            value
                .and_then(|v| serde_json::to_vec(&v).ok())
                .unwrap_or_default()
        };
        Self {
            path: change.path,
            before: bytes(change.before),
            after: bytes(change.after),
        }
    }
}

/// Outcome of planning one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    /// State the apply step should produce; null when destroying.
    pub planned_state: Value,
    pub changes: Vec<AttributeChange>,
    /// A `force_new` attribute changed, so the object is destroyed and
    /// created again.
    pub requires_replace: bool,
}

impl PlanResult {
    pub fn no_change(state: Value) -> Self {
        Self::with_changes(state, Vec::new(), false)
    }

    /// Plan the removal of every non-null attribute of `prior_state`.
    pub fn destroy(prior_state: &Value) -> Self {
        let changes = prior_state
            .as_object()
            .into_iter()
            .flatten()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| AttributeChange::removed(k.as_str(), v.clone()))
            .collect();
        Self::with_changes(Value::Null, changes, false)
    }

    pub fn with_changes(
        planned_state: Value,
        changes: Vec<AttributeChange>,
        requires_replace: bool,
    ) -> Self {
        Self {
            planned_state,
            changes,
            requires_replace,
        }
    }

    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }
}

/// State produced by `ImportResourceState`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedResource {
    pub resource_type: String,
    pub state: Value,
}

impl ImportedResource {
    pub fn new(resource_type: impl Into<String>, state: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            state,
        }
    }
}

/// What `GetMetadata` reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub resources: Vec<String>,
    pub data_sources: Vec<String>,
    /// `Plan` accepts a null proposed state and plans a destroy.
    pub plan_destroy: bool,
}

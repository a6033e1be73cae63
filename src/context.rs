//! Per-call and per-request contexts.
//!
//! - [`CallContext`] is supplied by the caller of
//!   [`Gateway::handle`](crate::gateway::Gateway::handle) and is passed
//!   untouched to every hook.
//! - [`ExecutionContext`] is the execution delegate a message is submitted
//!   through. Every request derives its own from the runtime's root.
//! - [`RequestContext`] bundles what the preparer produced for one request.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::hooks::HookSnapshot;
use crate::merge::deep_merge;

/// Ambient context of a single `handle` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallContext {
    /// Force local (non-networked) resolution of the outgoing message.
    pub local: bool,
    /// Caller-defined attributes (e.g. authenticated principal), read by hooks.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl CallContext {
    /// A context requesting local resolution.
    #[must_use]
    pub fn local() -> Self {
        Self {
            local: true,
            ..Self::default()
        }
    }

    /// Add an attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// Execution delegate a message is dispatched through.
///
/// Derivation always produces a new owned value; nothing is shared with the
/// parent after [`ExecutionContext::derive`] returns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionContext {
    /// Delegate identifier
    pub id: String,
    /// Identifier of the context this one was derived from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Arguments applied to every message sent through this delegate
    pub fixed: Map<String, Value>,
    /// Custom data carried in the trace metadata of every message
    pub custom: Map<String, Value>,
    /// Free-form attributes set by `delegate` hooks
    pub attributes: Map<String, Value>,
}

impl ExecutionContext {
    /// The root context of a runtime.
    #[must_use]
    pub fn root() -> Self {
        Self {
            id: "root".to_string(),
            ..Self::default()
        }
    }

    /// Derive a child context layering `fixed` and `custom` over this one.
    #[must_use]
    pub fn derive(&self, fixed: Map<String, Value>, custom: Map<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            parent: Some(self.id.clone()),
            fixed: layered(&self.fixed, fixed),
            custom: layered(&self.custom, custom),
            attributes: self.attributes.clone(),
        }
    }

    /// Apply the fixed arguments to an outgoing message; fixed values win.
    pub fn apply_fixed(&self, message: &mut Map<String, Value>) {
        for (key, value) in &self.fixed {
            message.insert(key.clone(), value.clone());
        }
    }
}

fn layered(base: &Map<String, Value>, overlay: Map<String, Value>) -> Map<String, Value> {
    let mut merged = Value::Object(base.clone());
    deep_merge(&mut merged, &Value::Object(overlay));
    match merged {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Everything the preparer produced for one request.
#[derive(Debug)]
pub struct RequestContext {
    /// Gateway correlation ID of the request
    pub id: String,
    /// Result of the `custom` fold
    pub custom: Value,
    /// Result of the `fixed` fold
    pub fixed: Value,
    /// Delegate derived for this request
    pub delegate: ExecutionContext,
    /// Hook lists as they were when the request was prepared
    pub(crate) hooks: HookSnapshot,
}

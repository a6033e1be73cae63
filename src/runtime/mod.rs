//! Contract with the message-dispatch runtime.
//!
//! The gateway does not run handlers itself. It asks a [`MessageRuntime`]
//! which definition a message resolves to, submits authorized messages to
//! it, and lets it shape replies for the wire. [`LocalRuntime`] is the
//! in-process implementation.

mod local;

pub use local::{Handler, LocalRuntime, handler_fn};

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::context::ExecutionContext;
use crate::pattern::PatternKey;

/// Dispatch timeout applied when a message does not carry `timeout$`.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(22_222);

/// Field carrying trace metadata on externalized replies.
pub const META_FIELD: &str = "meta$";

/// What a handler returns.
pub type HandlerResult = std::result::Result<Value, ActionError>;

/// A registered message definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    /// Pattern the definition was registered under
    pub pattern: PatternKey,
    /// Optional handler name, for diagnostics
    pub name: Option<String>,
}

/// Structured failure produced by a handler or by the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionError {
    /// Error class name
    pub name: String,
    /// Correlation ID of the failed message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Machine-readable code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Structured details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// Diagnostic trace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ActionError {
    /// A generic `Error` carrying `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            name: "Error".to_string(),
            id: None,
            code: None,
            message: Some(message.into()),
            details: None,
            stack: None,
        }
    }

    /// Set the error class name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Set the details.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Set the diagnostic trace.
    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.code, &self.message) {
            (Some(code), Some(message)) => write!(f, "{} [{code}]: {message}", self.name),
            (None, Some(message)) => write!(f, "{}: {message}", self.name),
            (Some(code), None) => write!(f, "{} [{code}]", self.name),
            (None, None) => f.write_str(&self.name),
        }
    }
}

impl std::error::Error for ActionError {}

/// Trace metadata describing one dispatched message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceMeta {
    /// Correlation ID assigned by the runtime
    pub id: String,
    /// Pattern of the definition that handled the message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Gateway request the message belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,
    /// Dispatch duration in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Resolved locally
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub local: bool,
    /// The message failed
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub error: bool,
    /// Custom data of the delegate the message was sent through
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub custom: Map<String, Value>,
}

impl TraceMeta {
    /// Metadata with the given correlation ID and nothing else.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pattern: None,
            request: None,
            duration_ms: None,
            local: false,
            error: false,
            custom: Map::new(),
        }
    }

    /// Metadata with a fresh runtime correlation ID.
    #[must_use]
    pub fn fresh() -> Self {
        Self::new(Uuid::new_v4().simple().to_string())
    }
}

/// What the runtime reports back for one submitted message.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    /// Failure, if the message failed
    pub error: Option<ActionError>,
    /// Reply payload (`Null` on failure)
    pub payload: Value,
    /// Trace metadata
    pub meta: TraceMeta,
}

impl DispatchOutcome {
    /// A successful outcome.
    #[must_use]
    pub fn success(payload: Value, meta: TraceMeta) -> Self {
        Self {
            error: None,
            payload,
            meta,
        }
    }

    /// A failed outcome.
    #[must_use]
    pub fn failure(error: ActionError, meta: TraceMeta) -> Self {
        Self {
            error: Some(error),
            payload: Value::Null,
            meta,
        }
    }
}

/// The message-dispatch runtime the gateway delegates to.
///
/// Implementations must be `Send + Sync + 'static` so one runtime can serve
/// every in-flight request.
#[async_trait]
pub trait MessageRuntime: Send + Sync + 'static {
    /// The definition `message` would be dispatched to, without running it.
    ///
    /// Must reflect registrations made at any time before the call.
    fn find_definition(&self, message: &Map<String, Value>) -> Option<Definition>;

    /// Run `message` through `delegate` and report the outcome.
    async fn submit(&self, message: Map<String, Value>, delegate: &ExecutionContext) -> DispatchOutcome;

    /// Shape a reply for the wire.
    fn externalize(&self, error: Option<&ActionError>, payload: Value, meta: &TraceMeta) -> Value {
        externalize_reply(error, payload, meta)
    }

    /// Derive a fresh execution delegate from the runtime's root.
    fn derive_context(&self, fixed: Map<String, Value>, custom: Map<String, Value>) -> ExecutionContext {
        ExecutionContext::root().derive(fixed, custom)
    }

    /// Timeout used when a message does not request one.
    fn default_timeout(&self) -> Duration {
        DEFAULT_TIMEOUT
    }
}

/// Default wire shape: the payload object with trace metadata under `meta$`.
///
/// `Null` payloads become an object holding only `meta$`; other non-object
/// payloads are wrapped under `data$`.
#[must_use]
pub fn externalize_reply(error: Option<&ActionError>, payload: Value, meta: &TraceMeta) -> Value {
    let mut meta_value = serde_json::to_value(meta).unwrap_or_else(|_| json!({ "id": meta.id }));
    if error.is_some() {
        meta_value["error"] = Value::Bool(true);
    }

    let mut out = match payload {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("data$".to_string(), other);
            map
        }
    };
    out.insert(META_FIELD.to_string(), meta_value);
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn externalize_attaches_meta_to_objects() {
        let meta = TraceMeta::new("m1");
        let out = externalize_reply(None, json!({"x": 1}), &meta);
        assert_eq!(out, json!({"x": 1, "meta$": {"id": "m1"}}));
    }

    #[test]
    fn externalize_wraps_scalars_and_null() {
        let meta = TraceMeta::new("m1");
        assert_eq!(
            externalize_reply(None, json!([1, 2]), &meta),
            json!({"data$": [1, 2], "meta$": {"id": "m1"}})
        );
        let err = ActionError::new("bad");
        assert_eq!(
            externalize_reply(Some(&err), Value::Null, &meta),
            json!({"meta$": {"id": "m1", "error": true}})
        );
    }

    #[test]
    fn trace_meta_omits_empty_fields() {
        let mut meta = TraceMeta::new("m1");
        meta.pattern = Some("foo:1".into());
        meta.local = true;
        assert_eq!(
            serde_json::to_value(&meta).unwrap(),
            json!({"id": "m1", "pattern": "foo:1", "local": true})
        );
    }

    #[test]
    fn action_error_display() {
        let err = ActionError::new("bar").with_code("E1");
        assert_eq!(err.to_string(), "Error [E1]: bar");
        assert_eq!(ActionError::new("bar").to_string(), "Error: bar");
    }

    #[test]
    fn fresh_meta_ids_are_not_gateway_ids() {
        let meta = TraceMeta::fresh();
        assert!(!crate::gateway::trace::is_gateway_id(&meta.id));
        assert_ne!(meta.id, TraceMeta::fresh().id);
    }
}

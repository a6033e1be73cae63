//! Request lifecycle
//!
//! Every request runs through four stages, strictly in order:
//!
//! 1. **prepare**: fold `custom` and `fixed` hooks, derive a private
//!    execution delegate, run `delegate` hooks against it
//! 2. **authorize**: check the message against the allow-list, using the
//!    definition the runtime would dispatch it to
//! 3. **dispatch**: let `action` hooks answer, else submit to the runtime
//! 4. **normalize**: run `result` hooks and build the [`GatewayResult`]

mod admin;
mod authorize;
mod dispatch;
mod normalize;
mod prepare;
mod server;
pub mod trace;

pub use admin::{ADD_HOOK, GET_HOOKS};
pub use server::Gateway;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field carrying directives for the gateway's caller.
pub const DIRECTIVE_FIELD: &str = "gateway$";

/// External result envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayResult {
    /// Whether `out` is a failure descriptor
    pub error: bool,
    /// Reply payload or failure descriptor
    pub out: Value,
    /// Full trace metadata, only with `debug.response`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    /// Directives hoisted out of the reply payload
    #[serde(rename = "gateway$", default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<Map<String, Value>>,
}

impl GatewayResult {
    /// A successful envelope.
    #[must_use]
    pub fn success(out: Value) -> Self {
        Self {
            error: false,
            out,
            meta: None,
            gateway: None,
        }
    }

    /// A failure envelope.
    #[must_use]
    pub fn failure(out: Value) -> Self {
        Self {
            error: true,
            ..Self::success(out)
        }
    }

    /// Failure classification code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        if !self.error {
            return None;
        }
        self.out.get("code").and_then(Value::as_str)
    }

    /// Correlation ID of the reply.
    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        self.out
            .get(crate::runtime::META_FIELD)
            .and_then(|meta| meta.get("id"))
            .and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_omits_absent_sections() {
        let result = GatewayResult::success(json!({"x": 1}));
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"error": false, "out": {"x": 1}})
        );
    }

    #[test]
    fn directives_serialize_under_gateway_dollar() {
        let mut result = GatewayResult::success(json!({}));
        result.gateway = Some(json!({"redirect": "/home"}).as_object().cloned().unwrap());
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["gateway$"], json!({"redirect": "/home"}));
        let back: GatewayResult = serde_json::from_value(value).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn code_only_on_failures() {
        let out = json!({"code": "not-allowed", "meta$": {"id": "gw-1"}});
        assert_eq!(GatewayResult::failure(out.clone()).code(), Some("not-allowed"));
        assert_eq!(GatewayResult::success(out.clone()).code(), None);
        assert_eq!(GatewayResult::success(out).correlation_id(), Some("gw-1"));
    }
}

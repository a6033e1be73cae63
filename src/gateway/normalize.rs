//! Result normalization

use serde_json::{Map, Value, json};

use super::dispatch::Dispatched;
use super::{DIRECTIVE_FIELD, Gateway, GatewayResult, trace};
use crate::context::{CallContext, RequestContext};
use crate::hooks::{self, HookCategory, HookTarget, ResultView};
use crate::runtime::{ActionError, DispatchOutcome, META_FIELD, TraceMeta};
use crate::Result;

impl Gateway {
    /// Turn what the dispatch stage produced into the external envelope.
    pub(super) async fn normalize(
        &self,
        raw: &Value,
        call: &CallContext,
        ctx: &RequestContext,
        message: &Map<String, Value>,
        dispatched: Dispatched,
    ) -> Result<GatewayResult> {
        match dispatched {
            Dispatched::Replaced(reply) => Ok(self.replaced(reply)),
            Dispatched::Outcome(outcome) => self.outcome(raw, call, ctx, message, outcome).await,
        }
    }

    /// Envelope for a reply produced by an `action` hook.
    fn replaced(&self, reply: Value) -> GatewayResult {
        let meta = TraceMeta::new(trace::generate());
        let out = self.runtime.externalize(None, reply, &meta);
        let (out, gateway) = self.finish_reply(out);
        GatewayResult {
            gateway,
            ..GatewayResult::success(out)
        }
    }

    async fn outcome(
        &self,
        raw: &Value,
        call: &CallContext,
        ctx: &RequestContext,
        message: &Map<String, Value>,
        outcome: DispatchOutcome,
    ) -> Result<GatewayResult> {
        let DispatchOutcome {
            mut error,
            mut payload,
            mut meta,
        } = outcome;

        for (index, entry) in ctx.hooks.get(HookCategory::Result).iter().enumerate() {
            let view = ResultView {
                payload: &mut payload,
                message,
                error: error.as_mut(),
                meta: &mut meta,
            };
            hooks::run_entry(index, entry, HookTarget::Result(view), raw, call).await?;
        }

        let debug = self.config.debug.response;
        if let Some(error) = error.as_mut() {
            tracing::debug!(error = %error, meta_id = %meta.id, "Message failed");
            if !debug {
                error.stack = None;
            }
        }

        let out = self.runtime.externalize(error.as_ref(), payload, &meta);
        let (out, gateway) = self.finish_reply(out);

        let mut result = match &error {
            None => GatewayResult::success(out),
            Some(error) => GatewayResult::failure(self.failure_descriptor(error, &out)),
        };
        result.gateway = gateway;
        if debug {
            let mut full = serde_json::to_value(&meta)?;
            if error.is_some() {
                full["error"] = Value::Bool(true);
            }
            result.meta = Some(full);
        }
        Ok(result)
    }

    /// Collapse `meta$` to its correlation ID (unless debugging) and hoist
    /// `gateway$` out of the reply.
    fn finish_reply(&self, mut out: Value) -> (Value, Option<Map<String, Value>>) {
        let Some(object) = out.as_object_mut() else {
            return (out, None);
        };

        if !self.config.debug.response {
            if let Some(id) = object.get(META_FIELD).and_then(|m| m.get("id")).cloned() {
                object.insert(META_FIELD.to_string(), json!({ "id": id }));
            }
        }

        let gateway = match object.remove(DIRECTIVE_FIELD) {
            Some(Value::Object(directives)) => Some(directives),
            Some(_) | None => None,
        };
        (out, gateway)
    }

    /// Failure descriptor; disclosure of message, details and stack is gated
    /// by configuration. Absent fields are omitted.
    fn failure_descriptor(&self, error: &ActionError, reply: &Value) -> Value {
        let mut meta = reply
            .get(META_FIELD)
            .cloned()
            .filter(Value::is_object)
            .unwrap_or_else(|| json!({ "id": trace::generate() }));
        meta["error"] = Value::Bool(true);

        let mut out = Map::new();
        out.insert("name".to_string(), Value::String(error.name.clone()));
        let id = error.id.clone().unwrap_or_else(trace::generate);
        out.insert("id".to_string(), Value::String(id));
        if let Some(code) = &error.code {
            out.insert("code".to_string(), Value::String(code.clone()));
        }
        if self.config.error.message {
            if let Some(message) = &error.message {
                out.insert("message".to_string(), Value::String(message.clone()));
            }
        }
        if self.config.error.details {
            if let Some(details) = &error.details {
                out.insert("details".to_string(), details.clone());
            }
        }
        if self.config.debug.response {
            if let Some(stack) = &error.stack {
                out.insert("stack".to_string(), Value::String(stack.clone()));
            }
        }
        out.insert(META_FIELD.to_string(), meta);
        Value::Object(out)
    }
}

/// Failure envelope raised by the gateway itself, with a fresh correlation ID.
pub(super) fn rejection(code: &str, message: &str, extra: Map<String, Value>) -> GatewayResult {
    let id = trace::generate();
    let mut out = Map::new();
    out.insert("name".to_string(), json!("Error"));
    out.insert("id".to_string(), json!(id));
    out.insert("code".to_string(), json!(code));
    out.insert("message".to_string(), json!(message));
    out.extend(extra);
    out.insert(META_FIELD.to_string(), json!({ "id": id, "error": true }));
    GatewayResult::failure(Value::Object(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn rejection_shape() {
        let result = rejection("not-allowed", "Message not allowed", Map::new());
        assert!(result.error);
        let out = result.out.as_object().unwrap();
        assert_eq!(out["code"], json!("not-allowed"));
        assert_eq!(out["id"], out["meta$"]["id"]);
        assert_eq!(out["meta$"]["error"], json!(true));
        assert!(result.gateway.is_none());
    }
}

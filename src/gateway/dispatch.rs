//! Dispatch

use serde_json::{Map, Value};
use tracing::debug;

use super::Gateway;
use crate::context::{CallContext, RequestContext};
use crate::hooks::{self, HookCategory, HookTarget};
use crate::runtime::DispatchOutcome;
use crate::Result;

const TIMEOUT_FIELD: &str = "timeout$";
const LOCAL_FIELD: &str = "local$";

/// What the dispatch stage produced.
pub(super) enum Dispatched {
    /// An `action` hook answered; nothing was dispatched
    Replaced(Value),
    /// The runtime ran the message
    Outcome(DispatchOutcome),
}

impl Gateway {
    /// Run `action` hooks, then submit the message to the runtime unless one
    /// of them answered. Returns the message as it was sent.
    pub(super) async fn dispatch(
        &self,
        raw: &Value,
        call: &CallContext,
        ctx: &RequestContext,
        mut message: Map<String, Value>,
    ) -> Result<(Map<String, Value>, Dispatched)> {
        for (index, entry) in ctx.hooks.get(HookCategory::Action).iter().enumerate() {
            let reply = hooks::run_entry(index, entry, HookTarget::Action(&message), raw, call).await?;
            if let Some(reply) = reply.filter(|v| !v.is_null()) {
                debug!(hook = index, "Action hook answered the message");
                return Ok((message, Dispatched::Replaced(reply)));
            }
        }

        if call.local {
            message.insert(LOCAL_FIELD.to_string(), Value::Bool(true));
        }
        if let Some(timeout) = self.client_timeout(raw) {
            message.insert(TIMEOUT_FIELD.to_string(), Value::from(timeout));
        }
        self.trace_stage("dispatching", &message);

        let outcome = self.runtime.submit(message.clone(), &ctx.delegate).await;
        Ok((message, Dispatched::Outcome(outcome)))
    }

    /// Timeout the client asked for, if it may have it.
    fn client_timeout(&self, raw: &Value) -> Option<u64> {
        if !self.config.timeout.client {
            return None;
        }
        let requested = raw.get(TIMEOUT_FIELD)?.as_u64()?;
        let cap = self.config.timeout.cap(self.runtime.default_timeout());
        let cap_ms = cap.as_millis();
        let accepted = u128::from(requested) <= cap_ms;
        if !accepted {
            debug!(requested, cap_ms = %cap_ms, "Client timeout above cap, ignored");
        }
        accepted.then_some(requested)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::config::GatewayConfig;
    use crate::runtime::LocalRuntime;

    fn gateway(yaml: &str) -> Gateway {
        let config = GatewayConfig::from_yaml(yaml).unwrap();
        Gateway::new(config, Arc::new(LocalRuntime::new())).unwrap()
    }

    #[test]
    fn client_timeout_disabled_by_default() {
        let gw = gateway("{}");
        assert_eq!(gw.client_timeout(&json!({"timeout$": 10})), None);
    }

    #[test]
    fn client_timeout_within_configured_max() {
        let gw = gateway("timeout:\n  client: true\n  max: 1000\n");
        assert_eq!(gw.client_timeout(&json!({"timeout$": 1000})), Some(1000));
        assert_eq!(gw.client_timeout(&json!({"timeout$": 1001})), None);
        assert_eq!(gw.client_timeout(&json!({"timeout$": "500"})), None);
        assert_eq!(gw.client_timeout(&json!({})), None);
    }

    #[test]
    fn client_timeout_capped_by_runtime_default() {
        let gw = gateway("timeout:\n  client: true\n  max: 0\n");
        assert_eq!(gw.client_timeout(&json!({"timeout$": 22_222})), Some(22_222));
        assert_eq!(gw.client_timeout(&json!({"timeout$": 22_223})), None);
    }
}

//! Allow-list enforcement

use serde_json::{Map, Value};
use tracing::info;

use super::normalize::rejection;
use super::{Gateway, GatewayResult};
use crate::allow::AllowDecision;
use crate::error::codes;
use crate::pattern::PatternKey;

impl Gateway {
    /// Check `message` against the allow-list; `Some` is the denial envelope.
    ///
    /// The allow rule is resolved with the pattern of the definition the
    /// runtime would dispatch the message to, never with the message alone,
    /// so extra fields cannot steer the check towards a different shape.
    pub(super) fn authorize(&self, message: &Map<String, Value>) -> Option<GatewayResult> {
        let allow = self.allow.as_ref()?;
        let fields = PatternKey::from_message(message);

        let Some(definition) = self.runtime.find_definition(message) else {
            return Some(self.deny(&fields, None, None));
        };

        let decision = allow.check(&definition.pattern, &fields);
        if decision.allowed {
            None
        } else {
            Some(self.deny(&fields, Some(&definition.pattern), Some(decision)))
        }
    }

    fn deny(
        &self,
        fields: &PatternKey,
        pattern: Option<&PatternKey>,
        decision: Option<AllowDecision>,
    ) -> GatewayResult {
        info!(msg = %fields, pattern = ?pattern.map(ToString::to_string), "Message not allowed");

        let mut extra = Map::new();
        if self.config.debug.response {
            if let Some(pattern) = pattern {
                extra.insert("pattern".to_string(), Value::String(pattern.to_string()));
            }
            let allowed = decision
                .and_then(|d| serde_json::to_value(d).ok())
                .unwrap_or(Value::Bool(false));
            extra.insert("allowed".to_string(), allowed);
        }
        rejection(codes::NOT_ALLOWED, "Message not allowed", extra)
    }
}

//! Gateway

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{Instrument, debug, info, info_span};

use super::normalize::rejection;
use super::trace::{self, WithRequestId};
use super::GatewayResult;
use crate::allow::AllowRegistry;
use crate::config::GatewayConfig;
use crate::context::CallContext;
use crate::error::codes;
use crate::hooks::{AddHookReply, HookCategory, HookEntry, HookListing, HookRegistry};
use crate::input::{parse_failure, parse_raw_input};
use crate::pattern::DIRECTIVE_SUFFIX;
use crate::runtime::MessageRuntime;
use crate::Result;

/// Message gateway
pub struct Gateway {
    /// Configuration
    pub(super) config: GatewayConfig,
    /// Allow-list; `None` disables enforcement
    pub(super) allow: Option<AllowRegistry>,
    /// Hook lists
    pub(super) hooks: Arc<HookRegistry>,
    /// Dispatch runtime
    pub(super) runtime: Arc<dyn MessageRuntime>,
}

impl Gateway {
    /// Create a new gateway
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedPattern`](crate::Error::MalformedPattern) if
    /// the allow-list contains a malformed pattern.
    pub fn new(config: GatewayConfig, runtime: Arc<dyn MessageRuntime>) -> Result<Self> {
        let allow = config
            .allow
            .as_ref()
            .map(AllowRegistry::from_config)
            .transpose()?;

        match &allow {
            Some(allow) => info!(rules = allow.len(), "Allow-list enforced"),
            None => info!("No allow-list configured, all messages allowed"),
        }

        Ok(Self {
            config,
            allow,
            hooks: Arc::new(HookRegistry::new()),
            runtime,
        })
    }

    /// Configuration the gateway was built with
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Allow-list, if enforced
    #[must_use]
    pub fn allow(&self) -> Option<&AllowRegistry> {
        self.allow.as_ref()
    }

    /// Append a hook. `None` registers nothing.
    pub fn add_hook(&self, category: HookCategory, entry: Option<HookEntry>) -> AddHookReply {
        self.hooks.add(category, entry)
    }

    /// Current hooks of a category
    #[must_use]
    pub fn get_hooks(&self, category: HookCategory) -> HookListing {
        self.hooks.list(category)
    }

    /// Handle one inbound request.
    ///
    /// Denials and handler failures are returned as envelopes with
    /// `error: true`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HookExecution`](crate::Error::HookExecution) if a hook
    /// fails.
    pub async fn handle(&self, raw: &Value, call: &CallContext) -> Result<GatewayResult> {
        let request_id = trace::generate();
        let span = info_span!("gateway.request", request_id = %request_id);
        self.process(raw, call, request_id.clone())
            .instrument(span)
            .with_request_id(request_id)
            .await
    }

    /// Parse raw request bytes and handle the resulting document.
    ///
    /// # Errors
    ///
    /// See [`Gateway::handle`].
    pub async fn handle_raw(&self, raw: impl AsRef<[u8]>, call: &CallContext) -> Result<GatewayResult> {
        let request = parse_raw_input(raw);
        self.handle(&request, call).await
    }

    async fn process(&self, raw: &Value, call: &CallContext, request_id: String) -> Result<GatewayResult> {
        if let Some(failure) = parse_failure(raw) {
            return Ok(rejection(codes::INVALID_REQUEST, &failure.error, Map::new()));
        }
        if !raw.is_object() {
            return Ok(rejection(
                codes::INVALID_REQUEST,
                "Request must be a JSON object",
                Map::new(),
            ));
        }

        let ctx = self.prepare(raw, call, request_id).await?;
        let message = internalize(raw, &ctx.delegate);
        self.trace_stage("prepared", &message);

        if let Some(denial) = self.authorize(&message) {
            return Ok(denial);
        }
        self.trace_stage("authorized", &message);

        let (message, dispatched) = self.dispatch(raw, call, &ctx, message).await?;
        self.normalize(raw, call, &ctx, &message, dispatched).await
    }

    pub(super) fn trace_stage(&self, stage: &str, message: &Map<String, Value>) {
        if self.config.debug.log {
            let msg = Value::Object(message.clone());
            debug!(stage, msg = %msg, "Pipeline stage");
        }
    }
}

/// The message a request maps to: its data fields with directives removed,
/// overlaid with the delegate's fixed arguments.
fn internalize(raw: &Value, delegate: &crate::context::ExecutionContext) -> Map<String, Value> {
    let mut message: Map<String, Value> = raw
        .as_object()
        .into_iter()
        .flatten()
        .filter(|(field, _)| !field.ends_with(DIRECTIVE_SUFFIX))
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect();
    delegate.apply_fixed(&mut message);
    message
}

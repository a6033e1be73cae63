//! In-process message runtime.
//!
//! Handlers are indexed in a [`PatternTrie`]; a message is dispatched to the
//! most specific handler whose pattern it matches. Lookups read the live
//! index, so handlers added after a gateway was built are still found.
//!
//! ```
//! use msg_gateway::runtime::{HandlerResult, LocalRuntime, MessageRuntime, handler_fn};
//! use serde_json::{Map, json};
//!
//! let runtime = LocalRuntime::new();
//! runtime
//!     .add("cmd:ping", handler_fn(|_, _| async { HandlerResult::Ok(json!({"pong": true})) }))
//!     .unwrap();
//!
//! # tokio_test::block_on(async {
//! let delegate = runtime.derive_context(Map::new(), Map::new());
//! let message = json!({"cmd": "ping"}).as_object().cloned().unwrap();
//! let outcome = runtime.submit(message, &delegate).await;
//! assert_eq!(outcome.payload, json!({"pong": true}));
//! # });
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::debug;

use super::{
    ActionError, DEFAULT_TIMEOUT, Definition, DispatchOutcome, HandlerResult, MessageRuntime, TraceMeta,
};
use crate::context::ExecutionContext;
use crate::error::codes;
use crate::gateway::trace;
use crate::pattern::{PatternKey, PatternTrie};
use crate::Result;

/// A message handler.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Handle `message`, which was sent through `delegate`.
    async fn handle(
        &self,
        message: Map<String, Value>,
        delegate: &ExecutionContext,
    ) -> HandlerResult;
}

struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Map<String, Value>, ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(
        &self,
        message: Map<String, Value>,
        delegate: &ExecutionContext,
    ) -> HandlerResult {
        (self.f)(message, delegate.clone()).await
    }
}

/// Wrap an async closure as a [`Handler`].
///
/// The closure receives its own copy of the delegate.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn Handler>
where
    F: Fn(Map<String, Value>, ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

struct Registered {
    pattern: PatternKey,
    name: Option<String>,
    handler: Arc<dyn Handler>,
}

/// In-process [`MessageRuntime`].
pub struct LocalRuntime {
    handlers: RwLock<PatternTrie<Registered>>,
    root: ExecutionContext,
    default_timeout: Duration,
}

impl Default for LocalRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalRuntime {
    /// Create an empty runtime.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(PatternTrie::new()),
            root: ExecutionContext::root(),
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Use `timeout` for messages that do not carry `timeout$`.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Use `root` as the context every delegate is derived from.
    #[must_use]
    pub fn with_root(mut self, root: ExecutionContext) -> Self {
        self.root = root;
        self
    }

    /// Register `handler` under a pattern string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedPattern`](crate::Error::MalformedPattern) if
    /// the pattern cannot be parsed.
    pub fn add(&self, pattern: &str, handler: Arc<dyn Handler>) -> Result<()> {
        self.add_named(pattern, None, handler)
    }

    /// Register a named handler under a pattern string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedPattern`](crate::Error::MalformedPattern) if
    /// the pattern cannot be parsed.
    pub fn add_named(&self, pattern: &str, name: Option<&str>, handler: Arc<dyn Handler>) -> Result<()> {
        let pattern = PatternKey::parse(pattern)?;
        debug!(pattern = %pattern, "Registering handler");
        let registered = Registered {
            pattern: pattern.clone(),
            name: name.map(str::to_owned),
            handler,
        };
        self.handlers.write().add(pattern, registered)
    }

    /// Patterns of all registered handlers.
    #[must_use]
    pub fn patterns(&self) -> Vec<PatternKey> {
        self.handlers.read().list().map(|(key, _)| key.clone()).collect()
    }

    fn resolve(&self, message: &Map<String, Value>) -> Option<(PatternKey, Arc<dyn Handler>)> {
        let query = PatternKey::from_message(message);
        self.handlers
            .read()
            .find(&query)
            .map(|r| (r.pattern.clone(), Arc::clone(&r.handler)))
    }

    fn timeout_for(&self, message: &Map<String, Value>) -> Duration {
        message
            .get("timeout$")
            .and_then(Value::as_u64)
            .map_or(self.default_timeout, Duration::from_millis)
    }
}

#[async_trait]
impl MessageRuntime for LocalRuntime {
    fn find_definition(&self, message: &Map<String, Value>) -> Option<Definition> {
        let query = PatternKey::from_message(message);
        self.handlers.read().find(&query).map(|r| Definition {
            pattern: r.pattern.clone(),
            name: r.name.clone(),
        })
    }

    async fn submit(&self, message: Map<String, Value>, delegate: &ExecutionContext) -> DispatchOutcome {
        let mut meta = TraceMeta::fresh();
        meta.request = trace::current();
        meta.local = message.get("local$").and_then(Value::as_bool).unwrap_or(false);
        meta.custom.clone_from(&delegate.custom);

        let Some((pattern, handler)) = self.resolve(&message) else {
            let query = PatternKey::from_message(&message);
            let mut error = ActionError::new(format!("No handler matches message: {query}"))
                .with_code(codes::ACT_NOT_FOUND);
            error.id = Some(meta.id.clone());
            return DispatchOutcome::failure(error, meta);
        };
        meta.pattern = Some(pattern.to_string());

        let timeout = self.timeout_for(&message);
        let started = Instant::now();
        let result = tokio::time::timeout(timeout, handler.handle(message, delegate)).await;
        meta.duration_ms = Some(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX));

        match result {
            Ok(Ok(payload)) => DispatchOutcome::success(payload, meta),
            Ok(Err(mut error)) => {
                error.id.get_or_insert_with(|| meta.id.clone());
                DispatchOutcome::failure(error, meta)
            }
            Err(_) => {
                let mut error = ActionError::new(format!(
                    "Action {pattern} timed out after {}ms",
                    timeout.as_millis()
                ))
                .with_code(codes::ACTION_TIMEOUT);
                error.id = Some(meta.id.clone());
                DispatchOutcome::failure(error, meta)
            }
        }
    }

    fn derive_context(&self, fixed: Map<String, Value>, custom: Map<String, Value>) -> ExecutionContext {
        self.root.derive(fixed, custom)
    }

    fn default_timeout(&self) -> Duration {
        self.default_timeout
    }
}

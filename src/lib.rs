//! Message Gateway Library
//!
//! Maps inbound JSON requests onto pattern-addressed messages, authorizes
//! them against an allow-list, runs them through a hook pipeline, dispatches
//! them to a [`MessageRuntime`](runtime::MessageRuntime) and normalizes the
//! outcome into a [`GatewayResult`](gateway::GatewayResult).
//!
//! # Features
//!
//! - **Pattern trie**: most-specific match over multi-field keys with glob values
//! - **Allow-list**: message-shape rules plus per-shape parameter rules
//! - **Hooks**: `custom`, `fixed`, `delegate`, `action` and `result` stages
//! - **Isolation**: every request gets its own execution delegate
//! - **Disclosure control**: error message, details and diagnostics are opt-in
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use msg_gateway::config::GatewayConfig;
//! use msg_gateway::context::CallContext;
//! use msg_gateway::gateway::Gateway;
//! use msg_gateway::runtime::{HandlerResult, LocalRuntime, handler_fn};
//! use serde_json::json;
//!
//! # async fn run() -> msg_gateway::Result<()> {
//! let runtime = Arc::new(LocalRuntime::new());
//! runtime.add("foo:1", handler_fn(|msg, _| async move { HandlerResult::Ok(json!({"x": msg.get("x")})) }))?;
//!
//! let gateway = Gateway::new(GatewayConfig::default(), runtime)?;
//! let result = gateway.handle(&json!({"foo": 1, "x": 2}), &CallContext::default()).await?;
//! assert!(!result.error);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod allow;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod gateway;
pub mod hooks;
pub mod input;
pub mod merge;
pub mod pattern;
pub mod runtime;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// `RUST_LOG` takes precedence over `level`. `format` is `"json"` or text.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        Some("json") => subscriber.with(fmt::layer().json().with_writer(std::io::stderr)).try_init(),
        _ => subscriber.with(fmt::layer().with_writer(std::io::stderr)).try_init(),
    };
    installed.map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {e}")))
}

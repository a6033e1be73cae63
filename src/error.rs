//! Error types for the message gateway

use std::io;

use thiserror::Error;

use crate::hooks::HookCategory;

/// Result type alias for the message gateway
pub type Result<T> = std::result::Result<T, Error>;

/// Message gateway errors
///
/// Only failures that abort the surrounding call live here. Authorization
/// denials and handler failures are recovered into a
/// [`GatewayResult`](crate::gateway::GatewayResult) instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A pattern string or object could not be parsed
    #[error("Malformed pattern '{pattern}': {reason}")]
    MalformedPattern {
        /// The offending pattern source
        pattern: String,
        /// What is wrong with it
        reason: String,
    },

    /// A hook mutator failed while a request was being processed
    #[error("Hook {category}[{index}] failed: {source}")]
    HookExecution {
        /// Category the failing hook belongs to
        category: HookCategory,
        /// Position of the hook inside its category
        index: usize,
        /// Error raised by the hook
        #[source]
        source: anyhow::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a malformed pattern error
    pub fn malformed(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors raised while building the gateway.
    #[must_use]
    pub fn is_construction(&self) -> bool {
        matches!(self, Self::Config(_) | Self::MalformedPattern { .. })
    }
}

/// Classification codes placed in failure envelopes
pub mod codes {
    /// Authorization denial
    pub const NOT_ALLOWED: &str = "not-allowed";
    /// Request document is not a message object
    pub const INVALID_REQUEST: &str = "invalid-request";
    /// No handler matches the message
    pub const ACT_NOT_FOUND: &str = "act_not_found";
    /// Handler did not finish within the dispatch timeout
    pub const ACTION_TIMEOUT: &str = "action_timeout";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_pattern_message_names_pattern() {
        let err = Error::malformed("a:1,,b", "empty segment");
        assert_eq!(err.to_string(), "Malformed pattern 'a:1,,b': empty segment");
        assert!(err.is_construction());
    }

    #[test]
    fn hook_execution_keeps_source() {
        let err = Error::HookExecution {
            category: HookCategory::Fixed,
            index: 2,
            source: anyhow::anyhow!("boom"),
        };
        assert_eq!(err.to_string(), "Hook fixed[2] failed: boom");
        assert!(!err.is_construction());
        assert!(std::error::Error::source(&err).is_some());
    }
}

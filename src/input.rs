//! Raw request parsing.
//!
//! Parsing never fails: malformed input is returned as a document carrying
//! an `error$` descriptor, which the gateway rejects as an invalid request.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Field holding the parse-failure descriptor.
pub const PARSE_ERROR_FIELD: &str = "error$";

/// Why a raw request could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseFailure {
    /// Parser message
    pub error: String,
    /// The raw input, lossily decoded
    pub input: String,
}

/// Parse raw request bytes or text into a JSON document.
///
/// Blank input yields an empty object.
#[must_use]
pub fn parse_raw_input(raw: impl AsRef<[u8]>) -> Value {
    let raw = raw.as_ref();
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Value::Object(Map::new());
    }
    match serde_json::from_slice(raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(error = %e, "Malformed request input");
            json!({
                PARSE_ERROR_FIELD: ParseFailure {
                    error: e.to_string(),
                    input: String::from_utf8_lossy(raw).into_owned(),
                }
            })
        }
    }
}

/// The parse-failure descriptor of `value`, if it is one.
#[must_use]
pub fn parse_failure(value: &Value) -> Option<ParseFailure> {
    let object = value.as_object()?;
    if object.len() != 1 {
        return None;
    }
    serde_json::from_value(object.get(PARSE_ERROR_FIELD)?.clone()).ok()
}

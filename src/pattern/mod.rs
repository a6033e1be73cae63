//! Multi-field pattern keys and the trie that indexes them.
//!
//! A pattern key is an unordered set of `field:value` pairs. Patterns are
//! written either as strings (`"role:user,cmd:get*"`) or as JSON objects of
//! scalars (`{"role": "user", "cmd": "get*"}`). Values may be globs; see
//! [`ValueMatcher`].
//!
//! Scalars are compared through their canonical text form, so the number
//! `1`, the string `"1"` and the pattern value `1` are all the same value.

mod glob;
mod trie;

pub use glob::ValueMatcher;
pub use trie::PatternTrie;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Suffix marking a message field as a directive rather than pattern data.
pub const DIRECTIVE_SUFFIX: char = '$';

/// An order-irrelevant mapping from field name to scalar value text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PatternKey {
    fields: BTreeMap<String, String>,
}

impl PatternKey {
    /// Create an empty key.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a comma-separated `field:value` pattern string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedPattern`] for empty segments, segments
    /// without `:`, empty field names or values, duplicate fields, and
    /// invalid glob values.
    pub fn parse(source: &str) -> Result<Self> {
        let mut key = Self::new();
        if source.trim().is_empty() {
            return Err(Error::malformed(source, "pattern has no fields"));
        }

        for segment in source.split(',') {
            let segment = segment.trim();
            if segment.is_empty() {
                return Err(Error::malformed(source, "empty segment"));
            }
            let Some((field, value)) = segment.split_once(':') else {
                return Err(Error::malformed(
                    source,
                    format!("segment '{segment}' has no ':' separator"),
                ));
            };
            key.insert_checked(source, field.trim(), value.trim())?;
        }

        Ok(key)
    }

    /// Build a pattern from a JSON object whose values are scalars.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedPattern`] when the object is empty, holds a
    /// non-scalar value, or a value is an invalid glob.
    pub fn from_object(object: &Map<String, Value>) -> Result<Self> {
        let source = Value::Object(object.clone()).to_string();
        if object.is_empty() {
            return Err(Error::malformed(source, "pattern has no fields"));
        }

        let mut key = Self::new();
        for (field, value) in object {
            let Some(text) = scalar_text(value) else {
                return Err(Error::malformed(
                    source,
                    format!("field '{field}' is not a scalar"),
                ));
            };
            key.insert_checked(&source, field.trim(), &text)?;
        }
        Ok(key)
    }

    /// Build a pattern from either a pattern string or a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedPattern`] for any other JSON type or when the
    /// underlying string/object form is malformed.
    pub fn from_source(source: &Value) -> Result<Self> {
        match source {
            Value::String(s) => Self::parse(s),
            Value::Object(map) => Self::from_object(map),
            other => Err(Error::malformed(
                other.to_string(),
                "expected a pattern string or object",
            )),
        }
    }

    /// Project the pattern-relevant fields of a message.
    ///
    /// Directive fields (ending in `$`) and non-scalar values are ignored.
    /// Values are taken literally; glob characters in message data carry no
    /// special meaning on the query side.
    #[must_use]
    pub fn from_message(message: &Map<String, Value>) -> Self {
        let fields = message
            .iter()
            .filter(|(field, _)| !field.ends_with(DIRECTIVE_SUFFIX))
            .filter_map(|(field, value)| scalar_text(value).map(|text| (field.clone(), text)))
            .collect();
        Self { fields }
    }

    /// Value text for `field`, if constrained.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Returns `true` if `field` is part of this key.
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Iterate `(field, value)` pairs in field order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(f, v)| (f.as_str(), v.as_str()))
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the key has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// A copy of this key without the fields present in `other`.
    #[must_use]
    pub fn without(&self, other: &Self) -> Self {
        let fields = self
            .fields
            .iter()
            .filter(|(field, _)| !other.contains(field))
            .map(|(f, v)| (f.clone(), v.clone()))
            .collect();
        Self { fields }
    }

    fn insert_checked(&mut self, source: &str, field: &str, value: &str) -> Result<()> {
        if field.is_empty() {
            return Err(Error::malformed(source, "empty field name"));
        }
        if value.is_empty() {
            return Err(Error::malformed(
                source,
                format!("field '{field}' has an empty value"),
            ));
        }
        ValueMatcher::new(value).map_err(|reason| Error::malformed(source, reason))?;
        if self
            .fields
            .insert(field.to_string(), value.to_string())
            .is_some()
        {
            return Err(Error::malformed(
                source,
                format!("field '{field}' appears more than once"),
            ));
        }
        Ok(())
    }
}

impl FromStr for PatternKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for PatternKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (field, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{field}:{value}")?;
        }
        Ok(())
    }
}

impl Serialize for PatternKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PatternKey {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Canonical text of a scalar JSON value, `None` for arrays, objects and null.
#[must_use]
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

//! Allow-list of message shapes.
//!
//! Built once from the `allow` configuration section and never changed
//! afterwards. Each configured pattern is a message shape; its value is
//! either `true` (every message of that shape is allowed) or a list of
//! parameter sub-patterns, at least one of which the remaining fields of the
//! message must match. An empty list allows the shape unconditionally and
//! `false` registers nothing.
//!
//! ```yaml
//! allow:
//!   "sys:user,cmd:load": true
//!   "foo:1":
//!     - "a:2"
//!     - { b: 3, c: 4 }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::pattern::{PatternKey, PatternTrie};
use crate::Result;

/// Configured value of one allow entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AllowSpec {
    /// `true` allows the shape, `false` is ignored
    Flag(bool),
    /// Parameter sub-patterns, as strings or objects
    Params(Vec<Value>),
}

/// A registered allow rule.
#[derive(Debug)]
pub enum AllowRule {
    /// Every message of the shape is allowed
    Allowed,
    /// Remaining fields must match one of the sub-patterns
    ParamAllowed(PatternTrie<()>),
}

/// Outcome of an allow-list check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllowDecision {
    /// Whether the message is allowed
    pub allowed: bool,
    /// Shape rule that matched, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<PatternKey>,
    /// Parameter sub-pattern that matched, if the rule has any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<PatternKey>,
}

impl AllowDecision {
    fn denied(rule: Option<PatternKey>) -> Self {
        Self {
            allowed: false,
            rule,
            params: None,
        }
    }
}

/// Two-level allow-list: shape trie, then a parameter sub-trie per shape.
#[derive(Debug, Default)]
pub struct AllowRegistry {
    shapes: PatternTrie<AllowRule>,
}

impl AllowRegistry {
    /// Build the registry from the `allow` configuration section.
    ///
    /// Shapes are registered in key order, so equally specific shapes
    /// resolve to the lexically smallest key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedPattern`](crate::Error::MalformedPattern) if
    /// any shape or sub-pattern cannot be parsed.
    pub fn from_config(allow: &BTreeMap<String, AllowSpec>) -> Result<Self> {
        let mut shapes = PatternTrie::new();

        for (source, spec) in allow {
            let shape = PatternKey::parse(source)?;
            let rule = match spec {
                AllowSpec::Flag(false) => continue,
                AllowSpec::Flag(true) => AllowRule::Allowed,
                AllowSpec::Params(params) if params.is_empty() => AllowRule::Allowed,
                AllowSpec::Params(params) => {
                    let mut sub = PatternTrie::new();
                    for param in params {
                        sub.add(PatternKey::from_source(param)?, ())?;
                    }
                    AllowRule::ParamAllowed(sub)
                }
            };
            debug!(shape = %shape, "Allow rule registered");
            shapes.add(shape, rule)?;
        }

        Ok(Self { shapes })
    }

    /// Check a message against the allow-list.
    ///
    /// `shape` is the pattern of the definition the message resolves to;
    /// `fields` are the message's own pattern fields. The shape rule is looked
    /// up with `shape`, and sub-patterns are matched against the fields of
    /// the message that are not part of `shape`.
    #[must_use]
    pub fn check(&self, shape: &PatternKey, fields: &PatternKey) -> AllowDecision {
        let Some((rule_key, rule)) = self.shapes.find_entry(shape) else {
            return AllowDecision::denied(None);
        };

        match rule {
            AllowRule::Allowed => AllowDecision {
                allowed: true,
                rule: Some(rule_key.clone()),
                params: None,
            },
            AllowRule::ParamAllowed(sub) => {
                let rest = fields.without(shape);
                match sub.find_entry(&rest) {
                    Some((params, ())) => AllowDecision {
                        allowed: true,
                        rule: Some(rule_key.clone()),
                        params: Some(params.clone()),
                    },
                    None => AllowDecision::denied(Some(rule_key.clone())),
                }
            }
        }
    }

    /// Number of shape rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    /// Returns `true` if no shape is allowed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Registered shapes, ordered by their configuration key.
    pub fn shapes(&self) -> impl Iterator<Item = &PatternKey> {
        self.shapes.list().map(|(key, _)| key)
    }
}

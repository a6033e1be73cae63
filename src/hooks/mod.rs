//! Hook pipeline.
//!
//! Hooks customize each request. They are grouped in five categories, each
//! an ordered, append-only list:
//!
//! | Category | Target | Stage |
//! |----------|--------|-------|
//! | `custom` | custom-data object | preparation |
//! | `fixed` | fixed-argument object | preparation |
//! | `delegate` | the request's execution delegate | preparation |
//! | `action` | the authorized message (read-only) | dispatch |
//! | `result` | payload, error and trace metadata | normalization |
//!
//! An entry is either a static object merged into the target or a
//! [`Mutator`] invoked with the target. Entries run strictly in registration
//! order, each awaited before the next starts.
//!
//! Static entries are interpreted per category: merged into the accumulator
//! for `custom`/`fixed`, into the delegate's fixed arguments for `delegate`,
//! into an object payload for `result`; for `action` the object is a canned
//! reply that short-circuits dispatch.

mod registry;

pub use registry::{AddHookReply, HookListing, HookRegistry, HookSnapshot};

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::context::{CallContext, ExecutionContext};
use crate::merge::deep_merge;
use crate::runtime::{ActionError, TraceMeta};
use crate::{Error, Result};

/// Hook category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookCategory {
    /// Modifies the custom data carried in message metadata
    Custom,
    /// Modifies the fixed arguments applied to every message
    Fixed,
    /// Modifies the per-request execution delegate
    Delegate,
    /// May answer a message instead of dispatching it
    Action,
    /// Observes and modifies the dispatch outcome
    Result,
}

impl HookCategory {
    /// All categories, in pipeline order.
    pub const ALL: [Self; 5] = [
        Self::Custom,
        Self::Fixed,
        Self::Delegate,
        Self::Action,
        Self::Result,
    ];

    /// Lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Custom => "custom",
            Self::Fixed => "fixed",
            Self::Delegate => "delegate",
            Self::Action => "action",
            Self::Result => "result",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for HookCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown hook category '{s}'"))
    }
}

/// Mutable view of the dispatch outcome handed to `result` hooks.
pub struct ResultView<'a> {
    /// Reply payload
    pub payload: &'a mut Value,
    /// The message that was dispatched
    pub message: &'a Map<String, Value>,
    /// Failure, if the message failed
    pub error: Option<&'a mut ActionError>,
    /// Trace metadata
    pub meta: &'a mut TraceMeta,
}

/// What a hook operates on.
pub enum HookTarget<'a> {
    /// `custom` accumulator
    Custom(&'a mut Value),
    /// `fixed` accumulator
    Fixed(&'a mut Value),
    /// The request's execution delegate
    Delegate(&'a mut ExecutionContext),
    /// The authorized message
    Action(&'a Map<String, Value>),
    /// The dispatch outcome
    Result(ResultView<'a>),
}

impl HookTarget<'_> {
    /// Category this target belongs to.
    #[must_use]
    pub fn category(&self) -> HookCategory {
        match self {
            Self::Custom(_) => HookCategory::Custom,
            Self::Fixed(_) => HookCategory::Fixed,
            Self::Delegate(_) => HookCategory::Delegate,
            Self::Action(_) => HookCategory::Action,
            Self::Result(_) => HookCategory::Result,
        }
    }
}

/// A hook function.
///
/// The return value is only meaningful for `action` hooks, where `Some`
/// (other than `null`) answers the message. Errors abort the request.
#[async_trait]
pub trait Mutator: Send + Sync + 'static {
    /// Name shown when hooks are listed.
    fn name(&self) -> &str {
        "anonymous"
    }

    /// Run the hook.
    async fn apply(
        &self,
        target: HookTarget<'_>,
        request: &Value,
        call: &CallContext,
    ) -> anyhow::Result<Option<Value>>;
}

struct FnMutator<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F> Mutator for FnMutator<F>
where
    F: for<'a, 'b> Fn(HookTarget<'a>, &'b Value, &'b CallContext) -> anyhow::Result<Option<Value>>
        + Send
        + Sync
        + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(
        &self,
        target: HookTarget<'_>,
        request: &Value,
        call: &CallContext,
    ) -> anyhow::Result<Option<Value>> {
        (self.f)(target, request, call)
    }
}

/// One entry of a hook list.
#[derive(Clone)]
pub enum HookEntry {
    /// Object deep-merged into the target
    StaticMerge(Map<String, Value>),
    /// Function invoked with the target
    DynamicMutator(Arc<dyn Mutator>),
}

impl HookEntry {
    /// A static entry from a JSON value; `None` unless it is an object.
    #[must_use]
    pub fn merge(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self::StaticMerge(map)),
            _ => None,
        }
    }

    /// A dynamic entry from a synchronous closure.
    pub fn mutator<F>(name: impl Into<String>, f: F) -> Self
    where
        F: for<'a, 'b> Fn(HookTarget<'a>, &'b Value, &'b CallContext) -> anyhow::Result<Option<Value>>
            + Send
            + Sync
            + 'static,
    {
        Self::DynamicMutator(Arc::new(FnMutator {
            name: name.into(),
            f,
        }))
    }

    /// A dynamic entry from a [`Mutator`] implementation.
    pub fn from_mutator(mutator: impl Mutator) -> Self {
        Self::DynamicMutator(Arc::new(mutator))
    }

    /// JSON description: the object for static entries, `"mutator:<name>"`
    /// for dynamic ones.
    #[must_use]
    pub fn describe(&self) -> Value {
        match self {
            Self::StaticMerge(map) => Value::Object(map.clone()),
            Self::DynamicMutator(m) => Value::String(format!("mutator:{}", m.name())),
        }
    }

    /// Returns `true` if both entries are the same hook.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::StaticMerge(a), Self::StaticMerge(b)) => a == b,
            (Self::DynamicMutator(a), Self::DynamicMutator(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for HookEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StaticMerge(map) => f.debug_tuple("StaticMerge").field(map).finish(),
            Self::DynamicMutator(m) => f.debug_tuple("DynamicMutator").field(&m.name()).finish(),
        }
    }
}

impl PartialEq for HookEntry {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl Serialize for HookEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.describe().serialize(serializer)
    }
}

/// Run a single entry against `target`.
///
/// # Errors
///
/// Returns [`Error::HookExecution`] if a mutator fails.
pub async fn run_entry(
    index: usize,
    entry: &HookEntry,
    target: HookTarget<'_>,
    request: &Value,
    call: &CallContext,
) -> Result<Option<Value>> {
    let category = target.category();
    match entry {
        HookEntry::StaticMerge(object) => Ok(apply_static(object, target)),
        HookEntry::DynamicMutator(mutator) => mutator
            .apply(target, request, call)
            .await
            .map_err(|source| Error::HookExecution {
                category,
                index,
                source,
            }),
    }
}

fn apply_static(object: &Map<String, Value>, target: HookTarget<'_>) -> Option<Value> {
    let source = Value::Object(object.clone());
    match target {
        HookTarget::Custom(acc) | HookTarget::Fixed(acc) => {
            deep_merge(acc, &source);
            None
        }
        HookTarget::Delegate(delegate) => {
            let mut fixed = Value::Object(std::mem::take(&mut delegate.fixed));
            deep_merge(&mut fixed, &source);
            if let Value::Object(map) = fixed {
                delegate.fixed = map;
            }
            None
        }
        HookTarget::Action(_) => Some(source),
        HookTarget::Result(view) => {
            if view.payload.is_object() {
                deep_merge(view.payload, &source);
            }
            None
        }
    }
}

/// Fold a `custom` or `fixed` hook list over a deep copy of `base`.
///
/// # Errors
///
/// Returns [`Error::HookExecution`] if a mutator fails, and
/// [`Error::Internal`] if called for any other category.
pub async fn fold(
    category: HookCategory,
    base: &Map<String, Value>,
    entries: &[HookEntry],
    request: &Value,
    call: &CallContext,
) -> Result<Value> {
    let mut acc = Value::Object(base.clone());
    for (index, entry) in entries.iter().enumerate() {
        let target = match category {
            HookCategory::Custom => HookTarget::Custom(&mut acc),
            HookCategory::Fixed => HookTarget::Fixed(&mut acc),
            other => {
                return Err(Error::Internal(format!("cannot fold '{other}' hooks")));
            }
        };
        run_entry(index, entry, target, request, call).await?;
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn category_names_round_trip() {
        for category in HookCategory::ALL {
            assert_eq!(category.as_str().parse::<HookCategory>().unwrap(), category);
        }
        assert!("nope".parse::<HookCategory>().is_err());
        assert_eq!(
            serde_json::to_value(HookCategory::Delegate).unwrap(),
            json!("delegate")
        );
    }

    #[test]
    fn merge_accepts_objects_only() {
        assert!(HookEntry::merge(json!({"a": 1})).is_some());
        assert!(HookEntry::merge(json!([1])).is_none());
        assert!(HookEntry::merge(Value::Null).is_none());
    }

    #[test]
    fn describe_static_and_dynamic_entries() {
        let s = HookEntry::merge(json!({"a": 1})).unwrap();
        let d = HookEntry::mutator("set-z", |_, _, _| Ok(None));
        assert_eq!(s.describe(), json!({"a": 1}));
        assert_eq!(serde_json::to_value(&d).unwrap(), json!("mutator:set-z"));
        assert!(d.same_as(&d.clone()));
        assert!(!d.same_as(&HookEntry::mutator("set-z", |_, _, _| Ok(None))));
    }

    #[tokio::test]
    async fn fold_applies_entries_in_order() {
        let entries = vec![
            HookEntry::merge(json!({"a": 1, "nested": {"x": 1}})).unwrap(),
            HookEntry::mutator("double-a", |target, _, _| {
                if let HookTarget::Custom(acc) = target {
                    let a = acc["a"].as_i64().unwrap_or(0);
                    acc["a"] = json!(a * 2);
                }
                Ok(None)
            }),
            HookEntry::merge(json!({"nested": {"y": 2}})).unwrap(),
        ];
        let base = object(json!({"base": true}));
        let out = fold(
            HookCategory::Custom,
            &base,
            &entries,
            &json!({}),
            &CallContext::default(),
        )
        .await
        .unwrap();
        assert_eq!(out, json!({"base": true, "a": 2, "nested": {"x": 1, "y": 2}}));
        // base is copied, not mutated
        assert_eq!(Value::Object(base), json!({"base": true}));
    }

    #[tokio::test]
    async fn mutators_see_request_and_call_context() {
        let entries = vec![HookEntry::mutator("from-request", |target, request, call| {
            if let HookTarget::Fixed(acc) = target {
                acc["user"] = call.attributes.get("user").cloned().unwrap_or(Value::Null);
                acc["cmd"] = request["cmd"].clone();
            }
            Ok(None)
        })];
        let call = CallContext::default().with_attribute("user", json!("ann"));
        let out = fold(
            HookCategory::Fixed,
            &Map::new(),
            &entries,
            &json!({"cmd": "load"}),
            &call,
        )
        .await
        .unwrap();
        assert_eq!(out, json!({"user": "ann", "cmd": "load"}));
    }

    #[tokio::test]
    async fn failing_mutator_reports_category_and_index() {
        let entries = vec![
            HookEntry::merge(json!({"a": 1})).unwrap(),
            HookEntry::mutator("fails", |_, _, _| Err(anyhow::anyhow!("nope"))),
        ];
        let err = fold(
            HookCategory::Fixed,
            &Map::new(),
            &entries,
            &json!({}),
            &CallContext::default(),
        )
        .await
        .unwrap_err();
        match err {
            Error::HookExecution { category, index, .. } => {
                assert_eq!(category, HookCategory::Fixed);
                assert_eq!(index, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn static_entries_per_target() {
        let call = CallContext::default();
        let request = json!({});
        let entry = HookEntry::merge(json!({"k": "v"})).unwrap();

        let mut delegate = ExecutionContext::root();
        run_entry(0, &entry, HookTarget::Delegate(&mut delegate), &request, &call)
            .await
            .unwrap();
        assert_eq!(delegate.fixed.get("k"), Some(&json!("v")));

        let message = Map::new();
        let reply = run_entry(0, &entry, HookTarget::Action(&message), &request, &call)
            .await
            .unwrap();
        assert_eq!(reply, Some(json!({"k": "v"})));

        let mut payload = json!({"x": 1});
        let mut meta = TraceMeta::new("m");
        let view = ResultView {
            payload: &mut payload,
            message: &message,
            error: None,
            meta: &mut meta,
        };
        run_entry(0, &entry, HookTarget::Result(view), &request, &call)
            .await
            .unwrap();
        assert_eq!(payload, json!({"x": 1, "k": "v"}));
    }

    #[tokio::test]
    async fn folding_other_categories_is_rejected() {
        let err = fold(
            HookCategory::Action,
            &Map::new(),
            &[HookEntry::merge(json!({})).unwrap()],
            &json!({}),
            &CallContext::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }
}

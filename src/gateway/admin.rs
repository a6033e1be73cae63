//! Administrative messages
//!
//! | Pattern | Fields | Reply |
//! |---------|--------|-------|
//! | `sys:gateway,add:hook` | `hook`, `action` | [`AddHookReply`] |
//! | `sys:gateway,get:hooks` | `hook` | [`HookListing`] |
//!
//! Over the message surface only static hooks can be added: `action` must be
//! an object. Mutators are added in-process with
//! [`Gateway::add_hook`](super::Gateway::add_hook).

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use super::Gateway;
use crate::hooks::{AddHookReply, HookCategory, HookEntry, HookListing, HookRegistry};
use crate::runtime::{ActionError, HandlerResult, LocalRuntime, handler_fn};
use crate::Result;

/// Pattern of the add-hook message.
pub const ADD_HOOK: &str = "sys:gateway,add:hook";
/// Pattern of the get-hooks message.
pub const GET_HOOKS: &str = "sys:gateway,get:hooks";

impl Gateway {
    /// Register the administrative messages on `runtime`.
    ///
    /// # Errors
    ///
    /// Fails only if the built-in patterns cannot be registered.
    pub fn register_admin(&self, runtime: &LocalRuntime) -> Result<()> {
        let hooks = Arc::clone(&self.hooks);
        runtime.add_named(
            ADD_HOOK,
            Some("add_hook"),
            handler_fn(move |msg, _| {
                let hooks = Arc::clone(&hooks);
                async move { add_hook(&hooks, &msg) }
            }),
        )?;

        let hooks = Arc::clone(&self.hooks);
        runtime.add_named(
            GET_HOOKS,
            Some("get_hooks"),
            handler_fn(move |msg, _| {
                let hooks = Arc::clone(&hooks);
                async move { get_hooks(&hooks, &msg) }
            }),
        )
    }
}

fn category_name(msg: &Map<String, Value>) -> Option<&str> {
    msg.get("hook").or_else(|| msg.get("name")).and_then(Value::as_str)
}

fn add_hook(hooks: &HookRegistry, msg: &Map<String, Value>) -> HandlerResult {
    let Some(entry) = msg.get("action").cloned().and_then(HookEntry::merge) else {
        return reply(&AddHookReply::rejected("no-action"));
    };
    match category_name(msg).and_then(|name| name.parse::<HookCategory>().ok()) {
        Some(category) => reply(&hooks.add(category, Some(entry))),
        None => reply(&AddHookReply::rejected("unknown-category")),
    }
}

fn get_hooks(hooks: &HookRegistry, msg: &Map<String, Value>) -> HandlerResult {
    let name = category_name(msg).unwrap_or_default();
    match name.parse::<HookCategory>() {
        Ok(category) => reply(&hooks.list(category)),
        Err(_) => reply(&HookListing::empty(name)),
    }
}

fn reply(value: &impl Serialize) -> HandlerResult {
    serde_json::to_value(value).map_err(|e| ActionError::new(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn msg(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn add_hook_accepts_objects() {
        let hooks = HookRegistry::new();
        let out = add_hook(&hooks, &msg(json!({"hook": "custom", "action": {"z": 1}}))).unwrap();
        assert_eq!(out, json!({"ok": true, "category": "custom", "count": 1}));
    }

    #[test]
    fn add_hook_without_action() {
        let hooks = HookRegistry::new();
        for action in [json!({"hook": "fixed"}), json!({"hook": "fixed", "action": null}), json!({"hook": "fixed", "action": "fn"})] {
            let out = add_hook(&hooks, &msg(action)).unwrap();
            assert_eq!(out, json!({"ok": false, "reason": "no-action"}));
        }
        assert_eq!(hooks.list(HookCategory::Fixed).count, 0);
    }

    #[test]
    fn missing_action_is_reported_before_category() {
        let hooks = HookRegistry::new();
        for request in [json!({"sys": "gateway", "add": "hook"}), json!({"hook": "before"})] {
            let out = add_hook(&hooks, &msg(request)).unwrap();
            assert_eq!(out, json!({"ok": false, "reason": "no-action"}));
        }
    }

    #[test]
    fn add_hook_rejects_unknown_category() {
        let hooks = HookRegistry::new();
        let out = add_hook(&hooks, &msg(json!({"hook": "before", "action": {}}))).unwrap();
        assert_eq!(out, json!({"ok": false, "reason": "unknown-category"}));
    }

    #[test]
    fn get_hooks_of_unknown_category_is_empty() {
        let hooks = HookRegistry::new();
        let out = get_hooks(&hooks, &msg(json!({"hook": "before"}))).unwrap();
        assert_eq!(out, json!({"ok": true, "category": "before", "count": 0, "hooks": []}));
        let out = get_hooks(&hooks, &msg(json!({}))).unwrap();
        assert_eq!(out, json!({"ok": true, "category": "", "count": 0, "hooks": []}));
    }

    #[test]
    fn get_hooks_lists_category() {
        let hooks = HookRegistry::new();
        add_hook(&hooks, &msg(json!({"name": "result", "action": {"seen": true}}))).unwrap();
        let out = get_hooks(&hooks, &msg(json!({"hook": "result"}))).unwrap();
        assert_eq!(
            out,
            json!({"ok": true, "category": "result", "count": 1, "hooks": [{"seen": true}]})
        );
    }
}

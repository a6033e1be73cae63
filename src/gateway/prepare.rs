//! Request preparation

use serde_json::{Map, Value};
use tracing::warn;

use super::Gateway;
use crate::context::{CallContext, RequestContext};
use crate::hooks::{self, HookCategory, HookTarget};
use crate::Result;

impl Gateway {
    /// Build the isolated context of one request.
    ///
    /// Hook lists are snapshotted first; hooks added while the request is in
    /// flight do not affect it.
    pub(super) async fn prepare(
        &self,
        raw: &Value,
        call: &CallContext,
        request_id: String,
    ) -> Result<RequestContext> {
        let snapshot = self.hooks.snapshot();

        let custom = hooks::fold(
            HookCategory::Custom,
            &self.config.custom,
            snapshot.get(HookCategory::Custom),
            raw,
            call,
        )
        .await?;
        let fixed = hooks::fold(
            HookCategory::Fixed,
            &self.config.fixed,
            snapshot.get(HookCategory::Fixed),
            raw,
            call,
        )
        .await?;

        let mut delegate = self.runtime.derive_context(
            object_or_empty(HookCategory::Fixed, &fixed),
            object_or_empty(HookCategory::Custom, &custom),
        );
        for (index, entry) in snapshot.get(HookCategory::Delegate).iter().enumerate() {
            hooks::run_entry(index, entry, HookTarget::Delegate(&mut delegate), raw, call).await?;
        }

        Ok(RequestContext {
            id: request_id,
            custom,
            fixed,
            delegate,
            hooks: snapshot,
        })
    }
}

fn object_or_empty(category: HookCategory, value: &Value) -> Map<String, Value> {
    if let Value::Object(map) = value {
        map.clone()
    } else {
        warn!(%category, "Hooks replaced the accumulator with a non-object, ignoring it");
        Map::new()
    }
}

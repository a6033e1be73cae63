//! Process-wide hook lists
//!
//! One writer at a time appends; readers take cheap snapshots. Each category
//! list is an `Arc<Vec<_>>` replaced wholesale on append, so a snapshot keeps
//! seeing the entries that existed when it was taken.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use super::{HookCategory, HookEntry};

/// Reply to an add-hook request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddHookReply {
    /// Whether the hook was registered
    pub ok: bool,
    /// Category the hook was added to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<HookCategory>,
    /// Entries in the category after the append
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    /// Why nothing was registered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AddHookReply {
    /// A refusal carrying `reason`.
    #[must_use]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            category: None,
            count: None,
            reason: Some(reason.into()),
        }
    }
}

/// Reply to a get-hooks request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HookListing {
    /// Always `true`
    pub ok: bool,
    /// Listed category, as it was requested
    pub category: String,
    /// Number of entries
    pub count: usize,
    /// The entries, in registration order
    pub hooks: Vec<HookEntry>,
}

impl HookListing {
    /// Listing of a category that has no hooks, such as an unknown one.
    #[must_use]
    pub fn empty(category: impl Into<String>) -> Self {
        Self {
            ok: true,
            category: category.into(),
            count: 0,
            hooks: Vec::new(),
        }
    }
}

/// Hook lists as they were at one point in time.
#[derive(Debug, Clone, Default)]
pub struct HookSnapshot {
    lists: [Arc<Vec<HookEntry>>; 5],
}

impl HookSnapshot {
    /// Entries of `category`.
    #[must_use]
    pub fn get(&self, category: HookCategory) -> &[HookEntry] {
        &self.lists[category.index()]
    }
}

/// The five hook lists shared by every request.
#[derive(Debug, Default)]
pub struct HookRegistry {
    lists: RwLock<HookSnapshot>,
}

impl HookRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `entry` to `category`.
    ///
    /// Without an entry nothing is registered and the reply carries
    /// `reason: "no-action"`.
    pub fn add(&self, category: HookCategory, entry: Option<HookEntry>) -> AddHookReply {
        let Some(entry) = entry else {
            return AddHookReply::rejected("no-action");
        };

        let mut lists = self.lists.write();
        let slot = &mut lists.lists[category.index()];
        let mut next = Vec::with_capacity(slot.len() + 1);
        next.extend(slot.iter().cloned());
        next.push(entry);
        let count = next.len();
        *slot = Arc::new(next);
        drop(lists);

        debug!(category = %category, count, "Hook added");
        AddHookReply {
            ok: true,
            category: Some(category),
            count: Some(count),
            reason: None,
        }
    }

    /// Current entries of `category`.
    #[must_use]
    pub fn list(&self, category: HookCategory) -> HookListing {
        let hooks = self.lists.read().get(category).to_vec();
        HookListing {
            ok: true,
            category: category.to_string(),
            count: hooks.len(),
            hooks,
        }
    }

    /// Snapshot of all five lists.
    #[must_use]
    pub fn snapshot(&self) -> HookSnapshot {
        self.lists.read().clone()
    }
}

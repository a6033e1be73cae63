//! Request correlation.
//!
//! Gateway-issued IDs are `gw-` followed by a v4 UUID, which keeps them apart
//! from the IDs a runtime assigns to the messages it runs. While a request is
//! being handled its ID is reachable through [`current`], so runtimes can
//! link their trace metadata back to it.

use std::future::Future;

use tokio::task::futures::TaskLocalFuture;
use uuid::Uuid;

/// Prefix of every gateway-issued correlation ID.
pub const ID_PREFIX: &str = "gw-";

tokio::task_local! {
    static ACTIVE_REQUEST: String;
}

/// Mint a fresh correlation ID.
#[must_use]
pub fn generate() -> String {
    format!("{ID_PREFIX}{}", Uuid::new_v4())
}

/// Whether `id` has the shape of an ID minted by [`generate`].
#[must_use]
pub fn is_gateway_id(id: &str) -> bool {
    id.strip_prefix(ID_PREFIX)
        .and_then(|rest| Uuid::parse_str(rest).ok())
        .is_some_and(|uuid| uuid.get_version_num() == 4)
}

/// ID of the request the current task is working for.
#[must_use]
pub fn current() -> Option<String> {
    ACTIVE_REQUEST.try_with(String::clone).ok()
}

/// Attaches a request ID to a future, like `tracing::Instrument` does for
/// spans. Tasks spawned from inside the future do not inherit it.
pub trait WithRequestId: Future + Sized {
    /// Make `id` the [`current`] request while `self` is polled.
    fn with_request_id(self, id: String) -> TaskLocalFuture<String, Self> {
        ACTIVE_REQUEST.scope(id, self)
    }
}

impl<F: Future> WithRequestId for F {}

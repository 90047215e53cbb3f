//! The [`Source`] trait every cache tier and the remote transport implement.

use async_trait::async_trait;

use crate::request::RequestDetails;
use crate::result::{BulkFetch, DeleteStatus};
use crate::SourceResult;

/// Which side of the cascade a [`Source`] sits on.
///
/// [`crate::RequestType`] gates which sources may answer a given request by
/// comparing against this marker rather than a type check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// An on-device tier: in-memory or durable storage, never the network.
    Local,
    /// A networked tier: a REST API, or any transport that can fail with a
    /// server-side status code.
    Remote,
}

/// A single tier in a [`crate::SourceList`] cascade.
///
/// Every method takes a [`RequestDetails`] even when a given implementation
/// ignores parts of it (by-id operations, for instance, require an empty
/// `RequestDetails` via [`RequestDetails::assert_empty`]) — this keeps the
/// trait's shape uniform across local, durable, and remote implementations.
///
/// Dyn-compatible: a `SourceList<T>` holds its sources as
/// `Vec<Box<dyn Source<T>>>`.
#[async_trait]
pub trait Source<T>: Send + Sync
where
    T: Send + Sync,
{
    /// Which side of the cascade this source sits on.
    fn kind(&self) -> SourceKind;

    /// Fetches a single entity by id. `request` must be empty.
    async fn get_by_id(&self, id: &str, request: &RequestDetails) -> SourceResult<Option<T>>;

    /// Fetches a batch of entities by id. `request` must be empty.
    ///
    /// Ids not found are reported via [`BulkFetch::missing`] rather than
    /// causing the whole call to fail — a partial hit is not an error.
    async fn get_by_ids(&self, ids: &[String], request: &RequestDetails) -> SourceResult<BulkFetch<T>>;

    /// Fetches the entities matching a (possibly filtered, possibly
    /// paginated) request.
    ///
    /// Returns `Ok(None)` when this source has no cached answer for the
    /// request at all. Remote sources never return `None`: every request
    /// they answer is either a confirmed result (possibly `Some(vec![])`,
    /// zero entities) or an error. A [`crate::SourceList`] cascade treats
    /// `None` and `Some(vec![])` identically — neither is reason enough to
    /// stop, both just add this source to the backfill candidates and move
    /// on to the next one. Only a non-empty answer short-circuits the
    /// cascade; once every source has been walked with nothing non-empty
    /// found, the cascade commits to "confirmed empty" by writing an empty
    /// answer back into every empty local source it visited.
    async fn get_items(&self, request: &RequestDetails) -> SourceResult<Option<Vec<T>>>;

    /// Stores a single entity. Never touches the request cache — the
    /// request cache only ever maps a query's identity to entity ids, and a
    /// single-entity write has no query identity to record against.
    async fn set_item(&self, item: T, request: &RequestDetails) -> SourceResult<T>;

    /// Stores the entities answering a request, replacing whatever that
    /// request previously cached.
    ///
    /// Storing an empty `items` list is equivalent to
    /// [`Source::clear_for_request`] rather than a no-op: a request that
    /// legitimately has zero results must still overwrite a previously
    /// cached non-empty answer.
    async fn set_items(&self, items: Vec<T>, request: &RequestDetails) -> SourceResult<Vec<T>>;

    /// Deletes a single entity by id, invalidating every cache entry that
    /// referenced it.
    async fn delete(&self, id: &str, request: &RequestDetails) -> SourceResult<DeleteStatus>;

    /// Deletes a batch of entities by id, invalidating every cache entry
    /// that referenced any of them.
    async fn delete_ids(&self, ids: &[String], request: &RequestDetails) -> SourceResult<Vec<(String, DeleteStatus)>>;

    /// Clears only the cached answer to one request, leaving entity storage
    /// untouched.
    async fn clear_for_request(&self, request: &RequestDetails) -> SourceResult<()>;

    /// Clears everything this source holds: every entity and every cached
    /// request.
    async fn clear(&self) -> SourceResult<()>;
}

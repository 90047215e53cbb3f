//! Storage contracts a `LocalSource` is built on top of.
//!
//! Splitting storage into an [`ItemsStore`] (id → entity) and a
//! [`RequestCacheStore`] (query identity → entity ids) is forced by the fact
//! that a query's answer and an entity's data have different invalidation
//! lifetimes: deleting an entity must sweep every cached query that
//! mentioned it, while overwriting an entity from a fresh fetch must not
//! disturb any other query's cached ids.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tierdata_core::{CacheKeyDigest, SourceResult};

/// Durable or in-memory id → entity storage for a single [`crate::LocalSource`].
#[async_trait]
pub trait ItemsStore<T>: Send + Sync
where
    T: Clone + Send + Sync,
{
    /// Looks up a single entity by id.
    async fn get(&self, id: &str) -> SourceResult<Option<T>>;

    /// Looks up a batch of entities by id. Ids not present are simply
    /// absent from the returned map.
    async fn get_many(&self, ids: &[String]) -> SourceResult<HashMap<String, T>>;

    /// Returns every entity this store holds, ignoring request-cache
    /// bookkeeping entirely. Backs the `AllLocal` read mode.
    async fn get_all(&self) -> SourceResult<Vec<T>>;

    /// Stores a single entity under `id`.
    ///
    /// When `overwrite` is `false` and `id` is already present, this is a
    /// no-op — the existing entry is left untouched.
    async fn put(&self, id: String, item: T, overwrite: bool) -> SourceResult<()>;

    /// Stores a batch of entities.
    ///
    /// When `overwrite` is `false`, an id already present in the store keeps
    /// its existing entry; only ids not yet present are written.
    async fn put_many(&self, items: HashMap<String, T>, overwrite: bool) -> SourceResult<()>;

    /// Removes a single entity by id. Returns whether it was present.
    async fn remove(&self, id: &str) -> SourceResult<bool>;

    /// Removes every entity this store holds.
    async fn clear(&self) -> SourceResult<()>;
}

/// Durable or in-memory query-identity → entity-id-set storage.
///
/// Implementations hold two logical maps: one for unpaginated requests
/// (`cache_key` → ids) and one for paginated requests
/// (`no_pagination_cache_key` → `cache_key` → ids), so that
/// [`RequestCacheStore::invalidate_id`] can sweep a deleted entity out of
/// every page of every query that mentioned it. An empty id set is never
/// stored — storing one is equivalent to clearing that request's entry.
#[async_trait]
pub trait RequestCacheStore: Send + Sync {
    /// Looks up the cached id set for a request.
    ///
    /// `paginated` selects which of the two logical maps to search; when
    /// `true`, `no_pagination_cache_key` selects the query group and
    /// `cache_key` selects the specific page within it.
    async fn get(
        &self,
        cache_key: &CacheKeyDigest,
        no_pagination_cache_key: &CacheKeyDigest,
        paginated: bool,
    ) -> SourceResult<Option<HashSet<String>>>;

    /// Stores the id set answering a request. Storing an empty set clears
    /// the entry instead, per the empty-set-never-stored invariant.
    async fn put(
        &self,
        cache_key: &CacheKeyDigest,
        no_pagination_cache_key: &CacheKeyDigest,
        paginated: bool,
        ids: HashSet<String>,
    ) -> SourceResult<()>;

    /// Clears the cached answer to a single request, leaving every other
    /// request's entry untouched.
    async fn clear_for_request(
        &self,
        cache_key: &CacheKeyDigest,
        no_pagination_cache_key: &CacheKeyDigest,
        paginated: bool,
    ) -> SourceResult<()>;

    /// Removes `id` from every cached request's id set, across both the
    /// paginated and unpaginated maps, dropping any entry that becomes
    /// empty as a result.
    async fn invalidate_id(&self, id: &str) -> SourceResult<()>;

    /// Clears every cached request.
    async fn clear(&self) -> SourceResult<()>;
}

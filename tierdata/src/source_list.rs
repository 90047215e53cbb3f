//! [`SourceList`]: the cascade coordinator that ties an ordered stack of
//! [`Source`]s together behind one [`Bindings`]-typed entity.
//!
//! Grounded in the teacher's `CompositionBackend`, which walks an L1/L2
//! backend pair the same way — consult the nearer tier first, fall through
//! to the next on a miss, write hits back into the tiers that missed. This
//! generalizes that two-tier walk to an arbitrary ordered list and adds the
//! request-type gating and partial by-id gap-fill spec.md layers on top.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tierdata_core::{
    Bindings, BulkFetch, DeleteStatus, Pagination, RequestDetails, RequestType, Source,
    SourceError, SourceKind, SourceResult,
};
use tracing::instrument;

use crate::config::SourceListConfig;

fn source_matches(kind: SourceKind, request_type: RequestType) -> bool {
    match kind {
        SourceKind::Local => request_type.matches_local(),
        SourceKind::Remote => request_type.matches_remote(),
    }
}

/// An ordered cascade of [`Source`]s sharing one [`Bindings`] instance.
///
/// Sources are visited nearest-first: index 0 is consulted before index 1,
/// and so on, with the convention (not enforced by this type) that earlier
/// indices are local tiers and the last is the remote tier. Every
/// [`Source`] in the list must already be constructed against the same
/// `Arc<B>` passed in here — that shared `Arc` *is* this type's "inject
/// bindings into any source lacking them" duty from spec.md §3, discharged
/// once at construction rather than per call.
pub struct SourceList<T, B> {
    sources: Vec<Box<dyn Source<T>>>,
    bindings: Arc<B>,
    config: SourceListConfig,
}

impl<T, B> SourceList<T, B>
where
    T: Clone + Send + Sync + 'static,
    B: Bindings<T> + Send + Sync + 'static,
{
    /// Builds a `SourceList` over an ordered stack of sources.
    pub fn new(sources: Vec<Box<dyn Source<T>>>, bindings: Arc<B>, config: SourceListConfig) -> Self {
        SourceList {
            sources,
            bindings,
            config,
        }
    }

    /// Builds a `SourceList` with [`SourceListConfig::default`].
    pub fn with_default_config(sources: Vec<Box<dyn Source<T>>>, bindings: Arc<B>) -> Self {
        SourceList::new(sources, bindings, SourceListConfig::default())
    }

    /// This list's policy configuration.
    pub fn config(&self) -> SourceListConfig {
        self.config
    }

    /// Builds a [`Pagination`] for `page` using this list's configured
    /// [`SourceListConfig::default_page_size`].
    ///
    /// Callers that want the cascade's configured page size rather than
    /// [`Pagination::default`]'s hardcoded [`tierdata_core::DEFAULT_PAGE_SIZE`]
    /// should build their paginated `RequestDetails` from this rather than
    /// from `Pagination::default()` directly.
    pub fn default_pagination(&self, page: u32) -> Pagination {
        Pagination {
            page,
            page_size: self.config.default_page_size,
        }
    }

    /// The number of sources in this cascade.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// True if this cascade has no sources.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// See spec.md §4.6.1. `request` must be empty.
    #[instrument(skip(self, request), fields(id = %id))]
    pub async fn get_by_id(&self, id: &str, request: &RequestDetails) -> SourceResult<Option<T>> {
        request.assert_empty("SourceList::get_by_id")?;
        let request_type = request.request_type();
        let mut empty_sources: Vec<usize> = Vec::new();

        for (idx, source) in self.sources.iter().enumerate() {
            if !source_matches(source.kind(), request_type) {
                empty_sources.push(idx);
                continue;
            }
            match source.get_by_id(id, request).await {
                Err(err) => {
                    tracing::error!(error = %err, source = idx, "get_by_id aborted the cascade");
                    return Err(err);
                }
                Ok(Some(item)) => {
                    for &prev in &empty_sources {
                        if self.sources[prev].kind() != SourceKind::Local {
                            continue;
                        }
                        if let Err(err) = self.sources[prev].set_item(item.clone(), request).await {
                            tracing::warn!(error = %err, source = prev, "get_by_id backfill failed");
                        }
                    }
                    return Ok(Some(item));
                }
                Ok(None) => {
                    tracing::trace!(source = idx, "get_by_id miss");
                    empty_sources.push(idx);
                }
            }
        }
        Ok(None)
    }

    /// See spec.md §4.6.2. `request` must be empty.
    #[instrument(skip(self, ids, request), fields(count = ids.len()))]
    pub async fn get_by_ids(&self, ids: &[String], request: &RequestDetails) -> SourceResult<BulkFetch<T>> {
        request.assert_empty("SourceList::get_by_ids")?;
        let request_type = request.request_type();

        let mut missing: HashSet<String> = ids.iter().cloned().collect();
        let mut found: HashMap<String, T> = HashMap::new();
        let mut visited: Vec<usize> = Vec::new();
        let mut backfill: HashMap<usize, Vec<T>> = HashMap::new();

        for (idx, source) in self.sources.iter().enumerate() {
            if missing.is_empty() {
                break;
            }
            if !source_matches(source.kind(), request_type) {
                visited.push(idx);
                continue;
            }

            let probe: Vec<String> = missing.iter().cloned().collect();
            let bulk = match source.get_by_ids(&probe, request).await {
                Err(err) => {
                    tracing::error!(error = %err, source = idx, "get_by_ids aborted the cascade");
                    return Err(err);
                }
                Ok(bulk) => bulk,
            };
            let (hits, _) = bulk.into_parts();

            if !hits.is_empty() {
                for &prev in &visited {
                    if self.sources[prev].kind() == SourceKind::Local {
                        backfill.entry(prev).or_default().extend(hits.values().cloned());
                    }
                }
            }
            for (id, item) in hits {
                missing.remove(&id);
                found.insert(id, item);
            }
            visited.push(idx);
        }

        for (idx, items) in backfill {
            let source = &self.sources[idx];
            for item in items {
                if let Err(err) = source.set_item(item, request).await {
                    tracing::warn!(error = %err, source = idx, "get_by_ids backfill failed");
                }
            }
            if request_type != RequestType::Local && !missing.is_empty() {
                if !self.config.evict_unfulfilled_ids {
                    tracing::trace!(source = idx, "skipping unfulfilled id eviction, disabled by config");
                    continue;
                }
                let unfulfilled: Vec<String> = missing.iter().cloned().collect();
                if let Err(err) = source.delete_ids(&unfulfilled, request).await {
                    tracing::warn!(error = %err, source = idx, "unfulfilled id eviction failed");
                }
            }
        }

        Ok(BulkFetch::new(found, ids.to_vec()))
    }

    /// See spec.md §4.6.3.
    ///
    /// Unlike [`Source::get_items`], this always returns a definitive
    /// answer — `Ok(vec![])` on an exhausted miss, never a "don't know".
    #[instrument(skip(self, request), fields(cache_key = %request.cache_key()))]
    pub async fn get_items(&self, request: &RequestDetails) -> SourceResult<Vec<T>> {
        let request_type = request.request_type();

        if request_type == RequestType::AllLocal {
            return self.get_all_local(request).await;
        }

        let mut empty_sources: Vec<usize> = Vec::new();

        for (idx, source) in self.sources.iter().enumerate() {
            if !source_matches(source.kind(), request_type) {
                empty_sources.push(idx);
                continue;
            }
            match source.get_items(request).await {
                Err(err) => {
                    tracing::error!(error = %err, source = idx, "get_items aborted the cascade");
                    return Err(err);
                }
                Ok(Some(items)) if !items.is_empty() => {
                    for &prev in &empty_sources {
                        if self.sources[prev].kind() != SourceKind::Local {
                            continue;
                        }
                        if let Err(err) = self.sources[prev].set_items(items.clone(), request).await {
                            tracing::warn!(error = %err, source = prev, "get_items backfill failed");
                        }
                    }
                    return Ok(items);
                }
                _ => {
                    tracing::trace!(source = idx, "get_items miss");
                    empty_sources.push(idx);
                }
            }
        }

        if matches!(request_type, RequestType::Global | RequestType::Refresh) {
            for &idx in &empty_sources {
                if self.sources[idx].kind() != SourceKind::Local {
                    continue;
                }
                if let Err(err) = self.sources[idx].set_items(Vec::new(), request).await {
                    tracing::warn!(error = %err, source = idx, "marking confirmed-empty request failed");
                }
            }
        }
        Ok(Vec::new())
    }

    /// Backs `RequestType::AllLocal` (spec.md §6): merges every entity from
    /// every local source in the cascade, bypassing the request cache
    /// entirely. Unlike the ordinary cascade, this never short-circuits on
    /// the first non-empty source and never backfills — "every local store"
    /// means exactly that, not "the first local store with an answer".
    ///
    /// An id present in more than one local tier keeps the copy from the
    /// earliest (nearest) tier, matching the cascade's convention that
    /// earlier sources hold the freshest data.
    async fn get_all_local(&self, request: &RequestDetails) -> SourceResult<Vec<T>> {
        let mut by_id: HashMap<String, T> = HashMap::new();
        for (idx, source) in self.sources.iter().enumerate() {
            if source.kind() != SourceKind::Local {
                continue;
            }
            let items = match source.get_items(request).await {
                Err(err) => {
                    tracing::error!(error = %err, source = idx, "get_items(AllLocal) aborted the cascade");
                    return Err(err);
                }
                Ok(items) => items.unwrap_or_default(),
            };
            for item in items {
                let id = self.bindings.id_of(&item).unwrap_or_default();
                by_id.entry(id).or_insert(item);
            }
        }
        Ok(by_id.into_values().collect())
    }

    /// See spec.md §4.6.4. An id-less `item` walks the cascade remote-first
    /// so a server assigns the id before local tiers persist it.
    #[instrument(skip(self, item, request))]
    pub async fn set_item(&self, item: T, request: &RequestDetails) -> SourceResult<T> {
        let request_type = request.request_type();
        let originally_had_no_id = self.bindings.id_of(&item).is_none();
        let mut current = item;

        let order: Box<dyn Iterator<Item = usize> + Send> = if originally_had_no_id {
            Box::new((0..self.sources.len()).rev())
        } else {
            Box::new(0..self.sources.len())
        };

        for idx in order {
            let source = &self.sources[idx];
            if !source_matches(source.kind(), request_type) {
                continue;
            }
            tracing::trace!(source = idx, "set_item visiting source");
            let result = match source.set_item(current.clone(), request).await {
                Err(err) => {
                    tracing::error!(error = %err, source = idx, "set_item aborted the cascade");
                    return Err(err);
                }
                Ok(result) => result,
            };
            if originally_had_no_id && self.bindings.id_of(&result).is_none() {
                tracing::error!(source = idx, "set_item source returned no id for an id-less write");
                return Err(SourceError::server_error("Failed to generate Id"));
            }
            current = result;
        }

        Ok(current)
    }

    /// See spec.md §4.6.5. Requires `request.request_type() == RequestType::Local`.
    #[instrument(skip(self, items, request), fields(count = items.len()))]
    pub async fn set_items(&self, items: Vec<T>, request: &RequestDetails) -> SourceResult<Vec<T>> {
        if request.request_type() != RequestType::Local {
            return Err(SourceError::Unexpected(
                "SourceList::set_items requires RequestType::Local".to_string(),
            ));
        }
        for (idx, source) in self.sources.iter().enumerate() {
            if source.kind() != SourceKind::Local {
                continue;
            }
            if let Err(err) = source.set_items(items.clone(), request).await {
                tracing::error!(error = %err, source = idx, "set_items aborted the cascade");
                return Err(err);
            }
        }
        Ok(items)
    }

    /// See spec.md §4.6.6.
    ///
    /// Deletion wins: if any visited source actually removed `id`, the
    /// aggregated result is `Deleted` even if a later source had no record
    /// of it.
    #[instrument(skip(self, request), fields(id = %id))]
    pub async fn delete(&self, id: &str, request: &RequestDetails) -> SourceResult<DeleteStatus> {
        let request_type = request.request_type();
        let mut status = DeleteStatus::Missing;
        for (idx, source) in self.sources.iter().enumerate() {
            if !source_matches(source.kind(), request_type) {
                continue;
            }
            match source.delete(id, request).await {
                Err(err) => {
                    tracing::error!(error = %err, source = idx, "delete aborted the cascade");
                    return Err(err);
                }
                Ok(result) if result.was_deleted() => status = result,
                Ok(_) => {}
            }
        }
        Ok(status)
    }

    /// See spec.md §4.6.6, bulk form.
    ///
    /// An id counts as deleted if *any* visited source reported it deleted —
    /// a later source reporting `Missing` for an id an earlier source just
    /// removed must not erase that result.
    #[instrument(skip(self, ids, request), fields(count = ids.len()))]
    pub async fn delete_ids(&self, ids: &[String], request: &RequestDetails) -> SourceResult<Vec<(String, DeleteStatus)>> {
        let request_type = request.request_type();
        let mut statuses: HashMap<String, DeleteStatus> =
            ids.iter().cloned().map(|id| (id, DeleteStatus::Missing)).collect();
        for (idx, source) in self.sources.iter().enumerate() {
            if !source_matches(source.kind(), request_type) {
                continue;
            }
            let results = match source.delete_ids(ids, request).await {
                Err(err) => {
                    tracing::error!(error = %err, source = idx, "delete_ids aborted the cascade");
                    return Err(err);
                }
                Ok(results) => results,
            };
            for (id, status) in results {
                if status.was_deleted() {
                    statuses.insert(id, status);
                }
            }
        }
        Ok(ids.iter().map(|id| (id.clone(), statuses[id])).collect())
    }

    /// See spec.md §4.6.7. Fans out only to local sources.
    pub async fn clear_for_request(&self, request: &RequestDetails) -> SourceResult<()> {
        for (idx, source) in self.sources.iter().enumerate() {
            if source.kind() != SourceKind::Local {
                continue;
            }
            if let Err(err) = source.clear_for_request(request).await {
                tracing::error!(error = %err, source = idx, "clear_for_request aborted");
                return Err(err);
            }
        }
        Ok(())
    }

    /// See spec.md §4.6.7. Fans out only to local sources.
    pub async fn clear(&self) -> SourceResult<()> {
        for (idx, source) in self.sources.iter().enumerate() {
            if source.kind() != SourceKind::Local {
                continue;
            }
            if let Err(err) = source.clear().await {
                tracing::error!(error = %err, source = idx, "clear aborted");
                return Err(err);
            }
        }
        Ok(())
    }
}

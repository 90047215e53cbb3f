//! Request descriptors: filter, pagination, request-type, and the two
//! derived cache keys a read/write request carries.

use crate::error::SourceError;
use crate::key::CacheKeyDigest;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Which tier(s) of a [`crate::Source`] list a request is eligible for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestType {
    /// Any source — local or remote — may answer.
    Global,
    /// Only remote sources may answer; forces a network round-trip.
    Refresh,
    /// Only local sources may answer; never reaches the network.
    Local,
    /// Reserved for the facade's `all_local` read mode: ignore the request
    /// cache entirely and return every entity held by every local source.
    /// Treated as local-only for source matching purposes.
    AllLocal,
}

impl RequestType {
    /// Whether a source whose [`crate::SourceKind`] is `Local` may answer a
    /// request of this type.
    pub fn matches_local(self) -> bool {
        !matches!(self, RequestType::Refresh)
    }

    /// Whether a source whose [`crate::SourceKind`] is `Remote` may answer a
    /// request of this type.
    pub fn matches_remote(self) -> bool {
        matches!(self, RequestType::Global | RequestType::Refresh)
    }
}

/// A single page descriptor: zero-based `page` index and `page_size`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Pagination {
    /// Zero-based page index.
    pub page: u32,
    /// Number of entities per page.
    pub page_size: u32,
}

/// Default page size used when a caller asks for pagination without
/// specifying one.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

impl Default for Pagination {
    fn default() -> Self {
        Pagination {
            page: 0,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Pagination {
    fn cache_fragment(&self) -> String {
        format!("{}-{}", self.page_size, self.page)
    }
}

/// Opaque (to the core) filter carried by a read or write request.
///
/// The core never interprets a filter's contents — it only ever calls
/// [`Filter::cache_key`] (to derive the request's cache identity) and
/// [`Filter::to_params`] (when a remote source needs to serialize the
/// filter into query parameters). A filter's wire form and its cache key
/// may legitimately diverge — two filters with different `to_params()` but
/// identical `cache_key()` alias in the cache by design, because the server
/// may evaluate filtering logic the client has no way to reproduce locally.
pub trait Filter: Send + Sync {
    /// Stable identity of this filter for cache-key derivation.
    fn cache_key(&self) -> String;

    /// Serializes this filter into query parameters for a remote transport.
    ///
    /// Returns `Err(SourceError::Unexpected(..))` if this filter cannot be
    /// expressed as remote query parameters at all.
    fn to_params(&self) -> Result<BTreeMap<String, String>, SourceError>;
}

/// Immutable descriptor of a read or write request.
///
/// Two `RequestDetails` with equal `filter.cache_key()` and equal
/// `pagination` always produce equal [`RequestDetails::cache_key`] values,
/// regardless of `request_type` or `should_overwrite` — this is what lets a
/// `Local` request and a `Refresh` request for the same logical data share a
/// cache entry.
pub struct RequestDetails {
    request_type: RequestType,
    filter: Option<Arc<dyn Filter>>,
    pagination: Option<Pagination>,
    should_overwrite: bool,
    cache_key: OnceLock<CacheKeyDigest>,
    no_pagination_cache_key: OnceLock<CacheKeyDigest>,
}

impl Clone for RequestDetails {
    fn clone(&self) -> Self {
        let cloned = RequestDetails {
            request_type: self.request_type,
            filter: self.filter.clone(),
            pagination: self.pagination,
            should_overwrite: self.should_overwrite,
            cache_key: OnceLock::new(),
            no_pagination_cache_key: OnceLock::new(),
        };
        if let Some(k) = self.cache_key.get() {
            let _ = cloned.cache_key.set(k.clone());
        }
        if let Some(k) = self.no_pagination_cache_key.get() {
            let _ = cloned.no_pagination_cache_key.set(k.clone());
        }
        cloned
    }
}

impl fmt::Debug for RequestDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDetails")
            .field("request_type", &self.request_type)
            .field("filter_cache_key", &self.filter.as_ref().map(|f| f.cache_key()))
            .field("pagination", &self.pagination)
            .field("should_overwrite", &self.should_overwrite)
            .finish()
    }
}

impl PartialEq for RequestDetails {
    fn eq(&self, other: &Self) -> bool {
        self.request_type == other.request_type
            && self.should_overwrite == other.should_overwrite
            && self.pagination == other.pagination
            && self.filter.as_ref().map(|f| f.cache_key())
                == other.filter.as_ref().map(|f| f.cache_key())
    }
}

impl RequestDetails {
    /// Builds a `RequestDetails` for a read operation.
    ///
    /// `should_overwrite` defaults to `true` for reads, matching the
    /// default used throughout the coordinator's backfill paths.
    pub fn for_read(
        request_type: RequestType,
        filter: Option<Arc<dyn Filter>>,
        pagination: Option<Pagination>,
    ) -> Self {
        RequestDetails {
            request_type,
            filter,
            pagination,
            should_overwrite: true,
            cache_key: OnceLock::new(),
            no_pagination_cache_key: OnceLock::new(),
        }
    }

    /// Builds a `RequestDetails` for a write operation. Write requests carry
    /// no filter — a write identifies its target by entity id, not by query.
    pub fn for_write(
        request_type: RequestType,
        should_overwrite: bool,
        pagination: Option<Pagination>,
    ) -> Self {
        RequestDetails {
            request_type,
            filter: None,
            pagination,
            should_overwrite,
            cache_key: OnceLock::new(),
            no_pagination_cache_key: OnceLock::new(),
        }
    }

    /// The request-type gate: which source kinds may answer this request.
    pub fn request_type(&self) -> RequestType {
        self.request_type
    }

    /// The request's filter, if any.
    pub fn filter(&self) -> Option<&Arc<dyn Filter>> {
        self.filter.as_ref()
    }

    /// The request's pagination, if any.
    pub fn pagination(&self) -> Option<Pagination> {
        self.pagination
    }

    /// Whether a write with this descriptor should overwrite an existing
    /// entity of the same id.
    pub fn should_overwrite(&self) -> bool {
        self.should_overwrite
    }

    /// True iff this request carries neither a filter nor pagination.
    pub fn is_empty(&self) -> bool {
        self.filter.is_none() && self.pagination.is_none()
    }

    /// Asserts that this request is empty, as required by by-id operations
    /// and local item-store lookups, which must never be filtered or
    /// paginated.
    ///
    /// Returns `Err(SourceError::Unexpected(..))` rather than panicking: a
    /// caller-facing API should never abort the process on a precondition
    /// violation, even though this is conceptually a programmer error that
    /// the SourceList must fail fast on.
    pub fn assert_empty(&self, caller_name: &str) -> Result<(), SourceError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(SourceError::Unexpected(format!(
                "{caller_name} requires an empty RequestDetails (no filter, no pagination)"
            )))
        }
    }

    /// Clones this descriptor with `request_type` set to [`RequestType::Local`],
    /// preserving filter, pagination, and `should_overwrite`.
    pub fn local_copy(&self) -> Self {
        let mut copy = self.clone();
        copy.request_type = RequestType::Local;
        copy
    }

    fn filter_fragment(&self) -> String {
        self.filter
            .as_ref()
            .map(|f| f.cache_key())
            .unwrap_or_else(|| "-cache-".to_string())
    }

    /// The full cache key: a digest over filter identity and pagination.
    ///
    /// Stable across process restarts; independent of `request_type` and
    /// `should_overwrite`.
    pub fn cache_key(&self) -> &CacheKeyDigest {
        self.cache_key.get_or_init(|| {
            let pagination_fragment = self
                .pagination
                .map(|p| p.cache_fragment())
                .unwrap_or_else(|| "-page-".to_string());
            CacheKeyDigest::of(&format!("{}-{}", self.filter_fragment(), pagination_fragment))
        })
    }

    /// The cache key with pagination stripped, grouping every page of one
    /// logical query under the same digest.
    pub fn no_pagination_cache_key(&self) -> &CacheKeyDigest {
        self.no_pagination_cache_key.get_or_init(|| {
            CacheKeyDigest::of(&format!("{}--page-", self.filter_fragment()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EqFilter(&'static str);
    impl Filter for EqFilter {
        fn cache_key(&self) -> String {
            format!("eq:{}", self.0)
        }
        fn to_params(&self) -> Result<BTreeMap<String, String>, SourceError> {
            let mut m = BTreeMap::new();
            m.insert("eq".to_string(), self.0.to_string());
            Ok(m)
        }
    }

    #[test]
    fn cache_key_independent_of_request_type_and_overwrite() {
        let f: Arc<dyn Filter> = Arc::new(EqFilter("abc"));
        let d1 = RequestDetails::for_read(RequestType::Local, Some(f.clone()), None);
        let d2 = RequestDetails::for_read(RequestType::Refresh, Some(f), None);
        assert_eq!(d1.cache_key(), d2.cache_key());
    }

    #[test]
    fn pagination_shares_group_but_not_page() {
        let f: Arc<dyn Filter> = Arc::new(EqFilter("abc"));
        let d1 = RequestDetails::for_read(
            RequestType::Global,
            Some(f.clone()),
            Some(Pagination { page: 0, page_size: 20 }),
        );
        let d2 = RequestDetails::for_read(
            RequestType::Global,
            Some(f),
            Some(Pagination { page: 1, page_size: 20 }),
        );
        assert_eq!(d1.no_pagination_cache_key(), d2.no_pagination_cache_key());
        assert_ne!(d1.cache_key(), d2.cache_key());
    }

    #[test]
    fn is_empty_and_assert_empty() {
        let d = RequestDetails::for_read(RequestType::Global, None, None);
        assert!(d.is_empty());
        assert!(d.assert_empty("get_by_id").is_ok());

        let d2 = RequestDetails::for_read(
            RequestType::Global,
            None,
            Some(Pagination::default()),
        );
        assert!(!d2.is_empty());
        assert!(d2.assert_empty("get_by_id").is_err());
    }

    #[test]
    fn local_copy_preserves_everything_but_request_type() {
        let f: Arc<dyn Filter> = Arc::new(EqFilter("abc"));
        let d = RequestDetails::for_read(RequestType::Global, Some(f), Some(Pagination::default()));
        let local = d.local_copy();
        assert_eq!(local.request_type(), RequestType::Local);
        assert_eq!(local.cache_key(), d.cache_key());
        assert_eq!(local.should_overwrite(), d.should_overwrite());
    }
}

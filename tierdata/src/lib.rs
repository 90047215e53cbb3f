#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

//! Orchestration crate: wires [`tierdata_core`]'s contracts and
//! [`tierdata_local`]'s on-device tier together into [`SourceList`], the
//! multi-tier cascade coordinator. Mirrors the role the teacher's top-level
//! `hitbox` crate plays over `hitbox-core`/`hitbox-backend`.

mod config;
mod source_list;

pub use config::{SourceListConfig, SourceListConfigBuilder};
pub use source_list::SourceList;

pub use tierdata_core::{
    BulkFetch, CacheKeyDigest, DeleteStatus, Filter, Pagination, RequestDetails, RequestType,
    Source, SourceError, SourceKind, SourceResult, WireObject, DEFAULT_PAGE_SIZE,
};
pub use tierdata_core::Bindings;

/// Re-exports for building a local cache tier on top of [`SourceList`].
///
/// Named the way the teacher's `hitbox::backend` module re-exports
/// `hitbox_backend` for callers assembling their own cache stack.
pub mod local {
    pub use tierdata_local::{ItemsStore, LocalSource, MemoryItemsStore, MemoryRequestCacheStore, RequestCacheStore};
}

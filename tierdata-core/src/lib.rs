//! Entity bindings, request/cache-key types, and the [`Source`] trait shared
//! by every tierdata tier.
//!
//! This crate has no opinion on storage or transport — it only defines the
//! vocabulary ([`Bindings`], [`RequestDetails`], [`Source`]) that
//! `tierdata-local`, `tierdata-sled`, `tierdata-remote`, and `tierdata` build
//! on.

mod bindings;
mod error;
mod key;
mod request;
mod result;
mod source;
mod wire;

pub use bindings::Bindings;
pub use error::{SourceError, SourceResult};
pub use key::CacheKeyDigest;
pub use request::{Filter, Pagination, RequestDetails, RequestType, DEFAULT_PAGE_SIZE};
pub use result::{BulkFetch, DeleteStatus};
pub use source::{Source, SourceKind};
pub use wire::WireObject;

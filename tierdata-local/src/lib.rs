//! The on-device cache tier: item storage, request-cache storage, and the
//! [`LocalSource`] that combines them into a [`tierdata_core::Source`].
//!
//! [`memory`] provides a [`dashmap`]-backed in-memory implementation of both
//! storage contracts; durable, restart-surviving storage lives in the
//! sibling `tierdata-sled` crate, built against the same [`ItemsStore`] and
//! [`RequestCacheStore`] traits defined here.

mod local_source;
mod memory;
mod persistence;

pub use local_source::LocalSource;
pub use memory::{MemoryItemsStore, MemoryRequestCacheStore};
pub use persistence::{ItemsStore, RequestCacheStore};

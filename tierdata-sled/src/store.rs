//! [`SledBackend`]: durable [`ItemsStore`] + [`RequestCacheStore`]
//! implementation backed by three [`sled::Tree`]s per entity type.
//!
//! Every blocking sled call is pushed onto `tokio::task::spawn_blocking`,
//! mirroring the teacher's durable backend, which never calls its embedded
//! store's synchronous methods directly from an async fn body.

use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tierdata_core::{Bindings, CacheKeyDigest, SourceError, SourceResult};
use tierdata_local::{ItemsStore, RequestCacheStore};

use crate::handle::SledHandle;

fn join_err(e: tokio::task::JoinError) -> SourceError {
    SourceError::server_error_with_source("sled task panicked", e)
}

fn sled_err(e: sled::Error) -> SourceError {
    SourceError::server_error_with_source("sled error", e)
}

fn decode_err(e: serde_json::Error) -> SourceError {
    SourceError::server_error_with_source("failed to decode stored value", e)
}

/// Durable storage for one entity type, spanning three named trees:
/// `"{path_prefix}_items"`, `"{path_prefix}_requestCache"`, and
/// `"{path_prefix}_paginationRequestCache"`.
///
/// Implements both [`ItemsStore`] and [`RequestCacheStore`] so a single
/// instance can back a `LocalSource`'s durable tier exactly like
/// [`tierdata_local::memory::MemoryItemsStore`] and
/// [`tierdata_local::memory::MemoryRequestCacheStore`] back its in-memory
/// tier.
pub struct SledBackend<T, B> {
    handle: SledHandle,
    items_tree: String,
    request_tree: String,
    pagination_tree: String,
    bindings: Arc<B>,
    _marker: PhantomData<fn() -> T>,
}

impl<T, B> Clone for SledBackend<T, B> {
    fn clone(&self) -> Self {
        SledBackend {
            handle: self.handle.clone(),
            items_tree: self.items_tree.clone(),
            request_tree: self.request_tree.clone(),
            pagination_tree: self.pagination_tree.clone(),
            bindings: self.bindings.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T, B> SledBackend<T, B> {
    /// Builds a durable backend for one entity type, rooted at
    /// `path_prefix` within `handle`'s database.
    pub fn new(handle: SledHandle, path_prefix: &str, bindings: Arc<B>) -> Self {
        SledBackend {
            handle,
            items_tree: format!("{path_prefix}_items"),
            request_tree: format!("{path_prefix}_requestCache"),
            pagination_tree: format!("{path_prefix}_paginationRequestCache"),
            bindings,
            _marker: PhantomData,
        }
    }

    /// Resolves once the underlying database is open.
    pub async fn ready(&self) -> SourceResult<()> {
        self.handle.ready().await
    }

    async fn items_tree(&self) -> SourceResult<sled::Tree> {
        let db = self.handle.db().await?;
        db.open_tree(&self.items_tree).map_err(sled_err)
    }

    async fn request_tree(&self) -> SourceResult<sled::Tree> {
        let db = self.handle.db().await?;
        db.open_tree(&self.request_tree).map_err(sled_err)
    }

    async fn pagination_tree(&self) -> SourceResult<sled::Tree> {
        let db = self.handle.db().await?;
        db.open_tree(&self.pagination_tree).map_err(sled_err)
    }
}

fn decode_ids(bytes: &[u8]) -> SourceResult<HashSet<String>> {
    let ids: Vec<String> = serde_json::from_slice(bytes).map_err(decode_err)?;
    Ok(ids.into_iter().collect())
}

fn encode_ids(ids: &HashSet<String>) -> SourceResult<Vec<u8>> {
    let mut sorted: Vec<&String> = ids.iter().collect();
    sorted.sort();
    serde_json::to_vec(&sorted).map_err(decode_err)
}

fn pagination_key(no_pagination_cache_key: &CacheKeyDigest, cache_key: &CacheKeyDigest) -> String {
    format!("{no_pagination_cache_key}/{cache_key}")
}

#[async_trait]
impl<T, B> ItemsStore<T> for SledBackend<T, B>
where
    T: Clone + Send + Sync,
    B: Bindings<T> + Send + Sync,
{
    async fn get(&self, id: &str) -> SourceResult<Option<T>> {
        let tree = self.items_tree().await?;
        let id = id.to_string();
        let raw = tokio::task::spawn_blocking(move || tree.get(id.as_bytes()))
            .await
            .map_err(join_err)?
            .map_err(sled_err)?;
        match raw {
            None => Ok(None),
            Some(bytes) => {
                let wire: tierdata_core::WireObject =
                    serde_json::from_slice(&bytes).map_err(decode_err)?;
                self.bindings.from_wire(&wire).map(Some)
            }
        }
    }

    async fn get_many(&self, ids: &[String]) -> SourceResult<HashMap<String, T>> {
        let tree = self.items_tree().await?;
        let ids = ids.to_vec();
        let raw: Vec<(String, Option<sled::IVec>)> = tokio::task::spawn_blocking(move || {
            ids.into_iter()
                .map(|id| {
                    let value = tree.get(id.as_bytes());
                    value.map(|v| (id, v))
                })
                .collect::<Result<Vec<(String, Option<sled::IVec>)>, sled::Error>>()
        })
        .await
        .map_err(join_err)?
        .map_err(sled_err)?;

        let mut out = HashMap::new();
        for (id, maybe_bytes) in raw {
            if let Some(bytes) = maybe_bytes {
                let wire: tierdata_core::WireObject =
                    serde_json::from_slice(&bytes).map_err(decode_err)?;
                out.insert(id, self.bindings.from_wire(&wire)?);
            }
        }
        Ok(out)
    }

    async fn get_all(&self) -> SourceResult<Vec<T>> {
        let tree = self.items_tree().await?;
        let raw: Vec<sled::IVec> = tokio::task::spawn_blocking(move || {
            tree.iter()
                .values()
                .collect::<Result<Vec<_>, sled::Error>>()
        })
        .await
        .map_err(join_err)?
        .map_err(sled_err)?;

        raw.into_iter()
            .map(|bytes| {
                let wire: tierdata_core::WireObject =
                    serde_json::from_slice(&bytes).map_err(decode_err)?;
                self.bindings.from_wire(&wire)
            })
            .collect()
    }

    async fn put(&self, id: String, item: T, overwrite: bool) -> SourceResult<()> {
        let wire = self.bindings.to_wire(&item);
        let bytes = serde_json::to_vec(&wire).map_err(decode_err)?;
        let tree = self.items_tree().await?;
        tokio::task::spawn_blocking(move || -> Result<(), sled::Error> {
            if overwrite || !tree.contains_key(id.as_bytes())? {
                tree.insert(id.as_bytes(), bytes)?;
            }
            Ok(())
        })
        .await
        .map_err(join_err)?
        .map_err(sled_err)?;
        Ok(())
    }

    async fn put_many(&self, items: HashMap<String, T>, overwrite: bool) -> SourceResult<()> {
        let mut encoded = Vec::with_capacity(items.len());
        for (id, item) in items {
            let wire = self.bindings.to_wire(&item);
            let bytes = serde_json::to_vec(&wire).map_err(decode_err)?;
            encoded.push((id, bytes));
        }
        let tree = self.items_tree().await?;
        tokio::task::spawn_blocking(move || -> Result<(), sled::Error> {
            for (id, bytes) in encoded {
                if overwrite || !tree.contains_key(id.as_bytes())? {
                    tree.insert(id.as_bytes(), bytes)?;
                }
            }
            Ok(())
        })
        .await
        .map_err(join_err)?
        .map_err(sled_err)?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> SourceResult<bool> {
        let tree = self.items_tree().await?;
        let id = id.to_string();
        let removed = tokio::task::spawn_blocking(move || tree.remove(id.as_bytes()))
            .await
            .map_err(join_err)?
            .map_err(sled_err)?;
        Ok(removed.is_some())
    }

    async fn clear(&self) -> SourceResult<()> {
        let tree = self.items_tree().await?;
        tokio::task::spawn_blocking(move || tree.clear())
            .await
            .map_err(join_err)?
            .map_err(sled_err)
    }
}

#[async_trait]
impl<T, B> RequestCacheStore for SledBackend<T, B>
where
    T: Send + Sync,
    B: Send + Sync,
{
    async fn get(
        &self,
        cache_key: &CacheKeyDigest,
        no_pagination_cache_key: &CacheKeyDigest,
        paginated: bool,
    ) -> SourceResult<Option<HashSet<String>>> {
        let (tree, key) = if paginated {
            (
                self.pagination_tree().await?,
                pagination_key(no_pagination_cache_key, cache_key),
            )
        } else {
            (self.request_tree().await?, cache_key.as_str().to_string())
        };

        let raw = tokio::task::spawn_blocking(move || tree.get(key.as_bytes()))
            .await
            .map_err(join_err)?
            .map_err(sled_err)?;
        match raw {
            None => Ok(None),
            Some(bytes) => decode_ids(&bytes).map(Some),
        }
    }

    async fn put(
        &self,
        cache_key: &CacheKeyDigest,
        no_pagination_cache_key: &CacheKeyDigest,
        paginated: bool,
        ids: HashSet<String>,
    ) -> SourceResult<()> {
        if ids.is_empty() {
            return self
                .clear_for_request(cache_key, no_pagination_cache_key, paginated)
                .await;
        }
        let bytes = encode_ids(&ids)?;
        let (tree, key) = if paginated {
            (
                self.pagination_tree().await?,
                pagination_key(no_pagination_cache_key, cache_key),
            )
        } else {
            (self.request_tree().await?, cache_key.as_str().to_string())
        };
        tokio::task::spawn_blocking(move || tree.insert(key.as_bytes(), bytes))
            .await
            .map_err(join_err)?
            .map_err(sled_err)?;
        Ok(())
    }

    async fn clear_for_request(
        &self,
        cache_key: &CacheKeyDigest,
        no_pagination_cache_key: &CacheKeyDigest,
        paginated: bool,
    ) -> SourceResult<()> {
        let (tree, key) = if paginated {
            (
                self.pagination_tree().await?,
                pagination_key(no_pagination_cache_key, cache_key),
            )
        } else {
            (self.request_tree().await?, cache_key.as_str().to_string())
        };
        tokio::task::spawn_blocking(move || tree.remove(key.as_bytes()))
            .await
            .map_err(join_err)?
            .map_err(sled_err)?;
        Ok(())
    }

    async fn invalidate_id(&self, id: &str) -> SourceResult<()> {
        let id = id.to_string();

        let request_tree = self.request_tree().await?;
        let request_id = id.clone();
        tokio::task::spawn_blocking(move || -> Result<(), sled::Error> {
            let mut to_delete = Vec::new();
            let mut to_update = Vec::new();
            for entry in request_tree.iter() {
                let (key, value) = entry?;
                let mut ids: Vec<String> =
                    serde_json::from_slice(&value).unwrap_or_default();
                if !ids.iter().any(|i| i == &request_id) {
                    continue;
                }
                ids.retain(|i| i != &request_id);
                if ids.is_empty() {
                    to_delete.push(key);
                } else {
                    let encoded = serde_json::to_vec(&ids).unwrap_or_default();
                    to_update.push((key, encoded));
                }
            }
            for key in to_delete {
                request_tree.remove(key)?;
            }
            for (key, value) in to_update {
                request_tree.insert(key, value)?;
            }
            Ok(())
        })
        .await
        .map_err(join_err)?
        .map_err(sled_err)?;

        let pagination_tree = self.pagination_tree().await?;
        tokio::task::spawn_blocking(move || -> Result<(), sled::Error> {
            let mut to_delete = Vec::new();
            let mut to_update = Vec::new();
            for entry in pagination_tree.iter() {
                let (key, value) = entry?;
                let mut ids: Vec<String> =
                    serde_json::from_slice(&value).unwrap_or_default();
                if !ids.iter().any(|i| i == &id) {
                    continue;
                }
                ids.retain(|i| i != &id);
                if ids.is_empty() {
                    to_delete.push(key);
                } else {
                    let encoded = serde_json::to_vec(&ids).unwrap_or_default();
                    to_update.push((key, encoded));
                }
            }
            for key in to_delete {
                pagination_tree.remove(key)?;
            }
            for (key, value) in to_update {
                pagination_tree.insert(key, value)?;
            }
            Ok(())
        })
        .await
        .map_err(join_err)?
        .map_err(sled_err)?;

        Ok(())
    }

    async fn clear(&self) -> SourceResult<()> {
        let request_tree = self.request_tree().await?;
        let pagination_tree = self.pagination_tree().await?;
        tokio::task::spawn_blocking(move || -> Result<(), sled::Error> {
            request_tree.clear()?;
            pagination_tree.clear()?;
            Ok(())
        })
        .await
        .map_err(join_err)?
        .map_err(sled_err)
    }
}

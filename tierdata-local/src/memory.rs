//! In-memory [`ItemsStore`]/[`RequestCacheStore`] implementations backed by
//! [`dashmap::DashMap`], matching the concurrent in-memory map the teacher
//! reaches for (`hitbox-moka`'s `moka::future::Cache`, `hitbox-test`'s
//! `MockBackend`) whenever an in-process store needs to be shared across
//! tasks without an external `Mutex`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tierdata_core::{CacheKeyDigest, SourceResult};

use crate::persistence::{ItemsStore, RequestCacheStore};

/// In-memory [`ItemsStore`]. Cheap to clone; the underlying map is shared
/// via an `Arc`.
#[derive(Clone)]
pub struct MemoryItemsStore<T> {
    items: Arc<DashMap<String, T>>,
}

impl<T> Default for MemoryItemsStore<T> {
    fn default() -> Self {
        MemoryItemsStore {
            items: Arc::new(DashMap::new()),
        }
    }
}

impl<T> MemoryItemsStore<T> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of entities currently stored.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
impl<T> ItemsStore<T> for MemoryItemsStore<T>
where
    T: Clone + Send + Sync,
{
    async fn get(&self, id: &str) -> SourceResult<Option<T>> {
        Ok(self.items.get(id).map(|r| r.value().clone()))
    }

    async fn get_many(&self, ids: &[String]) -> SourceResult<HashMap<String, T>> {
        let mut out = HashMap::with_capacity(ids.len());
        for id in ids {
            if let Some(r) = self.items.get(id) {
                out.insert(id.clone(), r.value().clone());
            }
        }
        Ok(out)
    }

    async fn get_all(&self) -> SourceResult<Vec<T>> {
        Ok(self.items.iter().map(|r| r.value().clone()).collect())
    }

    async fn put(&self, id: String, item: T, overwrite: bool) -> SourceResult<()> {
        if overwrite {
            self.items.insert(id, item);
        } else {
            self.items.entry(id).or_insert(item);
        }
        Ok(())
    }

    async fn put_many(&self, items: HashMap<String, T>, overwrite: bool) -> SourceResult<()> {
        for (id, item) in items {
            if overwrite {
                self.items.insert(id, item);
            } else {
                self.items.entry(id).or_insert(item);
            }
        }
        Ok(())
    }

    async fn remove(&self, id: &str) -> SourceResult<bool> {
        Ok(self.items.remove(id).is_some())
    }

    async fn clear(&self) -> SourceResult<()> {
        self.items.clear();
        Ok(())
    }
}

/// In-memory [`RequestCacheStore`]. Cheap to clone; both underlying maps are
/// shared via an `Arc`.
#[derive(Clone)]
pub struct MemoryRequestCacheStore {
    unpaginated: Arc<DashMap<String, HashSet<String>>>,
    paginated: Arc<DashMap<String, DashMap<String, HashSet<String>>>>,
}

impl Default for MemoryRequestCacheStore {
    fn default() -> Self {
        MemoryRequestCacheStore {
            unpaginated: Arc::new(DashMap::new()),
            paginated: Arc::new(DashMap::new()),
        }
    }
}

impl MemoryRequestCacheStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RequestCacheStore for MemoryRequestCacheStore {
    async fn get(
        &self,
        cache_key: &CacheKeyDigest,
        no_pagination_cache_key: &CacheKeyDigest,
        paginated: bool,
    ) -> SourceResult<Option<HashSet<String>>> {
        if paginated {
            Ok(self
                .paginated
                .get(no_pagination_cache_key.as_str())
                .and_then(|group| group.get(cache_key.as_str()).map(|ids| ids.clone())))
        } else {
            Ok(self.unpaginated.get(cache_key.as_str()).map(|ids| ids.clone()))
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
        if paginated {
            let group = self
                .paginated
                .entry(no_pagination_cache_key.as_str().to_string())
                .or_default();
            group.insert(cache_key.as_str().to_string(), ids);
        } else {
            self.unpaginated.insert(cache_key.as_str().to_string(), ids);
        }
        Ok(())
    }

    async fn clear_for_request(
        &self,
        cache_key: &CacheKeyDigest,
        no_pagination_cache_key: &CacheKeyDigest,
        paginated: bool,
    ) -> SourceResult<()> {
        if paginated {
            if let Some(group) = self.paginated.get(no_pagination_cache_key.as_str()) {
                group.remove(cache_key.as_str());
                let is_empty = group.is_empty();
                drop(group);
                if is_empty {
                    self.paginated.remove(no_pagination_cache_key.as_str());
                }
            }
        } else {
            self.unpaginated.remove(cache_key.as_str());
        }
        Ok(())
    }

    async fn invalidate_id(&self, id: &str) -> SourceResult<()> {
        self.unpaginated.retain(|_, ids| {
            ids.remove(id);
            !ids.is_empty()
        });
        let mut empty_groups = Vec::new();
        for group in self.paginated.iter() {
            group.retain(|_, ids| {
                ids.remove(id);
                !ids.is_empty()
            });
            if group.is_empty() {
                empty_groups.push(group.key().clone());
            }
        }
        for key in empty_groups {
            self.paginated.remove(&key);
        }
        Ok(())
    }

    async fn clear(&self) -> SourceResult<()> {
        self.unpaginated.clear();
        self.paginated.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(s: &str) -> CacheKeyDigest {
        CacheKeyDigest::of(s)
    }

    #[tokio::test]
    async fn items_store_roundtrip() {
        let store = MemoryItemsStore::new();
        store.put("1".to_string(), "alice", true).await.unwrap();
        assert_eq!(store.get("1").await.unwrap(), Some("alice"));
        assert_eq!(store.get("2").await.unwrap(), None);
        assert!(store.remove("1").await.unwrap());
        assert!(!store.remove("1").await.unwrap());
    }

    #[tokio::test]
    async fn put_without_overwrite_keeps_existing_entry() {
        let store = MemoryItemsStore::new();
        store.put("1".to_string(), "alice", true).await.unwrap();
        store.put("1".to_string(), "bob", false).await.unwrap();
        assert_eq!(store.get("1").await.unwrap(), Some("alice"));
    }

    #[tokio::test]
    async fn empty_set_clears_entry() {
        let store = MemoryRequestCacheStore::new();
        let ck = digest("a");
        let npck = digest("a-group");
        let mut ids = HashSet::new();
        ids.insert("1".to_string());
        store.put(&ck, &npck, false, ids).await.unwrap();
        assert!(store.get(&ck, &npck, false).await.unwrap().is_some());
        store.put(&ck, &npck, false, HashSet::new()).await.unwrap();
        assert!(store.get(&ck, &npck, false).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalidate_id_sweeps_paginated_and_unpaginated() {
        let store = MemoryRequestCacheStore::new();
        let ck1 = digest("page-0");
        let ck2 = digest("page-1");
        let npck = digest("group");
        let uck = digest("unpaginated");

        let mut ids1 = HashSet::new();
        ids1.insert("shared".to_string());
        ids1.insert("only-page0".to_string());
        store.put(&ck1, &npck, true, ids1).await.unwrap();

        let mut ids2 = HashSet::new();
        ids2.insert("shared".to_string());
        store.put(&ck2, &npck, true, ids2).await.unwrap();

        let mut uids = HashSet::new();
        uids.insert("shared".to_string());
        store.put(&uck, &uck, false, uids).await.unwrap();

        store.invalidate_id("shared").await.unwrap();

        let remaining_page0 = store.get(&ck1, &npck, true).await.unwrap().unwrap();
        assert!(!remaining_page0.contains("shared"));
        assert!(remaining_page0.contains("only-page0"));

        assert!(store.get(&ck2, &npck, true).await.unwrap().is_none());
        assert!(store.get(&uck, &uck, false).await.unwrap().is_none());
    }
}

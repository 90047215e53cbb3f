//! [`ScriptedRemoteSource`]: an in-memory stand-in for a networked
//! [`tierdata_core::Source`], used by `tierdata`'s integration tests instead
//! of spinning up `wiremock` for every cascade scenario.
//!
//! Grounded in `hitbox-test`'s `MockBackend`: an `Arc`'d shared map plus
//! `AtomicUsize` counters per operation, so a test can assert not just the
//! returned value but how many times (and in what order) a source was
//! consulted — e.g. "R's `get_items` was called exactly once" to prove a
//! cache hit short-circuited the cascade.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tierdata_core::{
    Bindings, BulkFetch, DeleteStatus, RequestDetails, Source, SourceError, SourceKind,
    SourceResult,
};
use tokio::sync::Mutex;

/// Per-operation call counters, snapshotted for test assertions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CountersSnapshot {
    pub get_by_id: usize,
    pub get_by_ids: usize,
    pub get_items: usize,
    pub set_item: usize,
    pub set_items: usize,
    pub delete: usize,
    pub delete_ids: usize,
}

#[derive(Default)]
struct Counters {
    get_by_id: AtomicUsize,
    get_by_ids: AtomicUsize,
    get_items: AtomicUsize,
    set_item: AtomicUsize,
    set_items: AtomicUsize,
    delete: AtomicUsize,
    delete_ids: AtomicUsize,
}

impl Counters {
    fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            get_by_id: self.get_by_id.load(Ordering::SeqCst),
            get_by_ids: self.get_by_ids.load(Ordering::SeqCst),
            get_items: self.get_items.load(Ordering::SeqCst),
            set_item: self.set_item.load(Ordering::SeqCst),
            set_items: self.set_items.load(Ordering::SeqCst),
            delete: self.delete.load(Ordering::SeqCst),
            delete_ids: self.delete_ids.load(Ordering::SeqCst),
        }
    }
}

struct Inner<T> {
    items: Mutex<HashMap<String, T>>,
    next_id: AtomicUsize,
    id_prefix: String,
    fail_with: Mutex<Option<SourceError>>,
    counters: Counters,
}

/// A scripted, in-memory [`tierdata_core::Source`] of [`SourceKind::Remote`].
///
/// Seed it with a fixed dataset ([`ScriptedRemoteSource::seed`]), optionally
/// arm a standing failure ([`ScriptedRemoteSource::set_failure`]), and
/// inspect how it was used afterward ([`ScriptedRemoteSource::counters`]).
///
/// `set_items` always fails with [`SourceError::Unexpected`], mirroring the
/// restriction spec'd for real remote sources: bulk writes cannot be pushed
/// to a remote, only individual creates via `set_item`.
pub struct ScriptedRemoteSource<T, B> {
    inner: Arc<Inner<T>>,
    bindings: Arc<B>,
    with_id: Arc<dyn Fn(T, String) -> T + Send + Sync>,
}

impl<T, B> Clone for ScriptedRemoteSource<T, B> {
    fn clone(&self) -> Self {
        ScriptedRemoteSource {
            inner: Arc::clone(&self.inner),
            bindings: Arc::clone(&self.bindings),
            with_id: Arc::clone(&self.with_id),
        }
    }
}

impl<T, B> ScriptedRemoteSource<T, B>
where
    T: Clone + Send + Sync + 'static,
    B: Bindings<T> + Send + Sync,
{
    /// Builds an empty scripted remote. `with_id` assigns a freshly minted
    /// id to an id-less item, emulating a server-assigned primary key.
    pub fn new(bindings: Arc<B>, with_id: impl Fn(T, String) -> T + Send + Sync + 'static) -> Self {
        ScriptedRemoteSource {
            inner: Arc::new(Inner {
                items: Mutex::new(HashMap::new()),
                next_id: AtomicUsize::new(0),
                id_prefix: "remote".to_string(),
                fail_with: Mutex::new(None),
                counters: Counters::default(),
            }),
            bindings,
            with_id: Arc::new(with_id),
        }
    }

    /// Seeds the dataset with a single entity. The entity must already carry
    /// an id.
    pub async fn seed(&self, item: T) {
        let id = self
            .bindings
            .id_of(&item)
            .expect("seeded entities must carry an id");
        self.inner.items.lock().await.insert(id, item);
    }

    /// Seeds the dataset with several entities at once.
    pub async fn seed_many(&self, items: impl IntoIterator<Item = T>) {
        for item in items {
            self.seed(item).await;
        }
    }

    /// Arms (or clears, with `None`) a standing failure returned by every
    /// subsequent operation until cleared.
    pub async fn set_failure(&self, error: Option<SourceError>) {
        *self.inner.fail_with.lock().await = error;
    }

    /// Snapshots the per-operation call counters.
    pub fn counters(&self) -> CountersSnapshot {
        self.inner.counters.snapshot()
    }

    /// The number of entities currently held.
    pub async fn len(&self) -> usize {
        self.inner.items.lock().await.len()
    }

    async fn check_failure(&self) -> SourceResult<()> {
        match self.inner.fail_with.lock().await.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn next_id(&self) -> String {
        let n = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        format!("{}-{n}", self.inner.id_prefix)
    }
}

#[async_trait]
impl<T, B> Source<T> for ScriptedRemoteSource<T, B>
where
    T: Clone + Send + Sync + 'static,
    B: Bindings<T> + Send + Sync + 'static,
{
    fn kind(&self) -> SourceKind {
        SourceKind::Remote
    }

    async fn get_by_id(&self, id: &str, request: &RequestDetails) -> SourceResult<Option<T>> {
        request.assert_empty("ScriptedRemoteSource::get_by_id")?;
        self.inner.counters.get_by_id.fetch_add(1, Ordering::SeqCst);
        self.check_failure().await?;
        Ok(self.inner.items.lock().await.get(id).cloned())
    }

    async fn get_by_ids(&self, ids: &[String], request: &RequestDetails) -> SourceResult<BulkFetch<T>> {
        request.assert_empty("ScriptedRemoteSource::get_by_ids")?;
        self.inner.counters.get_by_ids.fetch_add(1, Ordering::SeqCst);
        self.check_failure().await?;
        let items = self.inner.items.lock().await;
        let found: HashMap<String, T> = ids
            .iter()
            .filter_map(|id| items.get(id).map(|v| (id.clone(), v.clone())))
            .collect();
        Ok(BulkFetch::new(found, ids.to_vec()))
    }

    async fn get_items(&self, _request: &RequestDetails) -> SourceResult<Option<Vec<T>>> {
        self.inner.counters.get_items.fetch_add(1, Ordering::SeqCst);
        self.check_failure().await?;
        Ok(Some(self.inner.items.lock().await.values().cloned().collect()))
    }

    async fn set_item(&self, item: T, _request: &RequestDetails) -> SourceResult<T> {
        self.inner.counters.set_item.fetch_add(1, Ordering::SeqCst);
        self.check_failure().await?;
        let resolved = match self.bindings.id_of(&item) {
            Some(_) => item,
            None => {
                let id = self.next_id();
                (self.with_id)(item, id)
            }
        };
        let id = self
            .bindings
            .id_of(&resolved)
            .expect("resolved item always carries an id");
        self.inner.items.lock().await.insert(id, resolved.clone());
        Ok(resolved)
    }

    async fn set_items(&self, _items: Vec<T>, _request: &RequestDetails) -> SourceResult<Vec<T>> {
        self.inner.counters.set_items.fetch_add(1, Ordering::SeqCst);
        Err(SourceError::Unexpected(
            "set_items is not supported on a remote source".to_string(),
        ))
    }

    async fn delete(&self, id: &str, _request: &RequestDetails) -> SourceResult<DeleteStatus> {
        self.inner.counters.delete.fetch_add(1, Ordering::SeqCst);
        self.check_failure().await?;
        let removed = self.inner.items.lock().await.remove(id).is_some();
        Ok(if removed {
            DeleteStatus::Deleted
        } else {
            DeleteStatus::Missing
        })
    }

    async fn delete_ids(&self, ids: &[String], request: &RequestDetails) -> SourceResult<Vec<(String, DeleteStatus)>> {
        self.inner.counters.delete_ids.fetch_add(1, Ordering::SeqCst);
        self.check_failure().await?;
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let status = Source::delete(self, id, request).await?;
            results.push((id.clone(), status));
        }
        Ok(results)
    }

    async fn clear_for_request(&self, _request: &RequestDetails) -> SourceResult<()> {
        Ok(())
    }

    async fn clear(&self) -> SourceResult<()> {
        Ok(())
    }
}

//! [`LocalSource`]: the on-device cache tier. Backed by an [`ItemsStore`]
//! and a [`RequestCacheStore`], parameterized so the same implementation
//! serves both the in-memory tier ([`crate::memory`]) and the durable
//! `tierdata-sled` tier.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tierdata_core::{
    Bindings, BulkFetch, DeleteStatus, RequestDetails, RequestType, Source, SourceError, SourceKind,
    SourceResult,
};
use tracing::{debug, instrument, trace};

use crate::persistence::{ItemsStore, RequestCacheStore};

/// The on-device cache tier.
///
/// `set_item` never touches the request cache — a single-entity write has
/// no query identity to record against. `set_items` with an empty `items`
/// list is equivalent to [`LocalSource::clear_for_request`] rather than a
/// no-op, since a request that legitimately resolved to zero entities must
/// still overwrite whatever that request previously cached.
pub struct LocalSource<T, B> {
    items: Arc<dyn ItemsStore<T>>,
    requests: Arc<dyn RequestCacheStore>,
    bindings: Arc<B>,
}

impl<T, B> LocalSource<T, B> {
    /// Builds a `LocalSource` over the given item and request-cache stores.
    pub fn new(
        items: Arc<dyn ItemsStore<T>>,
        requests: Arc<dyn RequestCacheStore>,
        bindings: Arc<B>,
    ) -> Self {
        LocalSource {
            items,
            requests,
            bindings,
        }
    }
}

impl<T, B> LocalSource<T, B>
where
    T: Send + Sync,
    B: Bindings<T> + Send + Sync,
{
    fn require_id(&self, item: &T, caller: &str) -> SourceResult<String> {
        self.bindings.id_of(item).ok_or_else(|| {
            SourceError::Unexpected(format!("{caller} requires an entity with an assigned id"))
        })
    }

    /// Resolves the id an entity will be stored under, minting one via
    /// [`Bindings::assign_id`] when the entity doesn't carry one.
    ///
    /// A caller-supplied entity with no id and no client-side id generator is
    /// a caller error, not a programmer error — it surfaces as `BadRequest`.
    fn assign_or_require_id(&self, item: T) -> SourceResult<T> {
        if self.bindings.id_of(&item).is_some() {
            return Ok(item);
        }
        self.bindings.assign_id(item).ok_or_else(|| {
            SourceError::BadRequest(
                "LocalSource::set_item requires either an entity with an assigned id or a \
                 Bindings implementation that overrides assign_id"
                    .to_string(),
            )
        })
    }
}

#[async_trait]
impl<T, B> Source<T> for LocalSource<T, B>
where
    T: Clone + Send + Sync,
    B: Bindings<T> + Send + Sync,
{
    fn kind(&self) -> SourceKind {
        SourceKind::Local
    }

    #[instrument(skip(self, request), fields(id = %id))]
    async fn get_by_id(&self, id: &str, request: &RequestDetails) -> SourceResult<Option<T>> {
        request.assert_empty("LocalSource::get_by_id")?;
        self.items.get(id).await
    }

    #[instrument(skip(self, ids, request), fields(count = ids.len()))]
    async fn get_by_ids(&self, ids: &[String], request: &RequestDetails) -> SourceResult<BulkFetch<T>> {
        request.assert_empty("LocalSource::get_by_ids")?;
        let found = self.items.get_many(ids).await?;
        Ok(BulkFetch::new(found, ids.to_vec()))
    }

    #[instrument(skip(self, request), fields(cache_key = %request.cache_key()))]
    async fn get_items(&self, request: &RequestDetails) -> SourceResult<Option<Vec<T>>> {
        if request.request_type() == RequestType::AllLocal {
            return Ok(Some(self.items.get_all().await?));
        }
        let paginated = request.pagination().is_some();
        let cached_ids = self
            .requests
            .get(request.cache_key(), request.no_pagination_cache_key(), paginated)
            .await?;
        let Some(ids) = cached_ids else {
            return Ok(None);
        };
        let ids: Vec<String> = ids.into_iter().collect();
        let found = self.items.get_many(&ids).await?;
        Ok(Some(found.into_values().collect()))
    }

    #[instrument(skip(self, item, request))]
    async fn set_item(&self, item: T, request: &RequestDetails) -> SourceResult<T> {
        trace!("LocalSource::set_item entry");
        let item = self.assign_or_require_id(item)?;
        let id = self.require_id(&item, "LocalSource::set_item")?;
        self.items.put(id, item.clone(), request.should_overwrite()).await?;
        trace!("LocalSource::set_item exit");
        Ok(item)
    }

    #[instrument(skip(self, items, request), fields(cache_key = %request.cache_key(), count = items.len()))]
    async fn set_items(&self, items: Vec<T>, request: &RequestDetails) -> SourceResult<Vec<T>> {
        trace!("LocalSource::set_items entry");
        if items.is_empty() {
            debug!(cache_key = %request.cache_key(), "set_items called with an empty list, clearing cached request instead");
            self.clear_for_request(request).await?;
            trace!("LocalSource::set_items exit");
            return Ok(Vec::new());
        }

        let mut by_id: HashMap<String, T> = HashMap::with_capacity(items.len());
        for item in items {
            let id = self.require_id(&item, "LocalSource::set_items")?;
            by_id.insert(id, item);
        }
        let ids: HashSet<String> = by_id.keys().cloned().collect();

        self.items.put_many(by_id.clone(), request.should_overwrite()).await?;

        let paginated = request.pagination().is_some();
        self.requests
            .put(request.cache_key(), request.no_pagination_cache_key(), paginated, ids)
            .await?;

        trace!("LocalSource::set_items exit");
        Ok(by_id.into_values().collect())
    }

    #[instrument(skip(self, request), fields(id = %id))]
    async fn delete(&self, id: &str, request: &RequestDetails) -> SourceResult<DeleteStatus> {
        let _ = request;
        trace!("LocalSource::delete entry");
        let removed = self.items.remove(id).await?;
        self.requests.invalidate_id(id).await?;
        trace!("LocalSource::delete exit");
        Ok(if removed {
            DeleteStatus::Deleted
        } else {
            DeleteStatus::Missing
        })
    }

    #[instrument(skip(self, ids, request), fields(count = ids.len()))]
    async fn delete_ids(
        &self,
        ids: &[String],
        request: &RequestDetails,
    ) -> SourceResult<Vec<(String, DeleteStatus)>> {
        let _ = request;
        trace!("LocalSource::delete_ids entry");
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let removed = self.items.remove(id).await?;
            self.requests.invalidate_id(id).await?;
            results.push((
                id.clone(),
                if removed {
                    DeleteStatus::Deleted
                } else {
                    DeleteStatus::Missing
                },
            ));
        }
        trace!("LocalSource::delete_ids exit");
        Ok(results)
    }

    #[instrument(skip(self, request), fields(cache_key = %request.cache_key()))]
    async fn clear_for_request(&self, request: &RequestDetails) -> SourceResult<()> {
        trace!("LocalSource::clear_for_request entry");
        let paginated = request.pagination().is_some();
        self.requests
            .clear_for_request(request.cache_key(), request.no_pagination_cache_key(), paginated)
            .await?;
        trace!("LocalSource::clear_for_request exit");
        Ok(())
    }

    async fn clear(&self) -> SourceResult<()> {
        trace!("LocalSource::clear entry");
        self.items.clear().await?;
        self.requests.clear().await?;
        trace!("LocalSource::clear exit");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryItemsStore, MemoryRequestCacheStore};
    use tierdata_core::WireObject;
    use url::Url;

    #[derive(Clone, Debug, PartialEq, Eq)]
    struct Widget {
        id: Option<String>,
        name: String,
    }

    struct WidgetBindings;

    impl Bindings<Widget> for WidgetBindings {
        fn id_of(&self, item: &Widget) -> Option<String> {
            item.id.clone()
        }

        fn from_wire(&self, wire: &WireObject) -> SourceResult<Widget> {
            Ok(Widget {
                id: wire.get("id").and_then(|v| v.as_str()).map(String::from),
                name: wire
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
            })
        }

        fn to_wire(&self, item: &Widget) -> WireObject {
            serde_json::json!({ "id": item.id, "name": item.name })
        }

        fn detail_url(&self, id: &str) -> Url {
            Url::parse(&format!("https://example.test/widgets/{id}")).unwrap()
        }

        fn list_url(&self) -> Url {
            Url::parse("https://example.test/widgets").unwrap()
        }
    }

    fn make_source() -> LocalSource<Widget, WidgetBindings> {
        LocalSource::new(
            Arc::new(MemoryItemsStore::new()),
            Arc::new(MemoryRequestCacheStore::new()),
            Arc::new(WidgetBindings),
        )
    }

    fn widget(id: &str, name: &str) -> Widget {
        Widget {
            id: Some(id.to_string()),
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn set_item_never_populates_request_cache() {
        let source = make_source();
        let req = RequestDetails::for_read(RequestType::Global, None, None);
        source.set_item(widget("1", "a"), &req).await.unwrap();
        assert_eq!(source.get_items(&req).await.unwrap(), None);
        assert_eq!(source.get_by_id("1", &req).await.unwrap(), Some(widget("1", "a")));
    }

    #[tokio::test]
    async fn set_items_empty_clears_cached_request() {
        let source = make_source();
        let req = RequestDetails::for_read(RequestType::Global, None, None);
        source
            .set_items(vec![widget("1", "a"), widget("2", "b")], &req)
            .await
            .unwrap();
        assert_eq!(source.get_items(&req).await.unwrap().unwrap().len(), 2);

        source.set_items(vec![], &req).await.unwrap();
        assert_eq!(source.get_items(&req).await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_invalidates_cached_request() {
        let source = make_source();
        let req = RequestDetails::for_read(RequestType::Global, None, None);
        source
            .set_items(vec![widget("1", "a"), widget("2", "b")], &req)
            .await
            .unwrap();

        let status = source.delete("1", &req).await.unwrap();
        assert_eq!(status, DeleteStatus::Deleted);

        let remaining = source.get_items(&req).await.unwrap().unwrap();
        assert_eq!(remaining, vec![widget("2", "b")]);
        assert_eq!(source.get_by_id("1", &req).await.unwrap(), None);
    }

    #[tokio::test]
    async fn get_by_ids_reports_partial_hit() {
        let source = make_source();
        let req = RequestDetails::for_read(RequestType::Global, None, None);
        source.set_item(widget("1", "a"), &req).await.unwrap();

        let fetch = source
            .get_by_ids(&["1".to_string(), "2".to_string()], &req)
            .await
            .unwrap();
        assert!(fetch.found().contains_key("1"));
        assert_eq!(fetch.missing(), &["2".to_string()]);
    }

    #[tokio::test]
    async fn all_local_ignores_request_cache() {
        let source = make_source();
        let write_req = RequestDetails::for_write(RequestType::Local, true, None);
        source.set_item(widget("1", "a"), &write_req).await.unwrap();

        let all_req = RequestDetails::for_read(RequestType::AllLocal, None, None);
        let items = source.get_items(&all_req).await.unwrap().unwrap();
        assert_eq!(items, vec![widget("1", "a")]);
    }

    struct AutoIdWidgetBindings;

    impl Bindings<Widget> for AutoIdWidgetBindings {
        fn id_of(&self, item: &Widget) -> Option<String> {
            item.id.clone()
        }

        fn from_wire(&self, wire: &WireObject) -> SourceResult<Widget> {
            WidgetBindings.from_wire(wire)
        }

        fn to_wire(&self, item: &Widget) -> WireObject {
            WidgetBindings.to_wire(item)
        }

        fn detail_url(&self, id: &str) -> Url {
            WidgetBindings.detail_url(id)
        }

        fn list_url(&self) -> Url {
            WidgetBindings.list_url()
        }

        fn assign_id(&self, item: Widget) -> Option<Widget> {
            Some(Widget {
                id: Some("generated".to_string()),
                ..item
            })
        }
    }

    #[tokio::test]
    async fn set_item_without_id_uses_assign_id() {
        let source = LocalSource::new(
            Arc::new(MemoryItemsStore::new()),
            Arc::new(MemoryRequestCacheStore::new()),
            Arc::new(AutoIdWidgetBindings),
        );
        let req = RequestDetails::for_write(RequestType::Local, true, None);
        let created = source
            .set_item(Widget { id: None, name: "new".to_string() }, &req)
            .await
            .unwrap();
        assert_eq!(created.id.as_deref(), Some("generated"));
        assert_eq!(
            source.get_by_id("generated", &req).await.unwrap(),
            Some(created)
        );
    }

    #[tokio::test]
    async fn set_item_honors_should_overwrite_false() {
        let source = make_source();
        let write_req = RequestDetails::for_write(RequestType::Local, true, None);
        source.set_item(widget("1", "a"), &write_req).await.unwrap();

        let no_overwrite = RequestDetails::for_write(RequestType::Local, false, None);
        source.set_item(widget("1", "b"), &no_overwrite).await.unwrap();

        assert_eq!(
            source.get_by_id("1", &no_overwrite).await.unwrap(),
            Some(widget("1", "a"))
        );
    }

    #[tokio::test]
    async fn set_item_without_id_and_no_assign_id_is_bad_request() {
        let source = make_source();
        let req = RequestDetails::for_write(RequestType::Local, true, None);
        let err = source
            .set_item(Widget { id: None, name: "new".to_string() }, &req)
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::BadRequest(_)));
    }
}

//! [`ReqwestRemoteSource`]: the networked tier, dispatching through
//! [`Bindings`] URLs over an ordinary [`reqwest::Client`].
//!
//! `clear`/`clear_for_request` are no-ops here — a [`crate::ReqwestRemoteSource`]
//! holds no client-side cache of its own to clear; a `SourceList` fans those
//! two calls out to local sources only (spec'd cascade behavior), so this
//! implementation only exists to complete the [`Source`] trait.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use tierdata_core::{
    Bindings, BulkFetch, DeleteStatus, RequestDetails, Source, SourceError, SourceKind,
    SourceResult,
};
use tracing::{instrument, trace};

use crate::batching::IdBatcher;
use crate::wire::ListEnvelope;

/// Default window within which successive `get_by_id` calls are coalesced
/// into a single `id__in` batch request.
pub const DEFAULT_BATCH_WINDOW: Duration = Duration::from_millis(5);

/// The networked tier: a REST backend reached through [`Bindings`] URLs.
pub struct ReqwestRemoteSource<T, B> {
    client: Client,
    bindings: Arc<B>,
    batcher: Arc<IdBatcher<T>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T, B> ReqwestRemoteSource<T, B>
where
    T: Clone + Send + Sync + 'static,
    B: Bindings<T> + Send + Sync + 'static,
{
    /// Builds a remote source with the default coalescing window
    /// ([`DEFAULT_BATCH_WINDOW`]).
    pub fn new(client: Client, bindings: Arc<B>) -> Self {
        Self::with_batch_window(client, bindings, DEFAULT_BATCH_WINDOW)
    }

    /// Builds a remote source with an explicit by-id coalescing window.
    pub fn with_batch_window(client: Client, bindings: Arc<B>, window: Duration) -> Self {
        let fetch_client = client.clone();
        let fetch_bindings = Arc::clone(&bindings);
        let batcher = IdBatcher::new(
            window,
            Arc::new(move |ids: Vec<String>| {
                let client = fetch_client.clone();
                let bindings = Arc::clone(&fetch_bindings);
                Box::pin(async move { fetch_by_ids(&client, bindings.as_ref(), &ids).await })
            }),
        );
        ReqwestRemoteSource {
            client,
            bindings,
            batcher,
            _marker: PhantomData,
        }
    }
}

async fn status_error(response: reqwest::Response) -> SourceError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    let snippet: String = body.chars().take(200).collect();
    SourceError::from_status(status.as_u16(), snippet)
}

async fn fetch_by_ids<T, B>(client: &Client, bindings: &B, ids: &[String]) -> SourceResult<HashMap<String, T>>
where
    T: Send + Sync,
    B: Bindings<T> + Send + Sync,
{
    let mut url = bindings.list_url();
    url.query_pairs_mut().append_pair("id__in", &ids.join(","));

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| SourceError::server_error_with_source("request failed", e))?;
    if !response.status().is_success() {
        return Err(status_error(response).await);
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|e| SourceError::server_error_with_source("failed to read response body", e))?;

    let wires = ListEnvelope::parse(&bytes)?;
    let mut out = HashMap::with_capacity(wires.len());
    for wire in wires {
        let item = bindings.from_wire(&wire)?;
        let id = bindings
            .id_of(&item)
            .ok_or_else(|| SourceError::server_error("response entity has no id"))?;
        out.insert(id, item);
    }
    Ok(out)
}

#[async_trait]
impl<T, B> Source<T> for ReqwestRemoteSource<T, B>
where
    T: Clone + Send + Sync + 'static,
    B: Bindings<T> + Send + Sync + 'static,
{
    fn kind(&self) -> SourceKind {
        SourceKind::Remote
    }

    #[instrument(skip(self, request), fields(id = %id))]
    async fn get_by_id(&self, id: &str, request: &RequestDetails) -> SourceResult<Option<T>> {
        request.assert_empty("ReqwestRemoteSource::get_by_id")?;
        self.batcher.queue_id(id.to_string()).await
    }

    #[instrument(skip(self, ids, request), fields(count = ids.len()))]
    async fn get_by_ids(&self, ids: &[String], request: &RequestDetails) -> SourceResult<BulkFetch<T>> {
        request.assert_empty("ReqwestRemoteSource::get_by_ids")?;

        // `IdBatcher::enqueue` is synchronous: every id below is already
        // registered with the batcher by the time this loop returns, so
        // `flush()` right after is guaranteed to see every one of them —
        // no task needs to be scheduled or polled first.
        let waiters: Vec<_> = ids
            .iter()
            .map(|id| (id.clone(), self.batcher.enqueue(id.clone())))
            .collect();

        // get_by_ids needs its answer now; don't wait out the coalescing
        // window, flush the batch as soon as every id is enqueued.
        self.batcher.flush().await;

        let mut found = HashMap::with_capacity(waiters.len());
        for (id, rx) in waiters {
            let result = rx
                .await
                .unwrap_or_else(|_| Err(SourceError::server_error("id batch dropped before resolving")));
            match result? {
                Some(item) => {
                    found.insert(id, item);
                }
                None => trace!(%id, "remote batch omitted id"),
            }
        }
        Ok(BulkFetch::new(found, ids.to_vec()))
    }

    #[instrument(skip(self, request), fields(cache_key = %request.cache_key()))]
    async fn get_items(&self, request: &RequestDetails) -> SourceResult<Option<Vec<T>>> {
        let mut url = self.bindings.list_url();
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(filter) = request.filter() {
                for (k, v) in filter.to_params()? {
                    pairs.append_pair(&k, &v);
                }
            }
            if let Some(pagination) = request.pagination() {
                pairs.append_pair("page", &pagination.page.to_string());
                pairs.append_pair("page_size", &pagination.page_size.to_string());
            }
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SourceError::server_error_with_source("request failed", e))?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| SourceError::server_error_with_source("failed to read response body", e))?;

        let wires = ListEnvelope::parse(&bytes)?;
        let items = wires
            .iter()
            .map(|wire| self.bindings.from_wire(wire))
            .collect::<SourceResult<Vec<T>>>()?;
        Ok(Some(items))
    }

    #[instrument(skip(self, item, request))]
    async fn set_item(&self, item: T, request: &RequestDetails) -> SourceResult<T> {
        let _ = request;
        let existing_id = self.bindings.id_of(&item);
        let (method, url) = match &existing_id {
            Some(id) => (Method::PUT, self.bindings.detail_url(id)),
            None => (Method::POST, self.bindings.create_url()),
        };
        let body = self.bindings.to_wire(&item);

        let response = self
            .client
            .request(method, url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SourceError::server_error_with_source("request failed", e))?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| SourceError::server_error_with_source("failed to read response body", e))?;
        let wire = ListEnvelope::parse_detail(&bytes)?;
        let created = self.bindings.from_wire(&wire)?;

        if existing_id.is_none() && self.bindings.id_of(&created).is_none() {
            return Err(SourceError::server_error("create response did not assign an id"));
        }
        Ok(created)
    }

    async fn set_items(&self, _items: Vec<T>, _request: &RequestDetails) -> SourceResult<Vec<T>> {
        Err(SourceError::Unexpected(
            "set_items is not supported on a remote source; writes must go one-by-one through set_item"
                .to_string(),
        ))
    }

    #[instrument(skip(self, request), fields(id = %id))]
    async fn delete(&self, id: &str, request: &RequestDetails) -> SourceResult<DeleteStatus> {
        let _ = request;
        let url = self.bindings.detail_url(id);
        let response = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(|e| SourceError::server_error_with_source("request failed", e))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(DeleteStatus::Missing),
            status if status.is_success() => Ok(DeleteStatus::Deleted),
            _ => Err(status_error(response).await),
        }
    }

    #[instrument(skip(self, ids, request), fields(count = ids.len()))]
    async fn delete_ids(&self, ids: &[String], request: &RequestDetails) -> SourceResult<Vec<(String, DeleteStatus)>> {
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let status = self.delete(id, request).await?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tierdata_core::{RequestType, WireObject};
    use url::Url;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
    struct Widget {
        id: Option<String>,
        name: String,
    }

    struct WidgetBindings {
        base: Url,
    }

    impl Bindings<Widget> for WidgetBindings {
        fn id_of(&self, item: &Widget) -> Option<String> {
            item.id.clone()
        }

        fn from_wire(&self, wire: &WireObject) -> SourceResult<Widget> {
            serde_json::from_value(wire.clone())
                .map_err(|e| SourceError::server_error_with_source("decode error", e))
        }

        fn to_wire(&self, item: &Widget) -> WireObject {
            serde_json::to_value(item).unwrap()
        }

        fn detail_url(&self, id: &str) -> Url {
            self.base.join(&format!("widgets/{id}")).unwrap()
        }

        fn list_url(&self) -> Url {
            self.base.join("widgets").unwrap()
        }
    }

    fn empty_request() -> RequestDetails {
        RequestDetails::for_read(RequestType::Refresh, None, None)
    }

    #[tokio::test]
    async fn get_by_id_issues_id_in_batch_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/widgets"))
            .and(query_param("id__in", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{"id": "1", "name": "alice"}]
            })))
            .mount(&server)
            .await;

        let bindings = Arc::new(WidgetBindings {
            base: Url::parse(&server.uri()).unwrap().join("/").unwrap(),
        });
        let source = ReqwestRemoteSource::new(Client::new(), bindings);
        let item = source.get_by_id("1", &empty_request()).await.unwrap();
        assert_eq!(
            item,
            Some(Widget {
                id: Some("1".to_string()),
                name: "alice".to_string()
            })
        );
    }

    #[tokio::test]
    async fn get_by_ids_flushes_immediately_instead_of_waiting_out_the_window() {
        let server = MockServer::start().await;
        // `id__in`'s order isn't asserted: the batcher coalesces ids through
        // a `HashSet`, so the joined query string order is unspecified.
        Mock::given(method("GET"))
            .and(path("/widgets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{"id": "1", "name": "alice"}, {"id": "2", "name": "bob"}]
            })))
            .mount(&server)
            .await;

        let bindings = Arc::new(WidgetBindings {
            base: Url::parse(&server.uri()).unwrap().join("/").unwrap(),
        });
        // A window far longer than any sane test timeout: if get_by_ids fell
        // back to waiting it out, the timeout below would fire first.
        let source = ReqwestRemoteSource::with_batch_window(
            Client::new(),
            bindings,
            std::time::Duration::from_secs(3600),
        );
        let fetch = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            source.get_by_ids(&["1".to_string(), "2".to_string()], &empty_request()),
        )
        .await
        .expect("get_by_ids must resolve without waiting out the coalescing window")
        .unwrap();

        assert_eq!(
            fetch.found().get("1"),
            Some(&Widget {
                id: Some("1".to_string()),
                name: "alice".to_string()
            })
        );
        assert_eq!(
            fetch.found().get("2"),
            Some(&Widget {
                id: Some("2".to_string()),
                name: "bob".to_string()
            })
        );
        assert!(fetch.missing().is_empty());
    }

    #[tokio::test]
    async fn get_by_id_resolves_missing_id_to_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/widgets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": []
            })))
            .mount(&server)
            .await;

        let bindings = Arc::new(WidgetBindings {
            base: Url::parse(&server.uri()).unwrap().join("/").unwrap(),
        });
        let source = ReqwestRemoteSource::new(Client::new(), bindings);
        let item = source.get_by_id("missing", &empty_request()).await.unwrap();
        assert_eq!(item, None);
    }

    #[tokio::test]
    async fn set_item_posts_to_create_url_when_id_absent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/widgets"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": "server-assigned",
                "name": "new"
            })))
            .mount(&server)
            .await;

        let bindings = Arc::new(WidgetBindings {
            base: Url::parse(&server.uri()).unwrap().join("/").unwrap(),
        });
        let source = ReqwestRemoteSource::new(Client::new(), bindings);
        let write_req = RequestDetails::for_write(RequestType::Global, true, None);
        let created = source
            .set_item(
                Widget {
                    id: None,
                    name: "new".to_string(),
                },
                &write_req,
            )
            .await
            .unwrap();
        assert_eq!(created.id.as_deref(), Some("server-assigned"));
    }

    #[tokio::test]
    async fn set_item_puts_to_detail_url_when_id_present() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/widgets/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "1",
                "name": "renamed"
            })))
            .mount(&server)
            .await;

        let bindings = Arc::new(WidgetBindings {
            base: Url::parse(&server.uri()).unwrap().join("/").unwrap(),
        });
        let source = ReqwestRemoteSource::new(Client::new(), bindings);
        let write_req = RequestDetails::for_write(RequestType::Global, true, None);
        let updated = source
            .set_item(
                Widget {
                    id: Some("1".to_string()),
                    name: "renamed".to_string(),
                },
                &write_req,
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "renamed");
    }

    #[tokio::test]
    async fn set_items_is_unsupported() {
        let bindings = Arc::new(WidgetBindings {
            base: Url::parse("https://example.test/").unwrap(),
        });
        let source = ReqwestRemoteSource::new(Client::new(), bindings);
        let req = RequestDetails::for_write(RequestType::Local, true, None);
        let err = source.set_items(vec![], &req).await.unwrap_err();
        assert!(matches!(err, SourceError::Unexpected(_)));
    }

    #[tokio::test]
    async fn delete_maps_404_to_missing() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/widgets/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let bindings = Arc::new(WidgetBindings {
            base: Url::parse(&server.uri()).unwrap().join("/").unwrap(),
        });
        let source = ReqwestRemoteSource::new(Client::new(), bindings);
        let status = source.delete("gone", &empty_request()).await.unwrap();
        assert_eq!(status, DeleteStatus::Missing);
    }

    #[tokio::test]
    async fn server_error_maps_to_server_error_kind() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/widgets"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let bindings = Arc::new(WidgetBindings {
            base: Url::parse(&server.uri()).unwrap().join("/").unwrap(),
        });
        let source = ReqwestRemoteSource::new(Client::new(), bindings);
        let err = source
            .get_items(&RequestDetails::for_read(RequestType::Refresh, None, None))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::ServerError(_, _)));
    }
}

//! A small mock entity and its [`Bindings`] implementation, shared across
//! tierdata's test suites the way `hitbox-test` shares one mock backend and
//! request/response pair across every crate's test suite.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tierdata_core::{Bindings, Filter, SourceError, SourceResult, WireObject};
use url::Url;

/// Mock entity used throughout tierdata's test suites.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Widget {
    pub id: Option<String>,
    pub name: String,
}

/// Builds a [`Widget`] with an id already assigned.
pub fn widget(id: &str, name: &str) -> Widget {
    Widget {
        id: Some(id.to_string()),
        name: name.to_string(),
    }
}

/// Builds a [`Widget`] with no id, as a caller constructing a new entity
/// would before a source assigns one.
pub fn new_widget(name: &str) -> Widget {
    Widget {
        id: None,
        name: name.to_string(),
    }
}

/// [`Bindings`] for [`Widget`], rooted at a base URL.
///
/// By default `assign_id` returns `None` (the server must assign ids, the
/// common REST case). [`WidgetBindings::with_client_side_ids`] builds a
/// variant that mints ids locally instead, exercising the
/// [`Bindings::assign_id`] path spec'd for client-generated ids.
pub struct WidgetBindings {
    base: Url,
    client_side_ids: Option<Arc<AtomicUsize>>,
}

impl WidgetBindings {
    /// Bindings that rely on the remote to assign ids (the default).
    pub fn new(base: &str) -> Self {
        WidgetBindings {
            base: Url::parse(base).expect("valid base url"),
            client_side_ids: None,
        }
    }

    /// Bindings that mint client-side ids via [`Bindings::assign_id`],
    /// letting a [`crate::ScriptedRemoteSource`]-free [`tierdata_local::LocalSource`]
    /// satisfy a creation entirely locally.
    pub fn with_client_side_ids(base: &str) -> Self {
        WidgetBindings {
            base: Url::parse(base).expect("valid base url"),
            client_side_ids: Some(Arc::new(AtomicUsize::new(0))),
        }
    }
}

impl Bindings<Widget> for WidgetBindings {
    fn id_of(&self, item: &Widget) -> Option<String> {
        item.id.clone()
    }

    fn from_wire(&self, wire: &WireObject) -> SourceResult<Widget> {
        serde_json::from_value(wire.clone())
            .map_err(|e| SourceError::server_error_with_source("failed to decode widget", e))
    }

    fn to_wire(&self, item: &Widget) -> WireObject {
        serde_json::to_value(item).expect("Widget always serializes")
    }

    fn detail_url(&self, id: &str) -> Url {
        self.base.join(&format!("widgets/{id}")).expect("valid detail url")
    }

    fn list_url(&self) -> Url {
        self.base.join("widgets").expect("valid list url")
    }

    fn assign_id(&self, item: Widget) -> Option<Widget> {
        let counter = self.client_side_ids.as_ref()?;
        let n = counter.fetch_add(1, Ordering::SeqCst);
        Some(Widget {
            id: Some(format!("local-{n}")),
            ..item
        })
    }
}

/// Test filter matching widgets whose name starts with a given prefix.
///
/// Its wire form (`name__startswith`) and its cache key are intentionally
/// both derived from the same prefix here, but nothing in the core requires
/// that — see spec.md §9's note that a filter's cache key and its wire form
/// may legitimately diverge.
#[derive(Clone, Debug)]
pub struct NameStartsWith(pub String);

impl Filter for NameStartsWith {
    fn cache_key(&self) -> String {
        format!("name_starts_with:{}", self.0)
    }

    fn to_params(&self) -> Result<BTreeMap<String, String>, SourceError> {
        let mut params = BTreeMap::new();
        params.insert("name__startswith".to_string(), self.0.clone());
        Ok(params)
    }
}

/// Test filter that cannot be expressed as remote query parameters, used to
/// exercise the "filter not remote-compatible" `Unexpected` failure path.
#[derive(Clone, Debug)]
pub struct LocalOnlyFilter(pub String);

impl Filter for LocalOnlyFilter {
    fn cache_key(&self) -> String {
        format!("local_only:{}", self.0)
    }

    fn to_params(&self) -> Result<BTreeMap<String, String>, SourceError> {
        Err(SourceError::Unexpected(
            "LocalOnlyFilter cannot be serialized for a remote transport".to_string(),
        ))
    }
}

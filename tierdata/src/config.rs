//! [`SourceListConfig`]: policy knobs for a [`crate::SourceList`].

use tierdata_core::DEFAULT_PAGE_SIZE;

/// Policy configuration for a [`crate::SourceList`].
///
/// The cascade's *shape* (ordering, fail-fast, backfill) is fixed by spec —
/// this only gates the one behavior spec.md §9 flags as an open question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceListConfig {
    /// Whether [`crate::SourceList::get_by_ids`] deletes locally-cached ids
    /// that a non-local probe failed to confirm (spec.md §4.6.2 step 3).
    ///
    /// Defaults to `true`, matching the behavior spec.md describes as the
    /// existing default. Set to `false` to keep unfulfilled ids in local
    /// storage — they remain reported as `missing` in the result either way;
    /// this only controls whether they're also evicted from the cache.
    pub evict_unfulfilled_ids: bool,
    /// Page size [`crate::SourceList::default_pagination`] assumes for a
    /// caller that wants a default-sized page without picking a
    /// `page_size` explicitly.
    ///
    /// Unrelated to [`tierdata_core::Pagination::default`], which always
    /// uses [`tierdata_core::DEFAULT_PAGE_SIZE`] regardless of this
    /// setting — that constructor has no `SourceList` to read a config
    /// from. Callers who want this setting to take effect must build their
    /// paginated `RequestDetails` from `SourceList::default_pagination`
    /// rather than from `Pagination::default()`.
    pub default_page_size: u32,
}

impl Default for SourceListConfig {
    fn default() -> Self {
        SourceListConfig {
            evict_unfulfilled_ids: true,
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl SourceListConfig {
    /// Starts building a `SourceListConfig` from the defaults.
    pub fn builder() -> SourceListConfigBuilder {
        SourceListConfigBuilder::new()
    }
}

/// Builder for [`SourceListConfig`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceListConfigBuilder {
    config: SourceListConfig,
}

impl SourceListConfigBuilder {
    /// Starts a new builder from [`SourceListConfig::default`].
    pub fn new() -> Self {
        SourceListConfigBuilder {
            config: SourceListConfig::default(),
        }
    }

    /// Sets [`SourceListConfig::evict_unfulfilled_ids`].
    pub fn evict_unfulfilled_ids(mut self, evict: bool) -> Self {
        self.config.evict_unfulfilled_ids = evict;
        self
    }

    /// Sets [`SourceListConfig::default_page_size`].
    pub fn default_page_size(mut self, size: u32) -> Self {
        self.config.default_page_size = size;
        self
    }

    /// Builds the [`SourceListConfig`].
    pub fn build(self) -> SourceListConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_evicts_unfulfilled_ids() {
        let config = SourceListConfig::default();
        assert!(config.evict_unfulfilled_ids);
        assert_eq!(config.default_page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = SourceListConfig::builder()
            .evict_unfulfilled_ids(false)
            .default_page_size(50)
            .build();
        assert!(!config.evict_unfulfilled_ids);
        assert_eq!(config.default_page_size, 50);
    }
}

#[cfg(test)]
mod source_list_tests {
    //! `SourceListConfig::default_page_size` only matters through
    //! [`crate::SourceList::default_pagination`] — exercised here rather
    //! than against the bare config, since the config alone has no
    //! behavior.
    use std::sync::Arc;

    use tierdata_core::{Bindings, RequestDetails, RequestType, SourceResult, WireObject};
    use url::Url;

    use crate::{SourceList, SourceListConfig};

    #[derive(Clone)]
    struct Widget;

    struct WidgetBindings;

    impl Bindings<Widget> for WidgetBindings {
        fn id_of(&self, _item: &Widget) -> Option<String> {
            None
        }
        fn from_wire(&self, _wire: &WireObject) -> SourceResult<Widget> {
            Ok(Widget)
        }
        fn to_wire(&self, _item: &Widget) -> WireObject {
            WireObject::Null
        }
        fn detail_url(&self, id: &str) -> Url {
            Url::parse(&format!("https://example.test/widgets/{id}")).unwrap()
        }
        fn list_url(&self) -> Url {
            Url::parse("https://example.test/widgets").unwrap()
        }
    }

    #[test]
    fn default_pagination_uses_configured_page_size() {
        let bindings = Arc::new(WidgetBindings);
        let config = SourceListConfig::builder().default_page_size(50).build();
        let list: SourceList<Widget, WidgetBindings> = SourceList::new(vec![], Arc::clone(&bindings), config);

        let pagination = list.default_pagination(2);
        assert_eq!(pagination.page, 2);
        assert_eq!(pagination.page_size, 50);
    }

    #[test]
    fn different_configured_page_sizes_yield_different_cache_keys() {
        let bindings = Arc::new(WidgetBindings);
        let small = SourceList::new(
            vec![],
            Arc::clone(&bindings),
            SourceListConfig::builder().default_page_size(10).build(),
        );
        let large = SourceList::new(
            vec![],
            Arc::clone(&bindings),
            SourceListConfig::builder().default_page_size(100).build(),
        );

        let small_req =
            RequestDetails::for_read(RequestType::Global, None, Some(small.default_pagination(0)));
        let large_req =
            RequestDetails::for_read(RequestType::Global, None, Some(large.default_pagination(0)));

        assert_ne!(small_req.cache_key(), large_req.cache_key());
        assert_eq!(small_req.no_pagination_cache_key(), large_req.no_pagination_cache_key());
    }
}

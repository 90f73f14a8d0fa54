//! Site-specific source handlers and the registry that dispatches to them.
//!
//! Each handler turns one upstream site into a normalized [`Feed`]. They
//! all follow the same two-phase pattern:
//!
//! 1. **Listing**: fetch a list page (or API) and extract entry links
//! 2. **Detail fan-out**: fetch each entry through the shared
//!    [`FetchCache`], so concurrent and repeated requests for the same
//!    detail URL hit the upstream site once
//!
//! # Supported sources
//!
//! | Id | Module | Listing | Detail strategy |
//! |----|--------|---------|-----------------|
//! | `tsdm` | [`tsdm`] | forum thread table (cookie-gated) | whole list cached under one qualified key |
//! | `sdu-ygb` | [`sdu`] | notice board sections | per-link fan-out; external hosts pass through |
//! | `docschina-weekly` | [`docschina`] | embedded `__NEXT_DATA__` JSON | per-issue fan-out |
//! | `smzdm-product` | [`smzdm`] | product wiki list | per-item fan-out; outdated items cached as negative |
//! | `cfr` | [`cfr`] | publication listing | per-link fan-out with path-prefix dispatch |
//! | `ncpssd` | [`ncpssd`] | journal list page | detail fields from a JSON POST endpoint |
//! | `tencent-cloud-column` | [`tencent_cloud`] | JSON list API | whole list cached under one qualified key |
//! | `twreporter` | [`twreporter`] | JSON post API | per-slug fan-out; content blocks rendered to HTML |
//!
//! Failed detail fetches are logged and skipped; a handler only fails as
//! a whole when its list page cannot be fetched or understood.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::FetchCache;
use crate::config::AppConfig;
use crate::error::ScrapeError;
use crate::fetch::HttpFetch;
use crate::models::{Feed, FeedValue};

pub mod cfr;
pub mod docschina;
pub mod ncpssd;
pub mod sdu;
pub mod smzdm;
pub mod tencent_cloud;
pub mod tsdm;
pub mod twreporter;

/// How many detail pages a handler fetches concurrently during fan-out.
pub(crate) const DETAIL_FAN_OUT: usize = 8;

/// Everything a handler needs, passed explicitly: the shared fetch
/// cache, the fetch capability, configuration, and an optional route
/// parameter (section name, category, or item id).
pub struct SourceContext {
    pub fetcher: Arc<dyn HttpFetch>,
    pub cache: Arc<FetchCache<FeedValue>>,
    pub config: Arc<AppConfig>,
    pub param: Option<String>,
}

impl SourceContext {
    /// The route parameter, or a handler-chosen default.
    pub fn param_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.param.as_deref().unwrap_or(default)
    }
}

/// A site-specific page-parsing capability: list page in, normalized
/// feed out.
#[async_trait]
pub trait SourceHandler: Send + Sync {
    /// Stable identifier used for dispatch and output paths.
    fn id(&self) -> &'static str;

    /// Human-readable source name.
    fn name(&self) -> &'static str;

    /// Fetch, parse, and assemble the feed for this source.
    async fn build_feed(&self, ctx: &SourceContext) -> Result<Feed, ScrapeError>;
}

impl std::fmt::Debug for dyn SourceHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceHandler").field("id", &self.id()).finish()
    }
}

/// Registry mapping source ids to handlers.
///
/// Replaces per-site branching with a lookup: adding a source means
/// registering one more handler, not growing a dispatch arm.
#[derive(Default)]
pub struct SourceRegistry {
    handlers: HashMap<&'static str, Arc<dyn SourceHandler>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in source handler.
    pub fn with_default_sources() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(tsdm::TsdmBd));
        registry.register(Arc::new(sdu::SduYgb));
        registry.register(Arc::new(docschina::DocschinaWeekly));
        registry.register(Arc::new(smzdm::SmzdmProduct));
        registry.register(Arc::new(cfr::CfrPublications));
        registry.register(Arc::new(ncpssd::NcpssdNewList));
        registry.register(Arc::new(tencent_cloud::TencentCloudColumn));
        registry.register(Arc::new(twreporter::Twreporter));
        registry
    }

    pub fn register(&mut self, handler: Arc<dyn SourceHandler>) {
        self.handlers.insert(handler.id(), handler);
    }

    /// Look up a handler, failing with the list of known ids.
    pub fn get(&self, id: &str) -> Result<Arc<dyn SourceHandler>, ScrapeError> {
        self.handlers
            .get(id)
            .cloned()
            .ok_or_else(|| ScrapeError::UnknownSource(id.to_string()))
    }

    /// All registered ids, sorted for stable output.
    pub fn ids(&self) -> Vec<&'static str> {
        let mut ids: Vec<_> = self.handlers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_contents() {
        let registry = SourceRegistry::with_default_sources();
        assert_eq!(
            registry.ids(),
            vec![
                "cfr",
                "docschina-weekly",
                "ncpssd",
                "sdu-ygb",
                "smzdm-product",
                "tencent-cloud-column",
                "tsdm",
                "twreporter",
            ]
        );
    }

    #[test]
    fn test_unknown_source_is_an_error() {
        let registry = SourceRegistry::with_default_sources();
        let err = registry.get("nope").unwrap_err();
        assert!(matches!(err, ScrapeError::UnknownSource(_)));
    }

    #[test]
    fn test_lookup_returns_matching_handler() {
        let registry = SourceRegistry::with_default_sources();
        assert_eq!(registry.get("tsdm").unwrap().id(), "tsdm");
    }
}

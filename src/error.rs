//! Error types for the fetch cache and the scraping pipeline.
//!
//! Two layers of errors exist here:
//!
//! - [`CacheError`]: what a cache producer can fail with. This type is
//!   `Clone` because a single failed computation is observed by every
//!   caller that coalesced onto it, and the value travels through a
//!   shared future. `NotFound` is not a failure in the usual sense: it is
//!   the negative result ("nothing to show for this key"), and whether it
//!   is cached is a per-call policy decision.
//! - [`ScrapeError`]: what a source handler or the surrounding pipeline
//!   can fail with. Not `Clone`; never stored in the cache.

use thiserror::Error;

/// Failure modes of a cached computation.
///
/// Only `NotFound` is ever stored in the cache (subject to the caller's
/// negative-result policy). Every other variant leaves the key absent so
/// the next request retries the producer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The producer ran to completion but has no value for this key.
    #[error("no value for this key")]
    NotFound,

    /// The caller supplied an empty cache key.
    #[error("cache keys must be non-empty")]
    InvalidKey,

    /// The computation task went away before producing a result.
    #[error("computation abandoned before completing")]
    Canceled,

    /// The upstream fetch inside the producer failed.
    #[error("upstream request failed: {0}")]
    Fetch(String),

    /// The upstream document could not be interpreted.
    #[error("malformed upstream document: {0}")]
    Malformed(String),
}

/// Failure modes of a source handler or the pipeline around it.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("upstream request failed: {0}")]
    Fetch(String),

    #[error("unexpected document structure: {0}")]
    Structure(String),

    #[error("invalid parameter: {0}")]
    Param(String),

    #[error("missing configuration value: {0}")]
    MissingConfig(&'static str),

    #[error("unknown source id: {0}")]
    UnknownSource(String),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<ScrapeError> for CacheError {
    /// Flatten a handler-side failure into something the cache can hand to
    /// coalesced waiters. Payloads are stringified to keep the result
    /// cloneable.
    fn from(err: ScrapeError) -> Self {
        match err {
            ScrapeError::Cache(e) => e,
            ScrapeError::Fetch(msg) => CacheError::Fetch(msg),
            ScrapeError::Json(e) => CacheError::Malformed(e.to_string()),
            other => CacheError::Malformed(other.to_string()),
        }
    }
}

/// Failure modes of configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_error_is_cloneable() {
        let err = CacheError::Fetch("503 from upstream".to_string());
        let cloned = err.clone();
        assert_eq!(err, cloned);
    }

    #[test]
    fn test_scrape_error_flattens_into_cache_error() {
        let err = ScrapeError::Fetch("timed out".to_string());
        assert_eq!(
            CacheError::from(err),
            CacheError::Fetch("timed out".to_string())
        );

        let err = ScrapeError::Structure("missing list container".to_string());
        assert!(matches!(CacheError::from(err), CacheError::Malformed(_)));

        let err = ScrapeError::Cache(CacheError::NotFound);
        assert_eq!(CacheError::from(err), CacheError::NotFound);
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            CacheError::InvalidKey.to_string(),
            "cache keys must be non-empty"
        );
        assert_eq!(
            ScrapeError::UnknownSource("nope".to_string()).to_string(),
            "unknown source id: nope"
        );
    }
}

//! Runtime configuration loaded from an optional YAML file.
//!
//! Every field has a default, so running without a config file works out
//! of the box. The file is the place for values that do not belong on
//! the command line: cache sizing, the HTTP user agent, and per-site
//! credentials such as the forum cookie.
//!
//! ```yaml
//! default_ttl_seconds: 300
//! max_cache_entries: 1024
//! request_timeout_seconds: 10
//! tsdm_cookie: "..."
//! ```

use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::error::ConfigError;

/// Process-wide configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Default cache TTL applied when a handler does not override it.
    pub default_ttl_seconds: u64,
    /// Bound on completed cache entries; oldest evicted past this.
    pub max_cache_entries: usize,
    /// Per-request timeout for upstream fetches.
    pub request_timeout_seconds: u64,
    /// User agent sent with every upstream request.
    pub user_agent: String,
    /// Login cookie for the tsdm forum handler (it is login-gated).
    pub tsdm_cookie: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: 300,
            max_cache_entries: 1024,
            request_timeout_seconds: 10,
            user_agent: concat!("feed_relay/", env!("CARGO_PKG_VERSION")).to_string(),
            tsdm_cookie: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from `path`, or fall back to defaults when no
    /// path was given.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            info!("no config file given; using defaults");
            return Ok(Self::default());
        };

        let raw = std::fs::read_to_string(Path::new(path)).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let config: AppConfig =
            serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_string(),
                source,
            })?;
        info!(path, "loaded configuration");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.default_ttl_seconds, 300);
        assert_eq!(config.max_cache_entries, 1024);
        assert!(config.user_agent.starts_with("feed_relay/"));
        assert!(config.tsdm_cookie.is_none());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: AppConfig =
            serde_yaml::from_str("default_ttl_seconds: 60\ntsdm_cookie: abc=1").unwrap();
        assert_eq!(config.default_ttl_seconds, 60);
        assert_eq!(config.tsdm_cookie.as_deref(), Some("abc=1"));
        // Untouched fields fall back to defaults.
        assert_eq!(config.max_cache_entries, 1024);
    }

    #[test]
    fn test_missing_path_uses_defaults() {
        let config = AppConfig::load(None).unwrap();
        assert_eq!(config.request_timeout_seconds, 10);
    }

    #[test]
    fn test_unreadable_file_is_an_error() {
        let err = AppConfig::load(Some("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}

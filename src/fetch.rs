//! The fetch capability consumed by source handlers.
//!
//! Handlers never talk to `reqwest` directly; they go through the
//! [`HttpFetch`] trait so tests can substitute canned documents and the
//! cache's producers stay free of client plumbing. The production
//! implementation is a thin wrapper over one shared [`reqwest::Client`].
//! Transport-level concerns beyond a user agent and a timeout (proxies,
//! retries) are deliberately not handled here.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::config::AppConfig;
use crate::error::ScrapeError;

/// Asynchronous "give me the raw body for this URL" capability.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    /// Fetch a URL and return the response body as text.
    async fn get(&self, url: &str) -> Result<String, ScrapeError>;

    /// Fetch a URL with a `Cookie` header (login-gated boards).
    async fn get_with_cookie(&self, url: &str, cookie: &str) -> Result<String, ScrapeError>;

    /// POST a JSON body and return the response body as text.
    async fn post_json(
        &self,
        url: &str,
        body: serde_json::Value,
    ) -> Result<String, ScrapeError>;
}

/// Production fetcher over a shared [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    /// Build the client with the configured user agent and timeout.
    pub fn new(config: &AppConfig) -> Result<Self, ScrapeError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(fetch_err)?;
        Ok(Self { client })
    }
}

fn fetch_err(e: reqwest::Error) -> ScrapeError {
    ScrapeError::Fetch(e.to_string())
}

#[async_trait]
impl HttpFetch for ReqwestFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn get(&self, url: &str) -> Result<String, ScrapeError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(fetch_err)?
            .error_for_status()
            .map_err(fetch_err)?;
        let body = response.text().await.map_err(fetch_err)?;
        debug!(bytes = body.len(), "fetched document");
        Ok(body)
    }

    #[instrument(level = "debug", skip(self, cookie))]
    async fn get_with_cookie(&self, url: &str, cookie: &str) -> Result<String, ScrapeError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::COOKIE, cookie)
            .send()
            .await
            .map_err(fetch_err)?
            .error_for_status()
            .map_err(fetch_err)?;
        response.text().await.map_err(fetch_err)
    }

    #[instrument(level = "debug", skip(self, body))]
    async fn post_json(
        &self,
        url: &str,
        body: serde_json::Value,
    ) -> Result<String, ScrapeError> {
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(fetch_err)?
            .error_for_status()
            .map_err(fetch_err)?;
        response.text().await.map_err(fetch_err)
    }
}

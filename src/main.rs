//! # feed_relay
//!
//! A scraping pipeline that turns third-party sites into normalized
//! feed items. Site-specific source handlers fetch a list page, fan out
//! to detail pages, and extract structured fields (title, link, publish
//! date, description, author); every detail fetch goes through a shared
//! deduplicating cache so concurrent and repeated requests for the same
//! URL hit the upstream site at most once per TTL window.
//!
//! ## Usage
//!
//! ```sh
//! feed_relay -o ./feeds
//! feed_relay -o ./feeds --sources smzdm-product --param zm5vzpe
//! ```
//!
//! ## Architecture
//!
//! 1. **Setup**: build one [`FetchCache`], one HTTP fetcher, and the
//!    source registry; handlers receive all three through an explicit
//!    context, never through globals
//! 2. **Scraping**: run the selected handlers concurrently (4 at a time)
//! 3. **Output**: write each assembled feed as normalized JSON

use clap::Parser;
use futures::stream::{self, StreamExt};
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cache;
mod cli;
mod config;
mod error;
mod extract;
mod fetch;
mod models;
mod outputs;
mod sources;
mod utils;

use cache::FetchCache;
use cli::Cli;
use config::AppConfig;
use fetch::ReqwestFetcher;
use models::Feed;
use sources::{SourceContext, SourceHandler, SourceRegistry};

/// How many sources run concurrently. Detail-page fan-out inside each
/// handler has its own bound.
const PARALLEL_SOURCES: usize = 4;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("feed_relay starting up");

    let args = Cli::parse();
    debug!(?args.out_dir, ?args.sources, ?args.param, "parsed CLI arguments");

    // --- Configuration ---
    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(ttl) = args.ttl {
        config.default_ttl_seconds = ttl;
    }
    let config = Arc::new(config);

    // --- Shared cache, fetcher, registry ---
    let cache = Arc::new(FetchCache::new(
        Duration::from_secs(config.default_ttl_seconds),
        config.max_cache_entries,
    ));
    let fetcher: Arc<dyn fetch::HttpFetch> = Arc::new(ReqwestFetcher::new(&config)?);
    let registry = SourceRegistry::with_default_sources();

    let selected: Vec<String> = match args.selected_sources() {
        Some(ids) => ids,
        None => registry.ids().iter().map(|id| id.to_string()).collect(),
    };
    info!(sources = ?selected, ttl_seconds = config.default_ttl_seconds, "running sources");

    // --- Run handlers with bounded concurrency ---
    let results: Vec<(String, Result<Feed, error::ScrapeError>)> = stream::iter(selected)
        .map(|id| {
            let registry = &registry;
            let ctx = SourceContext {
                fetcher: Arc::clone(&fetcher),
                cache: Arc::clone(&cache),
                config: Arc::clone(&config),
                param: args.param.clone(),
            };
            async move {
                let result = match registry.get(&id) {
                    Ok(handler) => handler.build_feed(&ctx).await,
                    Err(e) => Err(e),
                };
                (id, result)
            }
        })
        .buffer_unordered(PARALLEL_SOURCES)
        .collect()
        .await;

    // --- Write outputs ---
    let mut written = 0usize;
    let mut failed = 0usize;
    for (id, result) in results {
        match result {
            Ok(feed) => {
                info!(source = %id, items = feed.items.len(), "assembled feed");
                match outputs::json::write_feed(&feed, &id, &args.out_dir).await {
                    Ok(_) => written += 1,
                    Err(e) => {
                        failed += 1;
                        error!(source = %id, error = %e, "failed to write feed output");
                    }
                }
            }
            Err(e) => {
                failed += 1;
                error!(source = %id, error = %e, "source failed");
            }
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        written,
        failed,
        cached_entries = cache.len(),
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "execution complete"
    );

    if written == 0 && failed > 0 {
        return Err("every selected source failed".into());
    }
    Ok(())
}

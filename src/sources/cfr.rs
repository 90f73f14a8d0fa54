//! CFR publications.
//!
//! Detail pages come in several layouts keyed by the first path segment
//! (`/article/...`, `/blog/...`, and a long tail of others). Dispatch is
//! on that prefix, and every variant tries the page's JSON-LD metadata
//! first, falling back to layout-specific selectors when the block is
//! missing or unparseable. The malformed case is logged; it usually
//! means the site changed under us.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use url::Url;

use crate::cache::ComputeOptions;
use crate::error::{CacheError, ScrapeError};
use crate::extract::{Extracted, linked_article};
use crate::fetch::HttpFetch;
use crate::models::{Feed, FeedItem, FeedValue};
use crate::sources::{DETAIL_FAN_OUT, SourceContext, SourceHandler};
use crate::utils::{absolutize, parse_date};

const ORIGIN: &str = "https://www.cfr.org";

static LIST_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".card-article__title a[href]").unwrap());
static ARTICLE_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".article-header__title").unwrap());
static BLOG_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".article-header-blog__title").unwrap());
static HEAD_TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("head title").unwrap());
static BODY_CONTENT: Lazy<Selector> = Lazy::new(|| Selector::parse(".body-content").unwrap());

pub struct CfrPublications;

#[async_trait]
impl SourceHandler for CfrPublications {
    fn id(&self) -> &'static str {
        "cfr"
    }

    fn name(&self) -> &'static str {
        "Council on Foreign Relations"
    }

    #[instrument(level = "info", skip_all)]
    async fn build_feed(&self, ctx: &SourceContext) -> Result<Feed, ScrapeError> {
        let section = ctx.param_or("publications");
        let list_url = format!("{ORIGIN}/{section}");

        let html = ctx.fetcher.get(&list_url).await?;
        let links = parse_publication_links(&html);
        info!(count = links.len(), section, "indexed publications");

        let items: Vec<FeedItem> = stream::iter(links)
            .map(|link| fetch_publication(ctx, link))
            .buffer_unordered(DETAIL_FAN_OUT)
            .filter_map(|result| std::future::ready(result))
            .collect()
            .await;

        Ok(Feed::new(self.name(), list_url, items).dedupe_by_link())
    }
}

/// Fetch one publication through the cache, keyed by its absolute URL.
async fn fetch_publication(ctx: &SourceContext, link: String) -> Option<FeedItem> {
    let fetcher = Arc::clone(&ctx.fetcher);
    let key = link.clone();

    let result = ctx
        .cache
        .get_or_compute(
            &key,
            move || async move {
                let html = fetcher.get(&link).await.map_err(CacheError::from)?;
                Ok(FeedValue::Item(parse_publication(&html, &link)))
            },
            ComputeOptions::default(),
        )
        .await;

    match result {
        Ok(value) => value.as_item().cloned(),
        Err(e) => {
            warn!(link = %key, error = %e, "publication fetch failed; skipping");
            None
        }
    }
}

/// Collect absolute detail links from a listing page.
fn parse_publication_links(html: &str) -> Vec<String> {
    let base = match Url::parse(ORIGIN) {
        Ok(base) => base,
        Err(_) => return Vec::new(),
    };
    let document = Html::parse_document(html);
    document
        .select(&LIST_LINK)
        .filter_map(|anchor| absolutize(&base, anchor.value().attr("href")?))
        .collect()
}

/// Which layout a detail page uses, keyed by the first path segment.
fn path_prefix(link: &str) -> Option<String> {
    let url = Url::parse(link).ok()?;
    url.path_segments()?.next().map(str::to_string)
}

/// Parse one publication page, dispatching on its path prefix.
fn parse_publication(html: &str, link: &str) -> FeedItem {
    let document = Html::parse_document(html);

    let metadata = linked_article(&document);
    if let Extracted::Malformed(reason) = &metadata {
        warn!(link, reason, "unparseable JSON-LD block; using selector fallback");
    }
    let metadata = metadata.ok();

    let fallback_title = match path_prefix(link).as_deref() {
        Some("article") => select_text(&document, &ARTICLE_TITLE),
        Some("blog") => select_text(&document, &BLOG_TITLE),
        _ => select_text(&document, &ARTICLE_TITLE)
            .or_else(|| select_text(&document, &HEAD_TITLE)),
    };

    let title = metadata
        .as_ref()
        .and_then(|data| data.title.clone())
        .or(fallback_title)
        .unwrap_or_else(|| link.to_string());

    let mut item = FeedItem::new(title, link);
    item.pub_date = metadata
        .as_ref()
        .and_then(|data| data.date_modified.as_deref())
        .and_then(parse_date);
    item.description = document
        .select(&BODY_CONTENT)
        .next()
        .map(|el| el.inner_html());
    item
}

fn select_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty())
}

//! SMZDM product wiki deal feed.
//!
//! The product page lists deals with a blurb; each deal page is fetched
//! through the cache for the publish date and, when the blurb is the
//! "read more" placeholder, the real description. Deals the site marks
//! as outdated produce a cached negative result: within the TTL we will
//! not refetch a page we already know is stale.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::cache::ComputeOptions;
use crate::error::{CacheError, ScrapeError};
use crate::extract::{Extracted, meta_content};
use crate::fetch::HttpFetch;
use crate::models::{Feed, FeedItem, FeedValue};
use crate::sources::{DETAIL_FAN_OUT, SourceContext, SourceHandler};
use crate::utils::{parse_date, squeeze_whitespace};

/// The listing blurb shown when the description is only on the detail page.
const READ_MORE_PLACEHOLDER: &str = "阅读全文";

static PAGE_TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());
static DEAL_ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("ul#feed-main-list li").unwrap());
static DEAL_IMAGE: Lazy<Selector> = Lazy::new(|| Selector::parse("img").unwrap());
static DEAL_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h5.feed-block-title a").unwrap());
static DEAL_PRICE: Lazy<Selector> = Lazy::new(|| Selector::parse(".z-highlight").unwrap());
static DEAL_BLURB: Lazy<Selector> = Lazy::new(|| Selector::parse(".feed-block-descripe").unwrap());
static OUTDATED_MARK: Lazy<Selector> = Lazy::new(|| Selector::parse("span.old").unwrap());
static DETAIL_DESCRIPTION: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"p[itemprop="description"]"#).unwrap());

pub struct SmzdmProduct;

#[async_trait]
impl SourceHandler for SmzdmProduct {
    fn id(&self) -> &'static str {
        "smzdm-product"
    }

    fn name(&self) -> &'static str {
        "SMZDM product deals"
    }

    #[instrument(level = "info", skip_all)]
    async fn build_feed(&self, ctx: &SourceContext) -> Result<Feed, ScrapeError> {
        let product_id = ctx
            .param
            .as_deref()
            .ok_or_else(|| ScrapeError::Param("smzdm-product requires a product id".to_string()))?;
        let list_url = format!("https://wiki.smzdm.com/p/{product_id}");

        let html = ctx.fetcher.get(&list_url).await?;
        let (page_title, listed) = parse_deal_list(&html);
        info!(count = listed.len(), product_id, "indexed deals");

        let items: Vec<FeedItem> = stream::iter(listed)
            .map(|item| fetch_deal(ctx, item))
            .buffer_unordered(DETAIL_FAN_OUT)
            .filter_map(|result| std::future::ready(result))
            .collect()
            .await;

        let title = if page_title.is_empty() {
            self.name().to_string()
        } else {
            page_title
        };
        let mut feed = Feed::new(title, list_url, items).dedupe_by_link();
        feed.language = Some("zh-Hans".to_string());
        Ok(feed)
    }
}

/// Fetch one deal page through the cache.
///
/// An outdated deal is a negative result, cached under the default
/// policy so it is not refetched this run (or any run within the TTL).
async fn fetch_deal(ctx: &SourceContext, item: FeedItem) -> Option<FeedItem> {
    let link = item.link.clone();
    let fetcher = Arc::clone(&ctx.fetcher);

    let result = ctx
        .cache
        .get_or_compute(
            &link,
            move || {
                let link = item.link.clone();
                async move {
                    let html = fetcher.get(&link).await.map_err(CacheError::from)?;
                    match parse_deal_detail(&html, item) {
                        Some(item) => Ok(FeedValue::Item(item)),
                        None => Err(CacheError::NotFound),
                    }
                }
            },
            ComputeOptions::default(),
        )
        .await;

    match result {
        Ok(value) => value.as_item().cloned(),
        Err(CacheError::NotFound) => {
            debug!(link = %link, "deal is outdated; skipping");
            None
        }
        Err(e) => {
            warn!(link = %link, error = %e, "deal fetch failed; skipping");
            None
        }
    }
}

/// Extract the deal listing: image alt + price as title, link, blurb.
fn parse_deal_list(html: &str) -> (String, Vec<FeedItem>) {
    let document = Html::parse_document(html);

    let page_title = document
        .select(&PAGE_TITLE)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default();

    let items = document
        .select(&DEAL_ROW)
        .filter_map(|row| {
            let alt = row
                .select(&DEAL_IMAGE)
                .next()
                .and_then(|img| img.value().attr("alt"))
                .unwrap_or_default();
            let anchor = row.select(&DEAL_LINK).next()?;
            let link = anchor.value().attr("href")?.to_string();
            let price = row
                .select(&DEAL_PRICE)
                .next()
                .map(|el| el.text().collect::<String>())
                .unwrap_or_default();
            let blurb = row
                .select(&DEAL_BLURB)
                .next()
                .map(|el| squeeze_whitespace(&el.text().collect::<String>()));

            let mut item = FeedItem::new(format!("{} {}", alt.trim(), price.trim()), link);
            item.description = blurb;
            Some(item)
        })
        .collect();

    (page_title, items)
}

/// Finish a deal item from its detail page, or `None` when the site
/// marks it as outdated.
fn parse_deal_detail(html: &str, mut item: FeedItem) -> Option<FeedItem> {
    let document = Html::parse_document(html);

    if document.select(&OUTDATED_MARK).next().is_some() {
        return None;
    }

    match meta_content(&document, "weibo:webpage:create_at") {
        Extracted::Present(raw) => item.pub_date = parse_date(&raw),
        Extracted::Absent => {}
        Extracted::Malformed(reason) => {
            debug!(link = %item.link, reason, "unusable create_at meta tag");
        }
    }

    if item.description.as_deref() == Some(READ_MORE_PLACEHOLDER) {
        item.description = document
            .select(&DETAIL_DESCRIPTION)
            .next()
            .map(|el| el.inner_html());
    }

    Some(item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FetchCache;
    use crate::config::AppConfig;
    use crate::fetch::testing::StaticFetcher;
    use std::time::Duration;

    const LIST_PAGE: &str = r#"<html><head><title>Widget — SMZDM</title></head><body>
        <ul id="feed-main-list">
            <li>
                <img alt="Widget Mk II">
                <h5 class="feed-block-title"><a href="https://www.smzdm.com/p/1001/">deal</a></h5>
                <span class="z-highlight">99元</span>
                <div class="feed-block-descripe"> 阅读全文 </div>
            </li>
            <li>
                <img alt="Widget Mk III">
                <h5 class="feed-block-title"><a href="https://www.smzdm.com/p/1002/">deal</a></h5>
                <span class="z-highlight">199元</span>
                <div class="feed-block-descripe">打折 促销</div>
            </li>
        </ul></body></html>"#;

    const FRESH_DEAL: &str = r#"<html><head>
        <meta name="weibo:webpage:create_at" content="2024-03-01 08:30:00">
        </head><body><p itemprop="description">Full <b>details</b></p></body></html>"#;

    const OUTDATED_DEAL: &str =
        r#"<html><body><span class="old">已过期</span></body></html>"#;

    fn context(fetcher: StaticFetcher) -> SourceContext {
        SourceContext {
            fetcher: Arc::new(fetcher),
            cache: Arc::new(FetchCache::new(Duration::from_secs(60), 64)),
            config: Arc::new(AppConfig::default()),
            param: Some("zm5vzpe".to_string()),
        }
    }

    #[test]
    fn test_parse_deal_list() {
        let (title, items) = parse_deal_list(LIST_PAGE);
        assert_eq!(title, "Widget — SMZDM");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Widget Mk II 99元");
        assert_eq!(items[0].description.as_deref(), Some(READ_MORE_PLACEHOLDER));
        assert_eq!(items[1].description.as_deref(), Some("打折促销"));
    }

    #[test]
    fn test_parse_deal_detail_replaces_placeholder() {
        let mut item = FeedItem::new("Widget Mk II 99元", "https://www.smzdm.com/p/1001/");
        item.description = Some(READ_MORE_PLACEHOLDER.to_string());

        let detailed = parse_deal_detail(FRESH_DEAL, item).unwrap();
        assert_eq!(detailed.description.as_deref(), Some("Full <b>details</b>"));
        assert!(detailed.pub_date.is_some());
    }

    #[test]
    fn test_parse_deal_detail_keeps_real_blurb() {
        let mut item = FeedItem::new("Widget Mk III 199元", "https://www.smzdm.com/p/1002/");
        item.description = Some("打折促销".to_string());

        let detailed = parse_deal_detail(FRESH_DEAL, item).unwrap();
        assert_eq!(detailed.description.as_deref(), Some("打折促销"));
    }

    #[test]
    fn test_parse_deal_detail_outdated_is_none() {
        let item = FeedItem::new("Widget", "https://www.smzdm.com/p/1001/");
        assert!(parse_deal_detail(OUTDATED_DEAL, item).is_none());
    }

    #[tokio::test]
    async fn test_build_feed_skips_outdated_and_caches_the_negative() {
        let fetcher = StaticFetcher::new()
            .with_page("https://wiki.smzdm.com/p/zm5vzpe", LIST_PAGE)
            .with_page("https://www.smzdm.com/p/1001/", FRESH_DEAL)
            .with_page("https://www.smzdm.com/p/1002/", OUTDATED_DEAL);
        let ctx = context(fetcher);

        let feed = SmzdmProduct.build_feed(&ctx).await.unwrap();
        assert_eq!(feed.items.len(), 1);
        assert_eq!(feed.items[0].title, "Widget Mk II 99元");

        // Both the fresh item and the outdated negative are cached.
        assert_eq!(ctx.cache.len(), 2);
    }

    #[tokio::test]
    async fn test_build_feed_requires_product_id() {
        let ctx = SourceContext {
            param: None,
            ..context(StaticFetcher::new())
        };
        let err = SmzdmProduct.build_feed(&ctx).await.unwrap_err();
        assert!(matches!(err, ScrapeError::Param(_)));
    }
}

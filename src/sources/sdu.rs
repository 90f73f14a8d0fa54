//! SDU graduate-affairs notice board.
//!
//! A classic list-then-detail source: the section page lists notices
//! with dates, and each notice link is fetched through the cache to pick
//! up the full title and body. Links that leave the notice-board host
//! (reposts to other university sites) pass through with their listing
//! fields only.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use url::Url;

use crate::cache::ComputeOptions;
use crate::error::{CacheError, ScrapeError};
use crate::fetch::HttpFetch;
use crate::models::{Feed, FeedItem, FeedValue};
use crate::sources::{DETAIL_FAN_OUT, SourceContext, SourceHandler};
use crate::utils::{absolutize, parse_date};

const HOST: &str = "https://www.ygb.sdu.edu.cn/";

/// Section id → (section title, section page).
const SECTIONS: &[(&str, &str, &str)] = &[
    ("zytz", "Important notices", "zytz.htm"),
    ("glfw", "Administrative services", "glfw.htm"),
    ("cxsj", "Innovation and practice", "cxsj.htm"),
];

static LIST_ENTRY: Lazy<Selector> = Lazy::new(|| Selector::parse(".zytz-list li").unwrap());
static ENTRY_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a").unwrap());
static ENTRY_DATE: Lazy<Selector> = Lazy::new(|| Selector::parse("b").unwrap());
static DETAIL_TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse(".article-tlt").unwrap());
static DETAIL_BODY: Lazy<Selector> =
    Lazy::new(|| Selector::parse("form[name=_newscontent_fromname]").unwrap());

pub struct SduYgb;

#[async_trait]
impl SourceHandler for SduYgb {
    fn id(&self) -> &'static str {
        "sdu-ygb"
    }

    fn name(&self) -> &'static str {
        "SDU graduate affairs office"
    }

    #[instrument(level = "info", skip_all)]
    async fn build_feed(&self, ctx: &SourceContext) -> Result<Feed, ScrapeError> {
        let section_id = ctx.param_or("zytz");
        let (_, section_title, section_page) = SECTIONS
            .iter()
            .find(|(id, _, _)| *id == section_id)
            .ok_or_else(|| ScrapeError::Param(format!("unknown ygb section: {section_id}")))?;

        let list_url = absolutize(&Url::parse(HOST)?, section_page)
            .ok_or_else(|| ScrapeError::Structure("cannot resolve section page".to_string()))?;
        let html = ctx.fetcher.get(&list_url).await?;
        let listed = parse_notice_list(&html);
        info!(count = listed.len(), section = section_id, "indexed notices");

        let items: Vec<FeedItem> = stream::iter(listed)
            .map(|item| fetch_detail(ctx, item))
            .buffer_unordered(DETAIL_FAN_OUT)
            .filter_map(|result| std::future::ready(result))
            .collect()
            .await;

        let mut feed = Feed::new(
            format!("{} — {}", self.name(), section_title),
            list_url,
            items,
        )
        .dedupe_by_link();
        feed.language = Some("zh-Hans".to_string());
        Ok(feed)
    }
}

/// Fetch one notice through the cache, keyed by its URL.
///
/// Failures are logged and the item is dropped; one broken notice must
/// not sink the section.
async fn fetch_detail(ctx: &SourceContext, item: FeedItem) -> Option<FeedItem> {
    let link = item.link.clone();
    let fetcher = Arc::clone(&ctx.fetcher);

    let result = ctx
        .cache
        .get_or_compute(
            &link,
            move || {
                let link = item.link.clone();
                async move {
                    let external = Url::parse(&link)
                        .map(|url| url.host_str() != Some("www.ygb.sdu.edu.cn"))
                        .unwrap_or(true);
                    if external {
                        // Repost to another host: keep the listing fields.
                        return Ok(FeedValue::Item(item));
                    }

                    let html = fetcher.get(&link).await.map_err(CacheError::from)?;
                    Ok(FeedValue::Item(parse_notice_detail(&html, item)))
                }
            },
            ComputeOptions::default(),
        )
        .await;

    match result {
        Ok(value) => value.as_item().cloned(),
        Err(e) => {
            warn!(link = %link, error = %e, "notice detail fetch failed; skipping");
            None
        }
    }
}

/// Extract the section listing: title, link, bracketed date.
fn parse_notice_list(html: &str) -> Vec<FeedItem> {
    let base = match Url::parse(HOST) {
        Ok(base) => base,
        Err(_) => return Vec::new(),
    };
    let document = Html::parse_document(html);

    document
        .select(&LIST_ENTRY)
        .filter_map(|entry| {
            let anchor = entry.select(&ENTRY_LINK).next()?;
            let title = anchor.text().collect::<String>().trim().to_string();
            let link = absolutize(&base, anchor.value().attr("href")?)?;

            let mut item = FeedItem::new(title, link);
            item.pub_date = entry
                .select(&ENTRY_DATE)
                .next()
                .map(|el| el.text().collect::<String>())
                .as_deref()
                .and_then(parse_date);
            Some(item)
        })
        .collect()
}

/// Fill in the full title and body from a notice page.
fn parse_notice_detail(html: &str, mut item: FeedItem) -> FeedItem {
    let document = Html::parse_document(html);

    if let Some(title_el) = document.select(&DETAIL_TITLE).next() {
        let title = title_el.text().collect::<String>().trim().to_string();
        if !title.is_empty() {
            item.title = title;
        }
    }
    if let Some(body) = document.select(&DETAIL_BODY).next() {
        item.description = Some(body.inner_html());
    }
    item
}

//! TSDM forum BD release listing.
//!
//! The forum is login-gated, so every request carries the configured
//! cookie. Unlike the fan-out handlers, the whole thread list is cached
//! as one unit under a qualified key (`tsdm:bd:<type>`): the listing
//! itself is the expensive fetch, and there are no detail pages worth
//! visiting.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::sync::Arc;
use tracing::{info, instrument};
use url::Url;

use crate::cache::ComputeOptions;
use crate::error::{CacheError, ScrapeError};
use crate::fetch::HttpFetch;
use crate::models::{Feed, FeedItem, FeedValue};
use crate::sources::{SourceContext, SourceHandler};
use crate::utils::{absolutize, parse_date};

const FORUM_BASE: &str = "https://www.tsdm39.com/forum.php?mod=forumdisplay&fid=85";

/// Thread type id to display name, as the forum's filter exposes them.
const TYPE_LABELS: &[(&str, &str)] = &[
    ("403", "720P"),
    ("404", "1080P"),
    ("405", "BDMV"),
    ("4130", "4K"),
    ("5815", "AV1"),
];

static THREAD_ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tbody.tsdm_normalthread").unwrap());
static THREAD_TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("a.xst").unwrap());
static THREAD_PRICE: Lazy<Selector> = Lazy::new(|| Selector::parse("span.xw1").unwrap());
static THREAD_DATE: Lazy<Selector> = Lazy::new(|| Selector::parse("td.by em").unwrap());

pub struct TsdmBd;

#[async_trait]
impl SourceHandler for TsdmBd {
    fn id(&self) -> &'static str {
        "tsdm"
    }

    fn name(&self) -> &'static str {
        "TSDM forum BD releases"
    }

    #[instrument(level = "info", skip_all)]
    async fn build_feed(&self, ctx: &SourceContext) -> Result<Feed, ScrapeError> {
        let cookie = ctx
            .config
            .tsdm_cookie
            .clone()
            .ok_or(ScrapeError::MissingConfig("tsdm_cookie"))?;

        let type_id = ctx.param.clone();
        let list_url = match &type_id {
            Some(id) => format!("{FORUM_BASE}&filter=typeid&typeid={id}"),
            None => FORUM_BASE.to_string(),
        };
        let key = format!("tsdm:bd:{}", type_id.as_deref().unwrap_or("all"));

        let fetcher = Arc::clone(&ctx.fetcher);
        let value = ctx
            .cache
            .get_or_compute(
                &key,
                move || async move {
                    let html = fetcher
                        .get_with_cookie(&list_url, &cookie)
                        .await
                        .map_err(CacheError::from)?;
                    Ok(FeedValue::Items(parse_thread_list(&html)))
                },
                ComputeOptions::default(),
            )
            .await?;

        let items = value.as_ref().clone().into_items();
        info!(count = items.len(), type_id = ?type_id, "assembled tsdm feed");

        let mut feed = Feed::new(self.name(), FORUM_BASE, items).dedupe_by_link();
        feed.language = Some("zh-Hans".to_string());
        feed.description = Some(type_label_table());
        Ok(feed)
    }
}

/// Extract thread rows from the forum listing markup.
fn parse_thread_list(html: &str) -> Vec<FeedItem> {
    let base = Url::parse(FORUM_BASE).expect("static base url");
    let document = Html::parse_document(html);

    document
        .select(&THREAD_ROW)
        .filter_map(|row| {
            let title_el = row.select(&THREAD_TITLE).next()?;
            let title = title_el.text().collect::<String>();
            let link = absolutize(&base, title_el.value().attr("href")?)?;
            let price = row
                .select(&THREAD_PRICE)
                .last()
                .map(|el| el.text().collect::<String>());
            let date = row
                .select(&THREAD_DATE)
                .next()
                .map(|el| el.text().collect::<String>());

            let mut item = FeedItem::new(title, link);
            item.description = price.map(|p| format!("Price: {}", p.trim()));
            item.pub_date = date.as_deref().and_then(parse_date);
            Some(item)
        })
        .collect()
}

/// Render the type-id mapping as a small Markdown table for the feed
/// description.
fn type_label_table() -> String {
    let heading: Vec<&str> = TYPE_LABELS.iter().map(|(_, label)| *label).collect();
    let separator: Vec<&str> = TYPE_LABELS.iter().map(|_| ":--:").collect();
    let body: Vec<&str> = TYPE_LABELS.iter().map(|(id, _)| *id).collect();

    [heading, separator, body]
        .iter()
        .map(|row| format!("| {} |", row.join(" | ")))
        .collect::<Vec<_>>()
        .join("\n")
}

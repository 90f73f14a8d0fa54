//! NCPSSD new journal article listing.
//!
//! The list page is plain HTML, but article links hide inside `onclick`
//! attributes, and the detail fields come from a JSON POST endpoint
//! rather than a page fetch. The POST result is cached per article URL
//! like any other detail fetch.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use url::Url;

use crate::cache::ComputeOptions;
use crate::error::{CacheError, ScrapeError};
use crate::fetch::HttpFetch;
use crate::models::{Feed, FeedItem, FeedValue};
use crate::sources::{DETAIL_FAN_OUT, SourceContext, SourceHandler};
use crate::utils::parse_date;

const BASE_URL: &str = "https://www.ncpssd.cn";
const ARTICLE_API: &str = "https://www.ncpssd.cn/articleinfoHandler/getjournalarticletable";

static LIST_ENTRY: Lazy<Selector> = Lazy::new(|| Selector::parse(".news-list > li").unwrap());
static ENTRY_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a").unwrap());
static ONCLICK_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\('(.*?)'\)").unwrap());

pub struct NcpssdNewList;

/// One listed article plus the query parameters the detail API wants.
#[derive(Debug, Clone, PartialEq)]
struct ListedArticle {
    title: String,
    link: String,
    lngid: String,
    type_name: String,
    page_type: String,
}

/// Response shape of the article-detail POST endpoint.
#[derive(Debug, Deserialize)]
struct ArticleResponse {
    data: Option<ArticleData>,
}

#[derive(Debug, Deserialize)]
struct ArticleData {
    #[serde(default)]
    showwriter: Option<String>,
    #[serde(default)]
    remarkc: Option<String>,
    #[serde(default, rename = "publishDateTimee")]
    publish_date: Option<String>,
}

#[async_trait]
impl SourceHandler for NcpssdNewList {
    fn id(&self) -> &'static str {
        "ncpssd"
    }

    fn name(&self) -> &'static str {
        "NCPSSD new journal articles"
    }

    #[instrument(level = "info", skip_all)]
    async fn build_feed(&self, ctx: &SourceContext) -> Result<Feed, ScrapeError> {
        let list_url = format!("{BASE_URL}/newlist?type=0");

        let html = ctx.fetcher.get(&list_url).await?;
        let listed = parse_article_list(&html);
        info!(count = listed.len(), "indexed journal articles");

        let items: Vec<FeedItem> = stream::iter(listed)
            .map(|article| fetch_article(ctx, article))
            .buffer_unordered(DETAIL_FAN_OUT)
            .filter_map(|result| std::future::ready(result))
            .collect()
            .await;

        let mut feed = Feed::new(self.name(), BASE_URL, items).dedupe_by_link();
        feed.language = Some("zh-Hans".to_string());
        Ok(feed)
    }
}

/// Fetch one article's detail fields from the JSON endpoint, cached
/// under the article URL.
async fn fetch_article(ctx: &SourceContext, article: ListedArticle) -> Option<FeedItem> {
    let link = article.link.clone();
    let fetcher = Arc::clone(&ctx.fetcher);

    let result = ctx
        .cache
        .get_or_compute(
            &link,
            move || async move {
                let body = serde_json::json!({
                    "lngid": article.lngid,
                    "type": article.type_name,
                    "pageType": article.page_type,
                });
                let raw = fetcher
                    .post_json(ARTICLE_API, body)
                    .await
                    .map_err(CacheError::from)?;
                let response: ArticleResponse =
                    serde_json::from_str(&raw).map_err(|e| CacheError::Malformed(e.to_string()))?;
                let data = response.data.ok_or(CacheError::NotFound)?;

                let mut item = FeedItem::new(article.title, article.link);
                item.author = data.showwriter;
                item.description = data.remarkc;
                item.pub_date = data.publish_date.as_deref().and_then(parse_date);
                Ok(FeedValue::Item(item))
            },
            ComputeOptions::default(),
        )
        .await;

    match result {
        Ok(value) => value.as_item().cloned(),
        Err(CacheError::NotFound) => None,
        Err(e) => {
            warn!(link = %link, error = %e, "article detail fetch failed; skipping");
            None
        }
    }
}

/// Mine article links out of `onclick` handlers on the list page.
fn parse_article_list(html: &str) -> Vec<ListedArticle> {
    let document = Html::parse_document(html);

    document
        .select(&LIST_ENTRY)
        .filter_map(|entry| {
            let anchor = entry.select(&ENTRY_LINK).next()?;
            // Titles arrive wrapped across several indented lines.
            let title = anchor
                .text()
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");

            let onclick = anchor.value().attr("onclick")?;
            let path = ONCLICK_URL.captures(onclick)?.get(1)?.as_str();
            let link = format!("{BASE_URL}{path}");

            let url = Url::parse(&link).ok()?;
            let query =
                |name: &str| -> Option<String> {
                    url.query_pairs()
                        .find(|(key, _)| key == name)
                        .map(|(_, value)| value.into_owned())
                };

            Some(ListedArticle {
                title,
                link: link.clone(),
                lngid: query("id")?,
                type_name: query("typename")?,
                page_type: query("nav")?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FetchCache;
    use crate::config::AppConfig;
    use crate::fetch::testing::StaticFetcher;
    use std::time::Duration;

    const LIST_PAGE: &str = r##"<html><body><ul class="news-list">
        <li><a onclick="openArticle('/articleDetail?id=A1&typename=journal&nav=1')">
            Study of
            Caching
        </a></li>
        <li><a href="#">No onclick here</a></li>
        </ul></body></html>"##;

    const API_RESPONSE: &str = r#"{
        "data": {
            "showwriter": "Zhang Wei",
            "remarkc": "Abstract text",
            "publishDateTimee": "2024-03-01 08:30:00"
        }
    }"#;

    #[test]
    fn test_parse_article_list_mines_onclick() {
        let listed = parse_article_list(LIST_PAGE);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "Study of Caching");
        assert_eq!(
            listed[0].link,
            "https://www.ncpssd.cn/articleDetail?id=A1&typename=journal&nav=1"
        );
        assert_eq!(listed[0].lngid, "A1");
        assert_eq!(listed[0].type_name, "journal");
        assert_eq!(listed[0].page_type, "1");
    }

    #[tokio::test]
    async fn test_build_feed_hits_json_endpoint() {
        let fetcher = StaticFetcher::new()
            .with_page("https://www.ncpssd.cn/newlist?type=0", LIST_PAGE)
            .with_page(ARTICLE_API, API_RESPONSE);
        let ctx = SourceContext {
            fetcher: Arc::new(fetcher),
            cache: Arc::new(FetchCache::new(Duration::from_secs(60), 64)),
            config: Arc::new(AppConfig::default()),
            param: None,
        };

        let feed = NcpssdNewList.build_feed(&ctx).await.unwrap();
        assert_eq!(feed.items.len(), 1);
        assert_eq!(feed.items[0].author.as_deref(), Some("Zhang Wei"));
        assert_eq!(feed.items[0].description.as_deref(), Some("Abstract text"));
        assert!(feed.items[0].pub_date.is_some());
    }

    #[tokio::test]
    async fn test_missing_data_is_a_skipped_negative() {
        let fetcher = StaticFetcher::new()
            .with_page("https://www.ncpssd.cn/newlist?type=0", LIST_PAGE)
            .with_page(ARTICLE_API, r#"{"data": null}"#);
        let ctx = SourceContext {
            fetcher: Arc::new(fetcher),
            cache: Arc::new(FetchCache::new(Duration::from_secs(60), 64)),
            config: Arc::new(AppConfig::default()),
            param: None,
        };

        let feed = NcpssdNewList.build_feed(&ctx).await.unwrap();
        assert!(feed.items.is_empty());
        // The negative result is cached for the TTL.
        assert_eq!(ctx.cache.len(), 1);
    }
}

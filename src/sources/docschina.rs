//! docschina weekly digest.
//!
//! The listing is not in the markup at all: the site is a Next.js app
//! and ships its issue index inside the `#__NEXT_DATA__` script block.
//! Each issue page is then fetched through the cache for its rendered
//! body.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::cache::ComputeOptions;
use crate::error::{CacheError, ScrapeError};
use crate::fetch::HttpFetch;
use crate::models::{Feed, FeedItem, FeedValue};
use crate::sources::{DETAIL_FAN_OUT, SourceContext, SourceHandler};

const BASE_URL: &str = "https://docschina.org";

static PAGE_TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("head title").unwrap());
static NEXT_DATA: Lazy<Selector> = Lazy::new(|| Selector::parse("#__NEXT_DATA__").unwrap());
static ISSUE_BODY: Lazy<Selector> =
    Lazy::new(|| Selector::parse("#__next > main > div > div").unwrap());

pub struct DocschinaWeekly;

#[async_trait]
impl SourceHandler for DocschinaWeekly {
    fn id(&self) -> &'static str {
        "docschina-weekly"
    }

    fn name(&self) -> &'static str {
        "docschina weekly"
    }

    #[instrument(level = "info", skip_all)]
    async fn build_feed(&self, ctx: &SourceContext) -> Result<Feed, ScrapeError> {
        let category = ctx.param_or("js");
        let list_url = format!("{BASE_URL}/news/weekly/{category}");

        let html = ctx.fetcher.get(&list_url).await?;
        let (page_title, issues) = parse_issue_index(&html, category)?;
        info!(count = issues.len(), category, "indexed weekly issues");

        let items: Vec<FeedItem> = stream::iter(issues)
            .map(|issue| fetch_issue(ctx, issue))
            .buffer_unordered(DETAIL_FAN_OUT)
            .filter_map(|result| std::future::ready(result))
            .collect()
            .await;

        let title = if page_title.is_empty() {
            self.name().to_string()
        } else {
            page_title
        };
        Ok(Feed::new(title, list_url, items).dedupe_by_link())
    }
}

/// One issue as listed in the embedded JSON index.
#[derive(Debug, Clone, PartialEq)]
struct IssueSummary {
    title: String,
    link: String,
    editors: Option<String>,
}

/// Fetch one issue page through the cache and attach its rendered body.
async fn fetch_issue(ctx: &SourceContext, issue: IssueSummary) -> Option<FeedItem> {
    let link = issue.link.clone();
    let fetcher = Arc::clone(&ctx.fetcher);

    let result = ctx
        .cache
        .get_or_compute(
            &link,
            move || async move {
                let html = fetcher.get(&issue.link).await.map_err(CacheError::from)?;
                let mut item = FeedItem::new(issue.title, issue.link);
                item.description = parse_issue_body(&html);
                item.author = issue.editors;
                Ok(FeedValue::Item(item))
            },
            ComputeOptions::default(),
        )
        .await;

    match result {
        Ok(value) => value.as_item().cloned(),
        Err(e) => {
            warn!(link = %link, error = %e, "issue fetch failed; skipping");
            None
        }
    }
}

/// Walk `props.pageProps.data` in the `__NEXT_DATA__` payload.
///
/// The payload shape is the app's build output, not a stable API, so
/// missing pieces are a structural error rather than an empty feed.
fn parse_issue_index(html: &str, category: &str) -> Result<(String, Vec<IssueSummary>), ScrapeError> {
    let document = Html::parse_document(html);

    let page_title = document
        .select(&PAGE_TITLE)
        .next()
        .map(|el| el.text().collect::<String>())
        .unwrap_or_default();

    let raw = document
        .select(&NEXT_DATA)
        .next()
        .map(|el| el.text().collect::<String>())
        .ok_or_else(|| ScrapeError::Structure("missing __NEXT_DATA__ block".to_string()))?;
    let data: Value = serde_json::from_str(&raw)?;

    let issues = data
        .pointer("/props/pageProps/data")
        .and_then(Value::as_array)
        .ok_or_else(|| ScrapeError::Structure("missing pageProps.data array".to_string()))?
        .iter()
        .filter_map(|entry| {
            let issue = entry.get("issue")?;
            // The issue id is numeric in some builds, a string in others.
            let issue = match issue {
                Value::Number(n) => n.to_string(),
                Value::String(s) => s.clone(),
                _ => return None,
            };
            let title = entry.get("title")?.as_str()?.to_string();
            let editors = entry
                .get("editors")
                .and_then(Value::as_array)
                .map(|editors| {
                    editors
                        .iter()
                        .filter_map(Value::as_str)
                        .collect::<Vec<_>>()
                        .join(",")
                })
                .filter(|joined| !joined.is_empty());

            Some(IssueSummary {
                title,
                link: format!("{BASE_URL}/news/weekly/{category}/{issue}"),
                editors,
            })
        })
        .collect();

    Ok((page_title, issues))
}

/// The rendered issue body, if the page still has the expected shell.
fn parse_issue_body(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .select(&ISSUE_BODY)
        .next()
        .map(|el| el.inner_html())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FetchCache;
    use crate::config::AppConfig;
    use crate::fetch::testing::StaticFetcher;
    use std::time::Duration;

    fn index_page() -> String {
        let payload = serde_json::json!({
            "props": {"pageProps": {"data": [
                {"issue": 42, "title": "Issue 42", "editors": ["alice", "bob"]},
                {"issue": "43", "title": "Issue 43"},
            ]}}
        });
        format!(
            r#"<html><head><title>JS Weekly</title></head><body>
            <script id="__NEXT_DATA__" type="application/json">{payload}</script>
            </body></html>"#
        )
    }

    const ISSUE_PAGE: &str = r#"<html><body><div id="__next"><main><div><div>
        <h2>This week</h2><p>Contents</p>
        </div></div></main></div></body></html>"#;

    #[test]
    fn test_parse_issue_index() {
        let (title, issues) = parse_issue_index(&index_page(), "js").unwrap();
        assert_eq!(title, "JS Weekly");
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].link, "https://docschina.org/news/weekly/js/42");
        assert_eq!(issues[0].editors.as_deref(), Some("alice,bob"));
        // String issue ids and missing editors are both fine.
        assert_eq!(issues[1].link, "https://docschina.org/news/weekly/js/43");
        assert!(issues[1].editors.is_none());
    }

    #[test]
    fn test_parse_issue_index_without_payload_is_structural() {
        let err = parse_issue_index("<html><body></body></html>", "js").unwrap_err();
        assert!(matches!(err, ScrapeError::Structure(_)));
    }

    #[test]
    fn test_parse_issue_body() {
        let body = parse_issue_body(ISSUE_PAGE).unwrap();
        assert!(body.contains("<h2>This week</h2>"));
    }

    #[tokio::test]
    async fn test_build_feed_attaches_issue_bodies() {
        let fetcher = StaticFetcher::new()
            .with_page("https://docschina.org/news/weekly/js", &index_page())
            .with_page("https://docschina.org/news/weekly/js/42", ISSUE_PAGE)
            .with_page("https://docschina.org/news/weekly/js/43", ISSUE_PAGE);
        let ctx = SourceContext {
            fetcher: Arc::new(fetcher),
            cache: Arc::new(FetchCache::new(Duration::from_secs(60), 64)),
            config: Arc::new(AppConfig::default()),
            param: None,
        };

        let feed = DocschinaWeekly.build_feed(&ctx).await.unwrap();
        assert_eq!(feed.title, "JS Weekly");
        assert_eq!(feed.items.len(), 2);
        for item in &feed.items {
            assert!(item.description.as_deref().unwrap().contains("This week"));
        }
        assert_eq!(ctx.cache.len(), 2);
    }
}

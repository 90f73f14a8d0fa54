//! The Reporter (twreporter) latest articles.
//!
//! Both phases go through the site's public JSON API: the listing names
//! the latest post slugs, and each post is fetched in full and rendered
//! into an HTML description from its typed content blocks. Posts the
//! API returns without a payload are cached as negatives.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::cache::ComputeOptions;
use crate::error::{CacheError, ScrapeError};
use crate::fetch::HttpFetch;
use crate::models::{Feed, FeedItem, FeedValue};
use crate::sources::{DETAIL_FAN_OUT, SourceContext, SourceHandler};
use crate::utils::parse_date;

const API_BASE: &str = "https://go-api.twreporter.org/v2/posts";
const SITE_BASE: &str = "https://www.twreporter.org";
const LIST_LIMIT: u32 = 20;

pub struct Twreporter;

#[derive(Debug, Clone, PartialEq)]
struct ListedPost {
    slug: String,
    title: String,
}

#[derive(Debug, Deserialize)]
struct PostEnvelope {
    data: Option<Post>,
}

/// The subset of a full post the feed renders. Image targets and content
/// blocks keep their raw JSON shape; the API nests them deeply and the
/// types vary per block.
#[derive(Debug, Deserialize)]
struct Post {
    #[serde(default)]
    published_date: Option<String>,
    #[serde(default)]
    writers: Vec<Contributor>,
    #[serde(default)]
    photographers: Vec<Contributor>,
    #[serde(default)]
    og_description: Option<String>,
    #[serde(default)]
    og_image: Value,
    #[serde(default)]
    leading_image_description: Option<String>,
    #[serde(default)]
    content: Value,
}

#[derive(Debug, Deserialize)]
struct Contributor {
    #[serde(default)]
    job_title: Option<String>,
    name: String,
}

#[async_trait]
impl SourceHandler for Twreporter {
    fn id(&self) -> &'static str {
        "twreporter"
    }

    fn name(&self) -> &'static str {
        "The Reporter"
    }

    #[instrument(level = "info", skip_all)]
    async fn build_feed(&self, ctx: &SourceContext) -> Result<Feed, ScrapeError> {
        let list_url = format!("{API_BASE}?limit={LIST_LIMIT}");

        let raw = ctx.fetcher.get(&list_url).await?;
        let listed = parse_post_list(&raw)?;
        info!(count = listed.len(), "indexed posts");

        let items: Vec<FeedItem> = stream::iter(listed)
            .map(|post| fetch_post(ctx, post))
            .buffer_unordered(DETAIL_FAN_OUT)
            .filter_map(|result| std::future::ready(result))
            .collect()
            .await;

        let mut feed = Feed::new(self.name(), SITE_BASE, items).dedupe_by_link();
        feed.language = Some("zh-Hant".to_string());
        Ok(feed)
    }
}

/// Fetch one post in full through the cache, keyed by its article URL.
async fn fetch_post(ctx: &SourceContext, listed: ListedPost) -> Option<FeedItem> {
    let link = format!("{SITE_BASE}/a/{}", listed.slug);
    let key = link.clone();
    let fetcher = Arc::clone(&ctx.fetcher);

    let result = ctx
        .cache
        .get_or_compute(
            &key,
            move || async move {
                let detail_url = format!("{API_BASE}/{}?full=true", listed.slug);
                let raw = fetcher.get(&detail_url).await.map_err(CacheError::from)?;
                let envelope: PostEnvelope = serde_json::from_str(&raw)
                    .map_err(|e| CacheError::Malformed(e.to_string()))?;
                let post = envelope.data.ok_or(CacheError::NotFound)?;

                let mut item = FeedItem::new(listed.title, link);
                item.author = assemble_authors(&post);
                item.description = Some(assemble_description(&post));
                item.pub_date = post.published_date.as_deref().and_then(parse_date);
                Ok(FeedValue::Item(item))
            },
            ComputeOptions::default(),
        )
        .await;

    match result {
        Ok(value) => value.as_item().cloned(),
        Err(CacheError::NotFound) => None,
        Err(e) => {
            warn!(link = %key, error = %e, "post fetch failed; skipping");
            None
        }
    }
}

/// Pull slug and title pairs out of the listing payload.
fn parse_post_list(raw: &str) -> Result<Vec<ListedPost>, ScrapeError> {
    let payload: Value = serde_json::from_str(raw)?;
    let records = payload
        .pointer("/data/records")
        .and_then(Value::as_array)
        .ok_or_else(|| ScrapeError::Structure("missing data.records array".to_string()))?;

    Ok(records
        .iter()
        .filter_map(|record| {
            Some(ListedPost {
                slug: record.get("slug")?.as_str()?.to_string(),
                title: record.get("title")?.as_str()?.to_string(),
            })
        })
        .collect())
}

/// Byline string: writers first, then photographers, each contributor as
/// `role / name` with the site's default roles filled in.
fn assemble_authors(post: &Post) -> Option<String> {
    let writers = contributor_line(&post.writers, "文字");
    let photographers = contributor_line(&post.photographers, "攝影");

    match (writers, photographers) {
        (Some(w), Some(p)) => Some(format!("{w}；{p}")),
        (Some(w), None) => Some(w),
        (None, Some(p)) => Some(p),
        (None, None) => None,
    }
}

fn contributor_line(contributors: &[Contributor], default_role: &str) -> Option<String> {
    if contributors.is_empty() {
        return None;
    }
    Some(
        contributors
            .iter()
            .map(|c| {
                let role = c.job_title.as_deref().unwrap_or(default_role);
                format!("{role} / {}", c.name)
            })
            .collect::<Vec<_>>()
            .join("，"),
    )
}

/// Render the post as HTML: leading image, summary, then the typed
/// content blocks in order.
fn assemble_description(post: &Post) -> String {
    let banner = post
        .og_image
        .pointer("/resized_targets/desktop/url")
        .and_then(Value::as_str)
        .map(|url| {
            render_image(
                url,
                post.og_image.get("description").and_then(Value::as_str),
                post.leading_image_description.as_deref(),
            )
        })
        .unwrap_or_default();

    let text = post
        .content
        .pointer("/api_data")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(render_block)
                .collect::<Vec<_>>()
                .join("<br>")
        })
        .unwrap_or_default();

    [
        banner,
        post.og_description.clone().unwrap_or_default(),
        text,
    ]
    .join("<br><br>")
}

/// One content block to an HTML fragment, or `None` for embeds and empty
/// blocks.
fn render_block(block: &Value) -> Option<String> {
    let block_type = block.get("type").and_then(Value::as_str).unwrap_or("");
    let content = block.get("content")?;
    if content.as_str() == Some("") || block_type == "embeddedcode" {
        return None;
    }

    let rendered = match block_type {
        "image" | "slideshow" => content
            .as_array()?
            .iter()
            .filter_map(|image| {
                let url = image.pointer("/desktop/url").and_then(Value::as_str)?;
                let caption = image.get("description").and_then(Value::as_str);
                Some(render_image(url, caption, caption))
            })
            .collect::<String>(),
        "blockquote" => format!("<blockquote>{}</blockquote>", content.as_str()?),
        "header-one" => format!("<h1>{}</h1>", content.as_str()?),
        "header-two" => format!("<h2>{}</h2>", content.as_str()?),
        "infobox" => {
            let box_ = content.as_array()?.first()?;
            format!(
                "<h2>{}</h2>{}",
                box_.get("title").and_then(Value::as_str).unwrap_or(""),
                box_.get("body").and_then(Value::as_str).unwrap_or(""),
            )
        }
        _ => format!("{}<br>", content.as_str()?),
    };
    Some(rendered)
}

fn render_image(url: &str, description: Option<&str>, caption: Option<&str>) -> String {
    let alt = description.unwrap_or("");
    match caption {
        Some(caption) if !caption.is_empty() => {
            format!(r#"<figure><img src="{url}" alt="{alt}"><figcaption>{caption}</figcaption></figure>"#)
        }
        _ => format!(r#"<img src="{url}" alt="{alt}">"#),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FetchCache;
    use crate::config::AppConfig;
    use crate::fetch::testing::StaticFetcher;
    use std::time::Duration;

    const LIST_RESPONSE: &str = r#"{
        "status": "ok",
        "data": {
            "meta": {"total": 2},
            "records": [
                {"slug": "caching-feature", "title": "On Caching"},
                {"slug": "second-post", "title": "Second"}
            ]
        }
    }"#;

    const POST_RESPONSE: &str = r#"{
        "data": {
            "published_date": "2025-05-06T10:00:00+08:00",
            "writers": [
                {"job_title": "記者", "name": "Lin"},
                {"name": "Chen"}
            ],
            "photographers": [{"name": "Wu"}],
            "og_description": "A summary",
            "og_image": {
                "description": "Harbor at dawn",
                "resized_targets": {"desktop": {"url": "https://img.example.org/lead.jpg"}}
            },
            "leading_image_description": "The harbor",
            "content": {"api_data": [
                {"type": "header-two", "content": "Background"},
                {"type": "unstyled", "content": "Paragraph one."},
                {"type": "embeddedcode", "content": "<script>ignored</script>"},
                {"type": "blockquote", "content": "Quoted"},
                {"type": "infobox", "content": [{"title": "Note", "body": "<p>Box body</p>"}]}
            ]}
        }
    }"#;

    fn sample_post() -> Post {
        let envelope: PostEnvelope = serde_json::from_str(POST_RESPONSE).unwrap();
        envelope.data.unwrap()
    }

    #[test]
    fn test_parse_post_list() {
        let listed = parse_post_list(LIST_RESPONSE).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].slug, "caching-feature");
        assert_eq!(listed[0].title, "On Caching");
    }

    #[test]
    fn test_parse_post_list_without_records_is_structural() {
        let err = parse_post_list(r#"{"status": "ok"}"#).unwrap_err();
        assert!(matches!(err, ScrapeError::Structure(_)));
    }

    #[test]
    fn test_assemble_authors_fills_default_roles() {
        let authors = assemble_authors(&sample_post()).unwrap();
        assert_eq!(authors, "記者 / Lin，文字 / Chen；攝影 / Wu");
    }

    #[test]
    fn test_assemble_authors_empty_is_none() {
        let post: Post = serde_json::from_str("{}").unwrap();
        assert!(assemble_authors(&post).is_none());
    }

    #[test]
    fn test_assemble_description_renders_blocks_in_order() {
        let description = assemble_description(&sample_post());

        assert!(description.starts_with("<figure><img src=\"https://img.example.org/lead.jpg\""));
        assert!(description.contains("<figcaption>The harbor</figcaption>"));
        assert!(description.contains("A summary"));
        assert!(description.contains("<h2>Background</h2>"));
        assert!(description.contains("Paragraph one.<br>"));
        assert!(description.contains("<blockquote>Quoted</blockquote>"));
        assert!(description.contains("<h2>Note</h2><p>Box body</p>"));
        // Embeds never reach the output.
        assert!(!description.contains("ignored"));
    }

    #[tokio::test]
    async fn test_build_feed_fetches_posts_through_cache() {
        let fetcher = StaticFetcher::new()
            .with_page(
                "https://go-api.twreporter.org/v2/posts?limit=20",
                LIST_RESPONSE,
            )
            .with_page(
                "https://go-api.twreporter.org/v2/posts/caching-feature?full=true",
                POST_RESPONSE,
            )
            .with_page(
                "https://go-api.twreporter.org/v2/posts/second-post?full=true",
                r#"{"data": null}"#,
            );
        let ctx = SourceContext {
            fetcher: Arc::new(fetcher),
            cache: Arc::new(FetchCache::new(Duration::from_secs(60), 64)),
            config: Arc::new(AppConfig::default()),
            param: None,
        };

        let feed = Twreporter.build_feed(&ctx).await.unwrap();
        assert_eq!(feed.items.len(), 1);
        assert_eq!(feed.items[0].title, "On Caching");
        assert_eq!(
            feed.items[0].link,
            "https://www.twreporter.org/a/caching-feature"
        );
        assert!(feed.items[0].pub_date.is_some());

        // One fresh post plus the payload-less negative are both cached.
        assert_eq!(ctx.cache.len(), 2);
    }
}

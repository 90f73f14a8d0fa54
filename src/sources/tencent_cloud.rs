//! Tencent Cloud developer community column listing.
//!
//! Pure API route: one JSON POST returns the whole article list with
//! every field the feed needs, so there is no detail fan-out. Like the
//! forum listing, the result is cached as one unit under a qualified
//! key per column.

use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::cache::ComputeOptions;
use crate::error::{CacheError, ScrapeError};
use crate::fetch::HttpFetch;
use crate::models::{Feed, FeedItem, FeedValue};
use crate::sources::{SourceContext, SourceHandler};

const LIST_API: &str = "https://cloud.tencent.com/developer/api/home/article-list";
const COLUMN_PAGE: &str = "https://cloud.tencent.com/developer/column";
const PAGE_SIZE: u32 = 20;

pub struct TencentCloudColumn;

/// Response shape of the article-list endpoint. The API spells the
/// category field `classifiId`.
#[derive(Debug, Deserialize)]
struct ColumnResponse {
    #[serde(default)]
    list: Vec<ColumnArticle>,
}

#[derive(Debug, Deserialize)]
struct ColumnArticle {
    title: String,
    #[serde(rename = "articleId")]
    article_id: u64,
    #[serde(default)]
    summary: Option<String>,
    /// Publish time as epoch seconds.
    #[serde(default, rename = "createTime")]
    create_time: Option<i64>,
    #[serde(default)]
    author: Option<ColumnAuthor>,
    #[serde(default)]
    tags: Vec<ColumnTag>,
}

#[derive(Debug, Deserialize)]
struct ColumnAuthor {
    nickname: String,
}

#[derive(Debug, Deserialize)]
struct ColumnTag {
    #[serde(rename = "tagName")]
    tag_name: String,
}

#[async_trait]
impl SourceHandler for TencentCloudColumn {
    fn id(&self) -> &'static str {
        "tencent-cloud-column"
    }

    fn name(&self) -> &'static str {
        "Tencent Cloud developer community columns"
    }

    #[instrument(level = "info", skip_all)]
    async fn build_feed(&self, ctx: &SourceContext) -> Result<Feed, ScrapeError> {
        let category = ctx.param.clone();
        let key = format!(
            "tencent-cloud:column:{}",
            category.as_deref().unwrap_or("all")
        );

        let fetcher = Arc::clone(&ctx.fetcher);
        let value = ctx
            .cache
            .get_or_compute(
                &key,
                move || async move {
                    let body = serde_json::json!({
                        "classifiId": category.as_deref().unwrap_or(""),
                        "page": 1,
                        "pagesize": PAGE_SIZE,
                        "type": "",
                    });
                    let raw = fetcher
                        .post_json(LIST_API, body)
                        .await
                        .map_err(CacheError::from)?;
                    let response: ColumnResponse = serde_json::from_str(&raw)
                        .map_err(|e| CacheError::Malformed(e.to_string()))?;
                    Ok(FeedValue::Items(
                        response.list.into_iter().map(article_to_item).collect(),
                    ))
                },
                ComputeOptions::default(),
            )
            .await?;

        let items = value.as_ref().clone().into_items();
        info!(count = items.len(), "assembled column feed");

        let mut feed = Feed::new(self.name(), COLUMN_PAGE, items).dedupe_by_link();
        feed.language = Some("zh-Hans".to_string());
        Ok(feed)
    }
}

fn article_to_item(article: ColumnArticle) -> FeedItem {
    let link = format!(
        "https://cloud.tencent.com/developer/article/{}",
        article.article_id
    );
    let mut item = FeedItem::new(article.title, link);
    item.description = article.summary;
    item.pub_date = article
        .create_time
        .and_then(|secs| DateTime::from_timestamp(secs, 0));
    item.author = article.author.map(|author| author.nickname);
    item.category = article.tags.into_iter().map(|tag| tag.tag_name).collect();
    item
}

//! Normalized feed data produced by the source handlers.
//!
//! Every handler, whatever the upstream markup looks like, boils its
//! output down to the same shapes:
//! - [`FeedItem`]: one entry with title, link and optional metadata
//! - [`Feed`]: the assembled list for a source, ready for the output stage
//! - [`FeedValue`]: the two value shapes handlers store in the fetch
//!   cache, a single detail-page item or a whole list cached as one
//!   unit

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// A single normalized feed entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    /// The entry title or headline.
    pub title: String,
    /// Absolute URL of the entry.
    pub link: String,
    /// Body or summary, usually an HTML fragment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Publish timestamp, when the source exposes one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pub_date: Option<DateTime<Utc>>,
    /// Author or byline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Source-assigned categories or tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub category: Vec<String>,
}

impl FeedItem {
    /// A bare item carrying only the fields every source can provide.
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            description: None,
            pub_date: None,
            author: None,
            category: Vec::new(),
        }
    }
}

/// An assembled feed for one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    /// Human-readable feed title.
    pub title: String,
    /// Link to the page the feed was assembled from.
    pub link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub items: Vec<FeedItem>,
}

impl Feed {
    pub fn new(title: impl Into<String>, link: impl Into<String>, items: Vec<FeedItem>) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            description: None,
            language: None,
            items,
        }
    }

    /// Drop duplicate entries, keeping the first occurrence of each link.
    ///
    /// Fan-out over list pages can surface the same detail URL more than
    /// once (pinned threads, multi-section listings).
    pub fn dedupe_by_link(mut self) -> Self {
        self.items = self
            .items
            .into_iter()
            .unique_by(|item| item.link.clone())
            .collect();
        self
    }
}

/// The value shapes handlers put into the fetch cache.
///
/// List-style routes cache the whole item list under one qualified key;
/// fan-out routes cache one item per detail URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeedValue {
    Item(FeedItem),
    Items(Vec<FeedItem>),
}

impl FeedValue {
    /// Flatten into a list of items regardless of shape.
    pub fn into_items(self) -> Vec<FeedItem> {
        match self {
            FeedValue::Item(item) => vec![item],
            FeedValue::Items(items) => items,
        }
    }

    pub fn as_item(&self) -> Option<&FeedItem> {
        match self {
            FeedValue::Item(item) => Some(item),
            FeedValue::Items(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_feed_item_serialization_skips_empty_fields() {
        let item = FeedItem::new("Title", "https://example.com/a");
        let json = serde_json::to_string(&item).unwrap();
        assert!(json.contains("\"title\":\"Title\""));
        assert!(!json.contains("description"));
        assert!(!json.contains("pub_date"));
        assert!(!json.contains("category"));
    }

    #[test]
    fn test_feed_item_roundtrip_with_all_fields() {
        let item = FeedItem {
            title: "Weekly issue 42".to_string(),
            link: "https://example.com/weekly/42".to_string(),
            description: Some("<p>body</p>".to_string()),
            pub_date: Some(Utc.with_ymd_and_hms(2025, 5, 6, 12, 0, 0).unwrap()),
            author: Some("editor-a,editor-b".to_string()),
            category: vec!["js".to_string()],
        };

        let json = serde_json::to_string(&item).unwrap();
        let back: FeedItem = serde_json::from_str(&json).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn test_feed_dedupe_by_link_keeps_first() {
        let feed = Feed::new(
            "Example",
            "https://example.com",
            vec![
                FeedItem::new("First", "https://example.com/a"),
                FeedItem::new("Other", "https://example.com/b"),
                FeedItem::new("Duplicate of first", "https://example.com/a"),
            ],
        )
        .dedupe_by_link();

        assert_eq!(feed.items.len(), 2);
        assert_eq!(feed.items[0].title, "First");
        assert_eq!(feed.items[1].link, "https://example.com/b");
    }

    #[test]
    fn test_feed_value_into_items() {
        let single = FeedValue::Item(FeedItem::new("One", "https://example.com/1"));
        assert_eq!(single.into_items().len(), 1);

        let many = FeedValue::Items(vec![
            FeedItem::new("One", "https://example.com/1"),
            FeedItem::new("Two", "https://example.com/2"),
        ]);
        assert_eq!(many.into_items().len(), 2);
    }

    #[test]
    fn test_feed_value_as_item() {
        let single = FeedValue::Item(FeedItem::new("One", "https://example.com/1"));
        assert_eq!(single.as_item().unwrap().title, "One");
        assert!(FeedValue::Items(vec![]).as_item().is_none());
    }
}

//! Structured-data extraction with explicit absence.
//!
//! Several sites embed article metadata as JSON-LD next to the rendered
//! markup. Extraction from it can fail in two very different ways: the
//! block simply is not there, or it is there but unparseable. The
//! distinction matters for logging and for tests, so it is surfaced as
//! [`Extracted`] instead of being swallowed. Callers fall back to a
//! selector-based strategy in both non-present cases.

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::Deserialize;

/// Outcome of an optional extraction step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted<T> {
    /// The data was present and parsed.
    Present(T),
    /// The carrier (script block, meta tag) is not in the document.
    Absent,
    /// The carrier is present but could not be interpreted.
    Malformed(String),
}

impl<T> Extracted<T> {
    /// Collapse to an `Option`, discarding the absent/malformed reason.
    pub fn ok(self) -> Option<T> {
        match self {
            Extracted::Present(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Extracted::Malformed(_))
    }
}

static LD_JSON_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());

/// Article metadata carried in a JSON-LD `@graph` block.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LinkedArticle {
    #[serde(default, rename = "name")]
    pub title: Option<String>,
    #[serde(default, rename = "dateModified")]
    pub date_modified: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LinkedData {
    #[serde(rename = "@graph")]
    graph: Vec<LinkedArticle>,
}

/// Pull article metadata out of the first JSON-LD block in a document.
pub fn linked_article(document: &Html) -> Extracted<LinkedArticle> {
    let Some(script) = document.select(&LD_JSON_SELECTOR).next() else {
        return Extracted::Absent;
    };
    let raw = script.text().collect::<String>();

    match serde_json::from_str::<LinkedData>(&raw) {
        Ok(data) => match data.graph.into_iter().next() {
            Some(article) => Extracted::Present(article),
            None => Extracted::Malformed("empty @graph".to_string()),
        },
        Err(e) => Extracted::Malformed(e.to_string()),
    }
}

/// Read the `content` attribute of a `<meta name="...">` tag.
pub fn meta_content(document: &Html, name: &str) -> Extracted<String> {
    let selector = match Selector::parse(&format!(r#"meta[name="{name}"]"#)) {
        Ok(selector) => selector,
        Err(e) => return Extracted::Malformed(e.to_string()),
    };
    match document.select(&selector).next() {
        Some(element) => match element.value().attr("content") {
            Some(content) if !content.is_empty() => Extracted::Present(content.to_string()),
            _ => Extracted::Malformed("meta tag has no content attribute".to_string()),
        },
        None => Extracted::Absent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linked_article_present() {
        let html = Html::parse_document(
            r#"<html><head><script type="application/ld+json">
            {"@graph":[{"name":"A Study in Caching","dateModified":"2025-05-06T10:00:00Z"}]}
            </script></head><body></body></html>"#,
        );

        let extracted = linked_article(&html);
        let article = match extracted {
            Extracted::Present(article) => article,
            other => panic!("expected Present, got {other:?}"),
        };
        assert_eq!(article.title.as_deref(), Some("A Study in Caching"));
        assert_eq!(
            article.date_modified.as_deref(),
            Some("2025-05-06T10:00:00Z")
        );
    }

    #[test]
    fn test_linked_article_absent_when_no_script() {
        let html = Html::parse_document("<html><head></head><body><p>no ld+json</p></body></html>");
        assert_eq!(linked_article(&html), Extracted::Absent);
    }

    #[test]
    fn test_linked_article_malformed_json_is_not_absent() {
        let html = Html::parse_document(
            r#"<html><head><script type="application/ld+json">{"@graph": [</script></head></html>"#,
        );
        assert!(linked_article(&html).is_malformed());
    }

    #[test]
    fn test_linked_article_empty_graph_is_malformed() {
        let html = Html::parse_document(
            r#"<html><head><script type="application/ld+json">{"@graph":[]}</script></head></html>"#,
        );
        assert_eq!(
            linked_article(&html),
            Extracted::Malformed("empty @graph".to_string())
        );
    }

    #[test]
    fn test_meta_content() {
        let html = Html::parse_document(
            r#"<html><head><meta name="weibo:webpage:create_at" content="2024-03-01 08:30:00"></head></html>"#,
        );
        assert_eq!(
            meta_content(&html, "weibo:webpage:create_at"),
            Extracted::Present("2024-03-01 08:30:00".to_string())
        );
        assert_eq!(meta_content(&html, "missing"), Extracted::Absent);
    }
}

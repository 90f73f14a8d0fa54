//! JSON output for assembled feeds.
//!
//! Serializes each normalized [`Feed`] to
//! `{out_dir}/{source_id}/{date}.json`, creating directories as needed.
//! Serialization of the items into a syndication format (RSS/Atom) is
//! someone else's job; this stage only persists the normalized shape.

use chrono::Local;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

use crate::error::ScrapeError;
use crate::models::Feed;

/// Write a [`Feed`] to a date-stamped JSON file under the source's
/// directory. Returns the path written.
#[instrument(level = "info", skip(feed), fields(source_id = %source_id))]
pub async fn write_feed(
    feed: &Feed,
    source_id: &str,
    out_dir: &str,
) -> Result<String, ScrapeError> {
    let json = serde_json::to_string_pretty(feed)?;

    let feed_dir = Path::new(out_dir).join(source_id);
    fs::create_dir_all(&feed_dir).await?;

    let date = Local::now().date_naive().to_string();
    let path = feed_dir.join(format!("{date}.json"));
    fs::write(&path, json).await?;

    let path = path.to_string_lossy().into_owned();
    info!(path = %path, items = feed.items.len(), "wrote feed JSON");
    Ok(path)
}

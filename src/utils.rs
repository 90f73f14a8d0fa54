//! Helpers for date parsing, URL resolution, and string cleanup.
//!
//! Source sites expose publish dates in whatever format their CMS emits;
//! [`parse_date`] tries the handful of formats the supported sources
//! actually use, plus a bare-date fallback for listings that wrap dates
//! in decoration (brackets, prefixes).

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static BARE_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4})[-/](\d{1,2})[-/](\d{1,2})").unwrap());

/// Parse a publish date in any of the formats the sources emit.
///
/// Tries, in order: RFC 3339, RFC 2822, `YYYY-MM-DD HH:MM:SS`, then a
/// bare `YYYY-MM-DD` (or `YYYY/MM/DD`) anywhere in the string. Naive
/// timestamps are taken as UTC. Returns `None` rather than guessing when
/// nothing matches.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y/%m/%d %H:%M") {
        return Some(Utc.from_utc_datetime(&naive));
    }

    let captures = BARE_DATE.captures(trimmed)?;
    let year = captures[1].parse().ok()?;
    let month = captures[2].parse().ok()?;
    let day = captures[3].parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

/// Resolve an href against a base URL, returning an absolute URL string.
///
/// Already-absolute hrefs pass through unchanged.
pub fn absolutize(base: &Url, href: &str) -> Option<String> {
    base.join(href).ok().map(|url| url.to_string())
}

/// Collapse all runs of whitespace, including newlines, into nothing.
///
/// List blurbs on CJK sites are typically wrapped in layout whitespace
/// that would otherwise end up inside descriptions.
pub fn squeeze_whitespace(s: &str) -> String {
    s.split_whitespace().collect()
}

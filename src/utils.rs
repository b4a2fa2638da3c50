//! Utility functions for string handling, URL hygiene, and file system checks.
//!
//! This module provides helper functions used throughout the pipeline:
//! - String truncation for logging and for storage budgets
//! - Whitespace normalisation and slugification
//! - Publication timestamps normalised to RFC 3339 UTC
//! - Absolute `http(s)` URL validation and brand derivation from a host
//! - File system validation for output directories

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to `max` characters with an ellipsis and
/// byte count indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}…(+{} bytes)", &s[..cut], s.len() - cut),
    }
}

/// Keep at most `max_chars` characters of `s`, never splitting a character.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        None => s.to_string(),
        Some((cut, _)) => s[..cut].to_string(),
    }
}

/// Collapse every run of whitespace into a single space and trim the ends.
pub fn collapse_whitespace(s: &str) -> String {
    WHITESPACE.replace_all(s, " ").trim().to_string()
}

/// Return the trimmed value when it carries any text.
pub fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Normalise a publication timestamp to RFC 3339 in UTC (`...Z`).
///
/// Accepts RFC 3339, RFC 2822 and offset-less `YYYY-MM-DDTHH:MM:SS`
/// (read as UTC). A bare date is kept as `YYYY-MM-DD`. Anything else is
/// returned trimmed but otherwise untouched, so a value is never lost.
pub fn normalize_timestamp(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let utc = DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
                .ok()
                .map(|dt| dt.and_utc())
        });
    if let Some(dt) = utc {
        return Some(dt.to_rfc3339_opts(SecondsFormat::Secs, true));
    }
    if let Ok(day) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(day.to_string());
    }
    Some(raw.to_string())
}

/// Convert a country name into a file-system friendly slug.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(slugify("Hong Kong SAR, China"), "hong-kong-sar-china");
/// ```
pub fn slugify(title: &str) -> String {
    title
        .to_lowercase()
        .replace(|c: char| !c.is_alphanumeric() && c != ' ' && c != '-', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// Capitalize the first character of a string.
pub fn upcase(s: &str) -> String {
    let mut c = s.chars();
    match c.next() {
        None => String::new(),
        Some(f) => f.to_uppercase().collect::<String>() + c.as_str(),
    }
}

/// True when `candidate` parses as an absolute `http` or `https` URL.
pub fn is_absolute_http_url(candidate: &str) -> bool {
    Url::parse(candidate)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

/// Resolve `candidate` against `base` and keep it only if the result is an
/// absolute `http(s)` URL. `data:` URIs and other schemes are rejected.
pub fn absolutize(candidate: &str, base: &str) -> Option<String> {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return None;
    }
    let joined = match Url::parse(base) {
        Ok(base) => base.join(candidate).ok()?,
        Err(_) => Url::parse(candidate).ok()?,
    };
    if matches!(joined.scheme(), "http" | "https") && joined.host_str().is_some() {
        Some(joined.to_string())
    } else {
        None
    }
}

/// Lowercased host of a URL with any leading `www.` removed.
pub fn host_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

const KNOWN_BRANDS: &[(&str, &str)] = &[
    ("apnews.com", "AP News"),
    ("bbc.co.uk", "BBC"),
    ("bbc.com", "BBC"),
    ("bloomberg.com", "Bloomberg"),
    ("cnbc.com", "CNBC"),
    ("cnn.com", "CNN"),
    ("ft.com", "Financial Times"),
    ("nytimes.com", "The New York Times"),
    ("reuters.com", "Reuters"),
    ("theguardian.com", "The Guardian"),
    ("wsj.com", "The Wall Street Journal"),
];

const SECOND_LEVEL_SUFFIXES: &[&str] = &["co", "com", "org", "net", "gov", "ac", "edu"];

/// Derive a human-readable publisher brand from a URL's domain.
///
/// Known outlets map to their usual name; anything else uses the registrable
/// label, capitalized (`https://www.dawn.com/news/1` becomes `Dawn`).
pub fn brand_from_url(url: &str) -> Option<String> {
    let host = host_of(url)?;
    for (domain, brand) in KNOWN_BRANDS {
        if host == *domain || host.ends_with(&format!(".{domain}")) {
            return Some((*brand).to_string());
        }
    }

    let parts: Vec<&str> = host.split('.').filter(|p| !p.is_empty()).collect();
    let label = match parts.len() {
        0 => return None,
        1 => parts[0],
        n if n >= 3 && SECOND_LEVEL_SUFFIXES.contains(&parts[n - 2]) => parts[n - 3],
        n => parts[n - 2],
    };
    Some(upcase(label))
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if it doesn't exist, then performs a write test by
/// creating and immediately deleting a probe file.
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    if let Err(e) = fs::create_dir_all(path).await {
        return Err(Box::new(e));
    }
    let probe_path = format!("{}/..__probe_write__", path.trim_end_matches('/'));
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_for_log_short_string() {
        let s = "Hello, world!";
        assert_eq!(truncate_for_log(s, 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_chars_respects_multibyte() {
        assert_eq!(truncate_chars("héllo wörld", 4), "héll");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \n\t b  c "), "a b c");
    }

    #[test]
    fn test_normalize_timestamp() {
        assert_eq!(
            normalize_timestamp("2025-06-01T08:00:00+05:00").as_deref(),
            Some("2025-06-01T03:00:00Z")
        );
        assert_eq!(
            normalize_timestamp("Sun, 01 Jun 2025 08:00:00 GMT").as_deref(),
            Some("2025-06-01T08:00:00Z")
        );
        assert_eq!(
            normalize_timestamp(" 2025-06-01T08:00:00.250 ").as_deref(),
            Some("2025-06-01T08:00:00Z")
        );
        assert_eq!(normalize_timestamp("2025-06-01").as_deref(), Some("2025-06-01"));
        assert_eq!(normalize_timestamp("3 hours ago").as_deref(), Some("3 hours ago"));
        assert_eq!(normalize_timestamp("   "), None);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hong Kong SAR, China"), "hong-kong-sar-china");
        assert_eq!(slugify("United  States"), "united-states");
        assert_eq!(slugify("Côte d'Ivoire"), "côte-divoire");
    }

    #[test]
    fn test_upcase() {
        assert_eq!(upcase("hello"), "Hello");
        assert_eq!(upcase(""), "");
    }

    #[test]
    fn test_absolutize() {
        let base = "https://example.com/news/story";
        assert_eq!(
            absolutize("/img/a.jpg", base).as_deref(),
            Some("https://example.com/img/a.jpg")
        );
        assert_eq!(
            absolutize("//cdn.example.com/a.jpg", base).as_deref(),
            Some("https://cdn.example.com/a.jpg")
        );
        assert_eq!(absolutize("data:image/png;base64,AAAA", base), None);
        assert_eq!(absolutize("   ", base), None);
        assert_eq!(absolutize("javascript:void(0)", base), None);
    }

    #[test]
    fn test_is_absolute_http_url() {
        assert!(is_absolute_http_url("https://a.com/x.png"));
        assert!(!is_absolute_http_url("/x.png"));
        assert!(!is_absolute_http_url("ftp://a.com/x.png"));
        assert!(!is_absolute_http_url("not a url"));
    }

    #[test]
    fn test_brand_from_url() {
        assert_eq!(
            brand_from_url("https://www.reuters.com/world/x").as_deref(),
            Some("Reuters")
        );
        assert_eq!(
            brand_from_url("https://news.bbc.co.uk/story").as_deref(),
            Some("BBC")
        );
        assert_eq!(
            brand_from_url("https://www.dawn.com/news/1").as_deref(),
            Some("Dawn")
        );
        assert_eq!(
            brand_from_url("https://www.thehindu.co.in/a").as_deref(),
            Some("Thehindu")
        );
        assert_eq!(brand_from_url("not a url"), None);
    }

    #[test]
    fn test_host_of_strips_www() {
        assert_eq!(host_of("https://WWW.Example.com/a").as_deref(), Some("example.com"));
    }
}

//! Data models for candidate links and the article records built from them.
//!
//! This module defines the core data structures that flow through the pipeline:
//! - [`CandidateLink`]: an aggregator link plus feed metadata, as discovered
//! - [`ResolvedLink`]: a candidate with its canonical publisher URL
//! - [`ArticleRecord`]: the structured article handed to downstream consumers
//! - [`ArticleOutcome`]: a record plus the reason it is only partially populated
//! - [`CountryReport`]: the final per-country evidence set for one run

use crate::utils::{is_absolute_http_url, non_empty, truncate_chars};
use serde::{Deserialize, Serialize};

/// A news link as supplied by the discovery layer.
///
/// Never mutated once created; resolution produces a new [`ResolvedLink`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CandidateLink {
    /// The link as given by the feed, usually an aggregator redirect wrapper.
    pub url: String,
    /// Headline as given by the feed.
    #[serde(default)]
    pub title: Option<String>,
    /// Publisher label as given by the feed.
    #[serde(default)]
    pub source: Option<String>,
    /// Publication timestamp (RFC 3339) as given by the feed.
    #[serde(default)]
    pub published_at: Option<String>,
    /// Plain-text snippet from the feed item, used as a last-resort summary.
    #[serde(default)]
    pub snippet: Option<String>,
}

impl CandidateLink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            source: None,
            published_at: None,
            snippet: None,
        }
    }
}

/// A [`CandidateLink`] whose wrapper has been replaced by the publisher URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLink {
    /// The original feed entry.
    pub candidate: CandidateLink,
    /// Canonical publisher URL, or the original URL when resolution failed.
    pub url: String,
    /// Whether `url` differs from the candidate because a wrapper was decoded.
    pub resolved: bool,
}

impl ResolvedLink {
    /// A link used as-is, either because it was not wrapped or because
    /// resolution failed.
    pub fn passthrough(candidate: CandidateLink) -> Self {
        let url = candidate.url.clone();
        Self {
            candidate,
            url,
            resolved: false,
        }
    }
}

/// Which extraction stages contributed to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum ExtractionTier {
    #[serde(rename = "tier1")]
    Tier1,
    #[serde(rename = "tier1+tier2")]
    Tier1And2,
}

impl std::fmt::Display for ExtractionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractionTier::Tier1 => f.write_str("tier1"),
            ExtractionTier::Tier1And2 => f.write_str("tier1+tier2"),
        }
    }
}

/// A structured article as produced by tier-1 and optionally improved by tier-2.
///
/// The setters enforce the record invariants: thumbnails are always absolute
/// `http(s)` URLs, body text never exceeds the storage budget, and empty
/// values never replace populated ones.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ArticleRecord {
    /// Canonical article URL.
    pub url: String,
    pub title: Option<String>,
    pub source: Option<String>,
    pub published_at: Option<String>,
    /// Short human-readable synopsis.
    pub summary: Option<String>,
    /// Main body text, truncated to the configured character budget.
    pub full_text: Option<String>,
    /// Absolute `http(s)` thumbnail URL.
    pub thumbnail_url: Option<String>,
    pub extraction_tier: ExtractionTier,
    /// Impact rank 1..=3, only for the three highest-impact records.
    pub rank: Option<u8>,
    /// Impact score reported by the ranking collaborator for ranked records.
    pub impact: Option<f64>,
}

impl ArticleRecord {
    /// A record carrying only what the feed already knew about the link.
    pub fn from_link(link: &ResolvedLink) -> Self {
        Self {
            url: link.url.clone(),
            title: non_empty(link.candidate.title.as_deref()),
            source: non_empty(link.candidate.source.as_deref()),
            published_at: non_empty(link.candidate.published_at.as_deref()),
            summary: None,
            full_text: None,
            thumbnail_url: None,
            extraction_tier: ExtractionTier::Tier1,
            rank: None,
            impact: None,
        }
    }

    /// Set the thumbnail if `candidate` is an absolute `http(s)` URL.
    /// Returns whether the value was accepted.
    pub fn set_thumbnail(&mut self, candidate: &str) -> bool {
        let candidate = candidate.trim();
        if is_absolute_http_url(candidate) {
            self.thumbnail_url = Some(candidate.to_string());
            true
        } else {
            false
        }
    }

    /// Set the body text, truncated to `max_chars`. Empty text is ignored.
    pub fn set_full_text(&mut self, text: &str, max_chars: usize) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        self.full_text = Some(truncate_chars(text, max_chars));
        true
    }

    /// Overwrite a text field only when `value` carries text.
    pub fn overwrite(field: &mut Option<String>, value: Option<&str>) -> bool {
        match non_empty(value) {
            Some(v) => {
                *field = Some(v);
                true
            }
            None => false,
        }
    }

    /// Fill a text field only when it is currently empty.
    pub fn fill(field: &mut Option<String>, value: Option<&str>) -> bool {
        if field.as_deref().is_some_and(|f| !f.trim().is_empty()) {
            return false;
        }
        Self::overwrite(field, value)
    }
}

/// Why a tier-1 extraction produced only a partial record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// The request exceeded its timeout.
    Timeout,
    /// Connection, TLS, or body read failure.
    Network { message: String },
    /// The publisher answered with a non-2xx status.
    HttpStatus { status: u16 },
    /// The response was not an HTML document.
    NotHtml { content_type: String },
    /// The link could not be fetched at all (e.g. not an http(s) URL).
    InvalidUrl,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::Timeout => f.write_str("timeout"),
            FailureReason::Network { message } => write!(f, "network: {message}"),
            FailureReason::HttpStatus { status } => write!(f, "http status {status}"),
            FailureReason::NotHtml { content_type } => write!(f, "not html: {content_type}"),
            FailureReason::InvalidUrl => f.write_str("invalid url"),
        }
    }
}

/// Result of a tier-1 attempt: the record always exists, partial ones carry a reason.
#[derive(Debug, Clone, PartialEq)]
pub enum ArticleOutcome {
    Complete(ArticleRecord),
    Partial {
        record: ArticleRecord,
        reason: FailureReason,
    },
}

impl ArticleOutcome {
    pub fn record(&self) -> &ArticleRecord {
        match self {
            ArticleOutcome::Complete(record) => record,
            ArticleOutcome::Partial { record, .. } => record,
        }
    }

    pub fn reason(&self) -> Option<&FailureReason> {
        match self {
            ArticleOutcome::Complete(_) => None,
            ArticleOutcome::Partial { reason, .. } => Some(reason),
        }
    }

    pub fn into_record(self) -> ArticleRecord {
        match self {
            ArticleOutcome::Complete(record) => record,
            ArticleOutcome::Partial { record, .. } => record,
        }
    }
}

/// A per-article failure kept for the run summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArticleFailure {
    pub url: String,
    pub reason: FailureReason,
}

/// The evidence set for one country on one run date.
#[derive(Debug, Clone, Serialize)]
pub struct CountryReport {
    pub country: String,
    /// Run date in `YYYY-MM-DD` format.
    pub run_date: String,
    /// Ranked records first (rank 1..=3), then the rest in tier-1 order.
    pub articles: Vec<ArticleRecord>,
    pub failures: Vec<ArticleFailure>,
    /// Number of calls made to the enrichment service for this country.
    pub tier2_attempts: usize,
    /// True when an abort signal stopped processing early.
    pub aborted: bool,
}

impl CountryReport {
    pub fn empty(country: &str, run_date: &str) -> Self {
        Self {
            country: country.to_string(),
            run_date: run_date.to_string(),
            articles: Vec::new(),
            failures: Vec::new(),
            tier2_attempts: 0,
            aborted: false,
        }
    }

    /// The ranked records, in rank order.
    pub fn top_articles(&self) -> impl Iterator<Item = &ArticleRecord> {
        self.articles.iter().filter(|a| a.rank.is_some())
    }
}

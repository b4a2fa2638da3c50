//! Candidate discovery through the aggregator's RSS search.
//!
//! Each country gets three topical searches (political, economic,
//! security). Results are merged in query order, deduplicated by URL, and
//! capped. A candidates file can replace live discovery for offline runs.
//!
//! # Example
//!
//! ```ignore
//! let discovery = GoogleNewsDiscovery::new(fetcher, pacer, DiscoveryOptions::default());
//! let candidates = discovery.discover("Ghana").await?;
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use once_cell::sync::Lazy;
use quick_xml::de::from_str;
use regex::Regex;
use scraper::Html;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::http::{Fetch, FetchError, FetchedPage};
use crate::models::CandidateLink;
use crate::pacing::Pacer;
use crate::utils::{collapse_whitespace, non_empty};

const SEARCH_BASE: &str = "https://news.google.com/rss/search";

static ANCHOR_ELEMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<a[^>]*>.*?</a>").unwrap());

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("could not parse feed: {0}")]
    Parse(String),
    #[error("no discovery query succeeded for {country}: {last_error}")]
    Unreachable { country: String, last_error: String },
    #[error("could not read candidates file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid candidates file: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    source: Option<Source>,
}

#[derive(Debug, Deserialize)]
struct Source {
    #[serde(rename = "$text")]
    name: Option<String>,
}

/// The aggregator's RSS search URL for `query`.
pub fn google_news_search_url(query: &str, lang: &str, country: &str) -> String {
    format!(
        "{SEARCH_BASE}?q={}&hl={lang}-{country}&gl={country}&ceid={country}:{lang}",
        urlencoding::encode(query)
    )
}

/// The three topical searches run for every country.
pub fn country_queries(country: &str) -> [String; 3] {
    [
        format!(
            "\"{country}\" (government OR president OR prime minister OR parliament OR election OR cabinet OR coup OR protest)"
        ),
        format!(
            "\"{country}\" (central bank OR interest rate OR inflation OR GDP OR currency OR monetary policy OR IMF OR World Bank)"
        ),
        format!(
            "\"{country}\" (military OR defense OR conflict OR war OR attack OR sanctions OR security OR terrorism)"
        ),
    ]
}

/// Plain text from an RSS description: anchors and tags removed, entities
/// decoded, whitespace collapsed.
pub fn strip_html(raw: &str) -> String {
    let without_anchors = ANCHOR_ELEMENT.replace_all(raw, "");
    let fragment = Html::parse_fragment(&without_anchors);
    collapse_whitespace(&fragment.root_element().text().collect::<String>())
}

fn rfc2822_to_rfc3339(ts: &str) -> Option<String> {
    DateTime::parse_from_rfc2822(ts.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Parse an RSS document into candidate links. Items without a link are dropped.
pub fn parse_rss(xml: &str) -> Result<Vec<CandidateLink>, DiscoveryError> {
    let rss: Rss = from_str(xml).map_err(|e| DiscoveryError::Parse(e.to_string()))?;
    Ok(rss
        .channel
        .items
        .into_iter()
        .filter_map(|item| {
            let url = non_empty(item.link.as_deref())?;
            Some(CandidateLink {
                url,
                title: non_empty(item.title.as_deref()),
                source: item.source.and_then(|s| non_empty(s.name.as_deref())),
                published_at: item.pub_date.as_deref().and_then(rfc2822_to_rfc3339),
                snippet: item
                    .description
                    .as_deref()
                    .map(strip_html)
                    .filter(|s| !s.is_empty()),
            })
        })
        .collect())
}

/// Read a JSON map of `country -> [candidate]`.
pub async fn load_candidates_file(
    path: &Path,
) -> Result<BTreeMap<String, Vec<CandidateLink>>, DiscoveryError> {
    let raw = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&raw)?)
}

#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub lang: String,
    pub region: String,
    pub timeout: Duration,
    /// Items kept from each query.
    pub per_query: usize,
    /// Candidates kept per country after deduplication.
    pub max_candidates: usize,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            lang: "en".to_string(),
            region: "US".to_string(),
            timeout: Duration::from_secs(15),
            per_query: 15,
            max_candidates: 20,
        }
    }
}

pub struct GoogleNewsDiscovery<F> {
    fetcher: Arc<F>,
    pacer: Arc<Pacer>,
    options: DiscoveryOptions,
}

impl<F: Fetch> GoogleNewsDiscovery<F> {
    pub fn new(fetcher: Arc<F>, pacer: Arc<Pacer>, options: DiscoveryOptions) -> Self {
        Self {
            fetcher,
            pacer,
            options,
        }
    }

    async fn search(&self, query: String) -> Result<Vec<CandidateLink>, DiscoveryError> {
        let url = google_news_search_url(&query, &self.options.lang, &self.options.region);
        self.pacer.await_turn().await;
        let page = self
            .fetcher
            .get(&url, self.options.timeout)
            .await
            .and_then(FetchedPage::ensure_success)?;
        let mut items = parse_rss(&page.body)?;
        items.truncate(self.options.per_query);
        Ok(items)
    }

    /// Discover candidates for `country`.
    ///
    /// Fails only when every query failed; a partial outage still yields
    /// whatever the working queries returned.
    #[instrument(level = "info", skip(self))]
    pub async fn discover(&self, country: &str) -> Result<Vec<CandidateLink>, DiscoveryError> {
        let results: Vec<_> = stream::iter(country_queries(country))
            .then(|query| self.search(query))
            .collect()
            .await;

        let mut last_error = None;
        let mut found = Vec::new();
        for result in results {
            match result {
                Ok(items) => found.push(items),
                Err(e) => {
                    warn!(error = %e, "Discovery query failed");
                    last_error = Some(e.to_string());
                }
            }
        }
        if found.is_empty() {
            return Err(DiscoveryError::Unreachable {
                country: country.to_string(),
                last_error: last_error.unwrap_or_default(),
            });
        }

        let candidates: Vec<CandidateLink> = found
            .into_iter()
            .flatten()
            .unique_by(|c| c.url.clone())
            .take(self.options.max_candidates)
            .collect();
        info!(candidates = candidates.len(), "Discovery complete");
        Ok(candidates)
    }
}

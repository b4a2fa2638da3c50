//! Tier-2 ("advanced") extraction through a paid rendering service.
//!
//! The service fetches and renders a publisher page on our behalf and returns
//! the rendered HTML in a JSON envelope. The same field chains as tier-1 are
//! then run over that body. Tier-2 only ever improves a record:
//!
//! - a non-empty field from the service overwrites the tier-1 value
//! - an empty or missing field leaves the tier-1 value in place
//! - any service error is "no improvement", never a pipeline failure
//!
//! Before calling the service, the publisher's crawl policy is consulted for
//! the exact path. A denial skips the article without counting as a failure.

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::http::{Fetch, FetchError};
use crate::models::{ArticleRecord, ExtractionTier};
use crate::pacing::Pacer;
use crate::scrapers::extract::{ExtractLimits, Page, extract_page};
use crate::scrapers::robots::CrawlPolicyCache;
use crate::utils::{normalize_timestamp, truncate_for_log};

/// Default endpoint of the rendering service.
pub const DEFAULT_API_BASE: &str = "https://api.crawlbase.com";

/// Fields returned by the enrichment service. Empty means "not provided".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enrichment {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub full_text: Option<String>,
    pub thumbnail_url: Option<String>,
    pub published_at: Option<String>,
    pub source: Option<String>,
}

/// Errors from one enrichment call. All of them mean "no improvement".
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("no enrichment credential configured")]
    MissingCredential,
    #[error("enrichment request timed out")]
    Timeout,
    #[error("enrichment transport error: {0}")]
    Transport(String),
    #[error("enrichment service returned HTTP {0}")]
    Status(u16),
    #[error("origin returned status {0:?}")]
    Origin(Option<u16>),
    #[error("malformed enrichment response: {0}")]
    Malformed(String),
}

impl From<FetchError> for EnrichError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Timeout(_) => EnrichError::Timeout,
            FetchError::Status(status) => EnrichError::Status(status),
            other => EnrichError::Transport(other.to_string()),
        }
    }
}

/// Trait for the third-party enrichment service.
///
/// `has_credential` must be cheap: it is consulted before any selection work
/// so that a run without a credential makes zero calls.
pub trait EnrichmentService {
    fn has_credential(&self) -> bool;

    /// Fetch richer metadata for one article URL.
    async fn enrich(&self, url: &str) -> Result<Enrichment, EnrichError>;
}

/// Envelope returned by the rendering service.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    original_status: Option<Value>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

impl Envelope {
    /// `original_status` arrives as a number or a numeric string.
    fn origin_status(&self) -> Option<u16> {
        match self.original_status.as_ref()? {
            Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Options for [`RenderingServiceClient`].
#[derive(Debug, Clone)]
pub struct RenderingOptions {
    pub api_base: String,
    pub timeout: Duration,
    pub page_wait_ms: u64,
    pub ajax_wait_ms: u64,
    pub limits: ExtractLimits,
}

/// Client for a Crawlbase-style rendering API.
pub struct RenderingServiceClient<F> {
    fetcher: Arc<F>,
    token: Option<String>,
    options: RenderingOptions,
}

impl<F: Fetch> RenderingServiceClient<F> {
    pub fn new(fetcher: Arc<F>, token: Option<String>, options: RenderingOptions) -> Self {
        let token = token.filter(|t| !t.trim().is_empty());
        Self {
            fetcher,
            token,
            options,
        }
    }

    fn request_url(&self, token: &str, url: &str) -> Result<String, EnrichError> {
        let endpoint = format!("{}/", self.options.api_base.trim_end_matches('/'));
        let page_wait = self.options.page_wait_ms.to_string();
        let ajax_wait = self.options.ajax_wait_ms.to_string();
        Url::parse_with_params(
            &endpoint,
            &[
                ("token", token),
                ("url", url),
                ("format", "json"),
                ("device", "desktop"),
                ("page_wait", page_wait.as_str()),
                ("ajax_wait", ajax_wait.as_str()),
            ],
        )
        .map(String::from)
        .map_err(|e| EnrichError::Malformed(format!("bad api base: {e}")))
    }

    /// Turn a service response body into an [`Enrichment`].
    fn parse_envelope(&self, raw: &str, url: &str) -> Result<Enrichment, EnrichError> {
        let envelope: Envelope =
            serde_json::from_str(raw).map_err(|e| EnrichError::Malformed(e.to_string()))?;

        let status = envelope.origin_status();
        if status.is_none_or(|s| s >= 400) {
            return Err(EnrichError::Origin(status));
        }
        let body = envelope
            .body
            .as_deref()
            .filter(|b| !b.trim().is_empty())
            .ok_or_else(|| EnrichError::Malformed("empty body".to_string()))?;

        let base = envelope.url.as_deref().unwrap_or(url);
        let page = Page::parse(body, base);
        let extracted = extract_page(&page, self.options.limits, None);
        Ok(Enrichment {
            title: extracted.title,
            summary: extracted.summary,
            full_text: extracted.full_text,
            thumbnail_url: extracted.thumbnail_url,
            published_at: extracted.published_at,
            source: extracted.publisher,
        })
    }
}

impl<F: Fetch> EnrichmentService for RenderingServiceClient<F> {
    fn has_credential(&self) -> bool {
        self.token.is_some()
    }

    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn enrich(&self, url: &str) -> Result<Enrichment, EnrichError> {
        let token = self.token.as_deref().ok_or(EnrichError::MissingCredential)?;
        let request = self.request_url(token, url)?;
        let response = self
            .fetcher
            .get(&request, self.options.timeout)
            .await?
            .ensure_success()?;
        debug!(
            preview = %truncate_for_log(&response.body, 200),
            "Enrichment response"
        );
        self.parse_envelope(&response.body, url)
    }
}

/// Merge `enrichment` into `record` without ever blanking a field.
///
/// Title, summary and publication time are replaced; the feed's source
/// label is only filled when missing. Returns whether any field was written. The thumbnail is only taken when
/// it is an absolute `http(s)` URL and body text respects `max_chars`.
pub fn merge_enrichment(record: &mut ArticleRecord, enrichment: &Enrichment, max_chars: usize) -> bool {
    let mut changed = false;
    changed |= ArticleRecord::overwrite(&mut record.title, enrichment.title.as_deref());
    changed |= ArticleRecord::overwrite(&mut record.summary, enrichment.summary.as_deref());
    let published = enrichment.published_at.as_deref().and_then(normalize_timestamp);
    changed |= ArticleRecord::overwrite(&mut record.published_at, published.as_deref());
    changed |= ArticleRecord::fill(&mut record.source, enrichment.source.as_deref());
    if let Some(text) = enrichment.full_text.as_deref() {
        changed |= record.set_full_text(text, max_chars);
    }
    if let Some(thumb) = enrichment.thumbnail_url.as_deref() {
        changed |= record.set_thumbnail(thumb);
    }
    changed
}

/// What happened to one gate-selected record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tier2Outcome {
    /// At least one field was improved; the record is now `tier1+tier2`.
    Enriched,
    /// The call failed or returned nothing usable; the record is unchanged.
    NoImprovement(String),
    /// The crawl policy disallows the path; no call was made.
    PolicyDenied,
}

/// Tier-2 stage: crawl-policy check, paced service call, monotonic merge.
pub struct AdvancedScraper<F, E> {
    service: Arc<E>,
    policies: CrawlPolicyCache<F>,
    pacer: Arc<Pacer>,
    full_text_max_chars: usize,
}

impl<F: Fetch, E: EnrichmentService> AdvancedScraper<F, E> {
    pub fn new(
        service: Arc<E>,
        policies: CrawlPolicyCache<F>,
        pacer: Arc<Pacer>,
        full_text_max_chars: usize,
    ) -> Self {
        Self {
            service,
            policies,
            pacer,
            full_text_max_chars,
        }
    }

    pub fn has_credential(&self) -> bool {
        self.service.has_credential()
    }

    /// Attempt to enrich `record` in place.
    #[instrument(level = "info", skip_all, fields(url = %record.url, rank = ?record.rank))]
    pub async fn enrich_record(&self, record: &mut ArticleRecord) -> Tier2Outcome {
        if !self.policies.allows(&record.url).await {
            info!("Crawl policy disallows path; keeping tier-1 record");
            return Tier2Outcome::PolicyDenied;
        }

        self.pacer.await_turn().await;
        let enrichment = match self.service.enrich(&record.url).await {
            Ok(enrichment) => enrichment,
            Err(e) => {
                warn!(error = %e, "Enrichment failed; keeping tier-1 record");
                return Tier2Outcome::NoImprovement(e.to_string());
            }
        };

        if merge_enrichment(record, &enrichment, self.full_text_max_chars) {
            record.extraction_tier = ExtractionTier::Tier1And2;
            info!(
                has_thumbnail = record.thumbnail_url.is_some(),
                "Record enriched"
            );
            Tier2Outcome::Enriched
        } else {
            debug!("Enrichment returned no usable fields");
            Tier2Outcome::NoImprovement("empty response".to_string())
        }
    }
}

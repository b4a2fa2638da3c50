//! Tier-1 ("simple") extraction: one paced fetch per article, best effort.
//!
//! A scrape never fails. Whatever goes wrong (timeout, non-2xx, non-HTML
//! body) is recorded as a [`FailureReason`] next to a record that still
//! carries the URL and whatever the feed already knew.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::http::{Fetch, FetchedPage};
use crate::models::{ArticleOutcome, ArticleRecord, FailureReason, ResolvedLink};
use crate::pacing::Pacer;
use crate::scrapers::extract::{ExtractLimits, Page, PageExtract, extract_page};
use crate::utils::{brand_from_url, is_absolute_http_url, normalize_timestamp, truncate_for_log};

pub struct SimpleScraper<F> {
    fetcher: Arc<F>,
    pacer: Arc<Pacer>,
    timeout: Duration,
    limits: ExtractLimits,
}

impl<F: Fetch> SimpleScraper<F> {
    pub fn new(fetcher: Arc<F>, pacer: Arc<Pacer>, timeout: Duration, limits: ExtractLimits) -> Self {
        Self {
            fetcher,
            pacer,
            timeout,
            limits,
        }
    }

    /// Fetch and extract one article.
    #[instrument(level = "info", skip_all, fields(url = %link.url))]
    pub async fn scrape(&self, link: &ResolvedLink) -> ArticleOutcome {
        let mut record = ArticleRecord::from_link(link);
        if record.source.is_none() {
            record.source = brand_from_url(&link.url);
        }

        if !is_absolute_http_url(&link.url) {
            return partial(record, link, FailureReason::InvalidUrl);
        }

        self.pacer.await_turn().await;
        let page = match self
            .fetcher
            .get(&link.url, self.timeout)
            .await
            .and_then(FetchedPage::ensure_success)
        {
            Ok(page) => page,
            Err(e) => return partial(record, link, FailureReason::from(&e)),
        };

        if !page.is_html() {
            let content_type = page.content_type.unwrap_or_default();
            return partial(record, link, FailureReason::NotHtml { content_type });
        }

        let extracted = {
            let document = Page::parse(&page.body, &page.url);
            extract_page(&document, self.limits, record.source.as_deref())
        };
        apply_extract(&mut record, extracted, link, self.limits.full_text_max_chars);
        debug!(
            title = %truncate_for_log(record.title.as_deref().unwrap_or_default(), 80),
            has_thumbnail = record.thumbnail_url.is_some(),
            text_chars = record.full_text.as_ref().map_or(0, |t| t.chars().count()),
            "Tier-1 extraction complete"
        );
        ArticleOutcome::Complete(record)
    }
}

/// Fold page fields into a feed-seeded record.
///
/// Feed title and publication time win over page metadata; the page summary
/// wins over the feed snippet.
fn apply_extract(record: &mut ArticleRecord, extracted: PageExtract, link: &ResolvedLink, max_chars: usize) {
    ArticleRecord::fill(&mut record.title, extracted.title.as_deref());
    let published = extracted.published_at.as_deref().and_then(normalize_timestamp);
    ArticleRecord::fill(&mut record.published_at, published.as_deref());
    ArticleRecord::overwrite(&mut record.summary, extracted.summary.as_deref());
    ArticleRecord::fill(&mut record.summary, link.candidate.snippet.as_deref());
    if let Some(text) = extracted.full_text.as_deref() {
        record.set_full_text(text, max_chars);
    }
    if let Some(thumb) = extracted.thumbnail_url.as_deref() {
        record.set_thumbnail(thumb);
    }
}

fn partial(mut record: ArticleRecord, link: &ResolvedLink, reason: FailureReason) -> ArticleOutcome {
    warn!(url = %record.url, %reason, "Tier-1 extraction incomplete");
    ArticleRecord::fill(&mut record.summary, link.candidate.snippet.as_deref());
    ArticleOutcome::Partial { record, reason }
}

//! Per-country orchestration.
//!
//! ```text
//! candidates ─▶ resolve ─▶ tier-1 ─▶ rank ─▶ gate (≤3) ─▶ tier-2 ─▶ CountryReport
//! ```
//!
//! Articles are processed one at a time. Nothing that happens to a single
//! article can fail the country: every stage below returns a value, not an
//! error, and the report collects the reasons for partial records.

use itertools::Itertools;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::gate::EnrichmentGate;
use crate::http::Fetch;
use crate::models::{ArticleFailure, ArticleRecord, CandidateLink, CountryReport, ExtractionTier};
use crate::ranking::{ImpactRanker, assign_ranks, impact_order};
use crate::resolver::LinkResolver;
use crate::scrapers::advanced::{AdvancedScraper, EnrichmentService, Tier2Outcome};
use crate::scrapers::simple::SimpleScraper;

/// Cooperative stop flag, checked between articles and between countries.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct CountryPipeline<F, E, R> {
    resolver: LinkResolver<F>,
    tier1: SimpleScraper<F>,
    ranker: R,
    gate: EnrichmentGate,
    tier2: AdvancedScraper<F, E>,
}

impl<F, E, R> CountryPipeline<F, E, R>
where
    F: Fetch,
    E: EnrichmentService,
    R: ImpactRanker,
{
    pub fn new(
        resolver: LinkResolver<F>,
        tier1: SimpleScraper<F>,
        ranker: R,
        gate: EnrichmentGate,
        tier2: AdvancedScraper<F, E>,
    ) -> Self {
        Self {
            resolver,
            tier1,
            ranker,
            gate,
            tier2,
        }
    }

    /// Turn one country's candidate links into its final evidence set.
    ///
    /// The returned articles list the ranked records first, in rank order,
    /// followed by the unranked ones in tier-1 order. When `abort` fires
    /// during tier-1, the records finished so far are returned unranked.
    #[instrument(level = "info", skip_all, fields(country = %country, candidates = candidates.len()))]
    pub async fn run_country(
        &self,
        country: &str,
        candidates: Vec<CandidateLink>,
        run_date: &str,
        abort: &AbortSignal,
    ) -> CountryReport {
        let start = Instant::now();
        let mut report = CountryReport::empty(country, run_date);

        let candidates: Vec<CandidateLink> = candidates
            .into_iter()
            .unique_by(|c| c.url.clone())
            .collect();
        if candidates.is_empty() {
            info!("No candidate links; empty evidence set");
            return report;
        }

        let mut records: Vec<ArticleRecord> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if abort.is_aborted() {
                warn!(finished = records.len(), "Abort requested during tier-1");
                report.aborted = true;
                report.articles = records;
                return report;
            }

            let link = self.resolver.resolve(candidate).await;
            // Two wrappers can point at the same article.
            if records.iter().any(|r| r.url == link.url) {
                debug!(url = %link.url, "Duplicate after resolution; skipping");
                continue;
            }

            let outcome = self.tier1.scrape(&link).await;
            if let Some(reason) = outcome.reason() {
                warn!(url = %link.url, %reason, "Tier-1 produced a partial record");
                report.failures.push(ArticleFailure {
                    url: link.url.clone(),
                    reason: reason.clone(),
                });
            }
            records.push(outcome.into_record());
        }

        let scores = match self.ranker.rank(country, &records).await {
            Ok(scores) => scores,
            Err(e) => {
                warn!(error = %e, "Ranking failed; keeping tier-1 order");
                Vec::new()
            }
        };
        let order = impact_order(&records, &scores);
        assign_ranks(&mut records, &order, &scores);

        for index in self.gate.select(&records, self.tier2.has_credential()) {
            if abort.is_aborted() {
                warn!("Abort requested during tier-2");
                report.aborted = true;
                break;
            }
            if self.tier2.enrich_record(&mut records[index]).await != Tier2Outcome::PolicyDenied {
                report.tier2_attempts += 1;
            }
        }

        report.articles = final_order(records);
        info!(
            articles = report.articles.len(),
            partial = report.failures.len(),
            tier2_attempts = report.tier2_attempts,
            enriched = report
                .articles
                .iter()
                .filter(|a| a.extraction_tier == ExtractionTier::Tier1And2)
                .count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Country finished"
        );
        report
    }
}

/// Ranked records first by rank, the rest keep their tier-1 order.
fn final_order(mut records: Vec<ArticleRecord>) -> Vec<ArticleRecord> {
    records.sort_by_key(|r| r.rank.unwrap_or(u8::MAX));
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::AllowList;
    use crate::models::FailureReason;
    use crate::pacing::Pacer;
    use crate::ranking::{ImpactScore, RankError};
    use crate::scrapers::advanced::Enrichment;
    use crate::scrapers::extract::ExtractLimits;
    use crate::scrapers::robots::CrawlPolicyCache;
    use crate::testing::{ALLOW_ALL_ROBOTS, FakeEnrichment, FakeFetcher};
    use std::time::Duration;

    const REUTERS_A: &str = "https://www.reuters.com/world/africa/a";
    const REUTERS_C: &str = "https://www.reuters.com/markets/c";
    const DAWN_B: &str = "https://www.dawn.com/news/b";
    const BBC_D: &str = "https://www.bbc.com/news/d";
    const LEAD_IMAGE: &str = "https://cdn.reuters.com/lead.jpg";

    /// Scores records by position; `None` simulates an unavailable collaborator.
    struct ScriptedRanker {
        impacts: Option<Vec<f64>>,
        abort_on_rank: Option<AbortSignal>,
    }

    impl ScriptedRanker {
        fn impacts(impacts: &[f64]) -> Self {
            Self {
                impacts: Some(impacts.to_vec()),
                abort_on_rank: None,
            }
        }
    }

    impl ImpactRanker for ScriptedRanker {
        async fn rank(&self, _country: &str, _records: &[ArticleRecord]) -> Result<Vec<ImpactScore>, RankError> {
            if let Some(signal) = &self.abort_on_rank {
                signal.abort();
            }
            let impacts = self
                .impacts
                .as_ref()
                .ok_or_else(|| RankError::Unavailable("offline".to_string()))?;
            Ok(impacts
                .iter()
                .enumerate()
                .map(|(index, &impact)| ImpactScore {
                    index,
                    impact,
                    topic: None,
                })
                .collect())
        }
    }

    fn article_page(title: &str) -> String {
        format!(
            "<html><head><title>{title}</title></head><body><article>\
             <p>Officials met on Tuesday to discuss the new budget and the outlook for growth.</p>\
             </article></body></html>"
        )
    }

    fn candidate(url: &str, title: &str) -> CandidateLink {
        let mut candidate = CandidateLink::new(url);
        candidate.title = Some(title.to_string());
        candidate
    }

    fn candidates() -> Vec<CandidateLink> {
        vec![
            candidate(REUTERS_A, "Central bank holds rates"),
            candidate(DAWN_B, "Budget passes parliament"),
            candidate(REUTERS_C, "Currency slides"),
        ]
    }

    fn publisher_fetcher() -> FakeFetcher {
        FakeFetcher::new()
            .html(REUTERS_A, &article_page("A"))
            .html(DAWN_B, &article_page("B"))
            .html(REUTERS_C, &article_page("C"))
            .html(BBC_D, &article_page("D"))
            .html("https://www.reuters.com/robots.txt", ALLOW_ALL_ROBOTS)
    }

    fn build_pipeline<R: ImpactRanker>(
        fetcher: FakeFetcher,
        service: FakeEnrichment,
        ranker: R,
    ) -> (
        Arc<FakeFetcher>,
        Arc<FakeEnrichment>,
        CountryPipeline<FakeFetcher, FakeEnrichment, R>,
    ) {
        let fetcher = Arc::new(fetcher);
        let service = Arc::new(service);
        let pacer = Arc::new(Pacer::unpaced());
        let timeout = Duration::from_secs(5);
        let limits = ExtractLimits {
            full_text_max_chars: 500,
            summary_max_words: 160,
        };
        let policies = CrawlPolicyCache::new(Arc::clone(&fetcher), Arc::clone(&pacer), "riskfeed", timeout);
        let pipeline = CountryPipeline::new(
            LinkResolver::new(Arc::clone(&fetcher), Arc::clone(&pacer), timeout),
            SimpleScraper::new(Arc::clone(&fetcher), Arc::clone(&pacer), timeout, limits),
            ranker,
            EnrichmentGate::new(AllowList::default(), false),
            AdvancedScraper::new(Arc::clone(&service), policies, pacer, limits.full_text_max_chars),
        );
        (fetcher, service, pipeline)
    }

    fn thumbnail_enrichment() -> Enrichment {
        Enrichment {
            thumbnail_url: Some(LEAD_IMAGE.to_string()),
            ..Enrichment::default()
        }
    }

    fn find<'a>(report: &'a CountryReport, url: &str) -> &'a ArticleRecord {
        report.articles.iter().find(|a| a.url == url).unwrap()
    }

    #[tokio::test]
    async fn test_allow_listed_top_article_is_enriched() {
        let (_, service, pipeline) = build_pipeline(
            publisher_fetcher(),
            FakeEnrichment::with_credential().respond(REUTERS_A, thumbnail_enrichment()),
            ScriptedRanker::impacts(&[0.9, 0.5, 0.1]),
        );
        let report = pipeline
            .run_country("Pakistan", candidates(), "2025-06-01", &AbortSignal::new())
            .await;

        let top = &report.articles[0];
        assert_eq!(top.url, REUTERS_A);
        assert_eq!(top.rank, Some(1));
        assert_eq!(top.extraction_tier, ExtractionTier::Tier1And2);
        assert_eq!(top.thumbnail_url.as_deref(), Some(LEAD_IMAGE));
        // REUTERS_C is rank 3 and allow-listed too, but returns nothing new.
        assert_eq!(find(&report, REUTERS_C).extraction_tier, ExtractionTier::Tier1);
        assert_eq!(service.call_count(), 2);
        assert_eq!(report.tier2_attempts, 2);
        assert!(!report.aborted);
    }

    #[tokio::test]
    async fn test_non_allow_listed_top_article_stays_tier1() {
        let (_, service, pipeline) = build_pipeline(
            publisher_fetcher(),
            FakeEnrichment::with_credential().respond(DAWN_B, thumbnail_enrichment()),
            ScriptedRanker::impacts(&[0.1, 0.9, 0.2]),
        );
        let report = pipeline
            .run_country("Pakistan", candidates(), "2025-06-01", &AbortSignal::new())
            .await;

        let top = &report.articles[0];
        assert_eq!(top.url, DAWN_B);
        assert_eq!(top.rank, Some(1));
        assert_eq!(top.extraction_tier, ExtractionTier::Tier1);
        assert_eq!(top.thumbnail_url, None);
        // Only the two Reuters records were sent.
        assert_eq!(service.call_count(), 2);
    }

    #[tokio::test]
    async fn test_no_credential_means_no_tier2_calls() {
        let (fetcher, service, pipeline) = build_pipeline(
            publisher_fetcher(),
            FakeEnrichment::without_credential(),
            ScriptedRanker::impacts(&[0.9, 0.5, 0.1]),
        );
        let report = pipeline
            .run_country("Pakistan", candidates(), "2025-06-01", &AbortSignal::new())
            .await;

        assert_eq!(service.call_count(), 0);
        assert_eq!(report.tier2_attempts, 0);
        assert_eq!(fetcher.call_count("https://www.reuters.com/robots.txt"), 0);
        assert!(
            report
                .articles
                .iter()
                .all(|a| a.extraction_tier == ExtractionTier::Tier1)
        );
    }

    #[tokio::test]
    async fn test_policy_denied_keeps_tier1() {
        let fetcher = publisher_fetcher().html(
            "https://www.reuters.com/robots.txt",
            "User-agent: *\nDisallow: /world/\n",
        );
        let (_, service, pipeline) = build_pipeline(
            fetcher,
            FakeEnrichment::with_credential().respond(REUTERS_A, thumbnail_enrichment()),
            ScriptedRanker::impacts(&[0.9, 0.5, 0.1]),
        );
        let report = pipeline
            .run_country("Pakistan", candidates(), "2025-06-01", &AbortSignal::new())
            .await;

        let top = find(&report, REUTERS_A);
        assert_eq!(top.rank, Some(1));
        assert_eq!(top.extraction_tier, ExtractionTier::Tier1);
        assert_eq!(top.thumbnail_url, None);
        // Only REUTERS_C (under /markets/) reached the service.
        assert_eq!(service.call_count(), 1);
        assert_eq!(report.tier2_attempts, 1);
    }

    #[tokio::test]
    async fn test_zero_candidates_yield_empty_report() {
        let (fetcher, service, pipeline) = build_pipeline(
            FakeFetcher::new(),
            FakeEnrichment::with_credential(),
            ScriptedRanker::impacts(&[]),
        );
        let report = pipeline
            .run_country("Tuvalu", Vec::new(), "2025-06-01", &AbortSignal::new())
            .await;
        assert!(report.articles.is_empty());
        assert!(report.failures.is_empty());
        assert!(fetcher.calls().is_empty());
        assert_eq!(service.call_count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_is_isolated_to_one_article() {
        let fetcher = publisher_fetcher().timeout(DAWN_B);
        let (_, _, pipeline) = build_pipeline(
            fetcher,
            FakeEnrichment::without_credential(),
            ScriptedRanker::impacts(&[0.3, 0.2, 0.1]),
        );
        let report = pipeline
            .run_country("Pakistan", candidates(), "2025-06-01", &AbortSignal::new())
            .await;

        assert_eq!(report.articles.len(), 3);
        assert_eq!(
            report.failures,
            vec![ArticleFailure {
                url: DAWN_B.to_string(),
                reason: FailureReason::Timeout,
            }]
        );
        let partial = find(&report, DAWN_B);
        assert_eq!(partial.title.as_deref(), Some("Budget passes parliament"));
        assert_eq!(partial.full_text, None);
        assert!(find(&report, REUTERS_C).full_text.is_some());
    }

    #[tokio::test]
    async fn test_at_most_three_ranks_and_final_order() {
        let mut links = candidates();
        links.push(candidate(BBC_D, "Election called"));
        links.push(candidate(REUTERS_A, "Duplicate feed entry"));
        let (fetcher, _, pipeline) = build_pipeline(
            publisher_fetcher(),
            FakeEnrichment::without_credential(),
            ScriptedRanker::impacts(&[0.1, 0.9, 0.5, 0.7]),
        );
        let report = pipeline
            .run_country("Pakistan", links, "2025-06-01", &AbortSignal::new())
            .await;

        let order: Vec<&str> = report.articles.iter().map(|a| a.url.as_str()).collect();
        assert_eq!(order, vec![DAWN_B, BBC_D, REUTERS_C, REUTERS_A]);
        let ranks: Vec<Option<u8>> = report.articles.iter().map(|a| a.rank).collect();
        assert_eq!(ranks, vec![Some(1), Some(2), Some(3), None]);
        assert_eq!(fetcher.call_count(REUTERS_A), 1);
        assert!(
            report
                .articles
                .iter()
                .all(|a| a.full_text.as_deref().is_none_or(|t| t.chars().count() <= 500))
        );
    }

    #[tokio::test]
    async fn test_ranker_failure_keeps_tier1_order() {
        let ranker = ScriptedRanker {
            impacts: None,
            abort_on_rank: None,
        };
        let (_, _, pipeline) = build_pipeline(publisher_fetcher(), FakeEnrichment::without_credential(), ranker);
        let report = pipeline
            .run_country("Pakistan", candidates(), "2025-06-01", &AbortSignal::new())
            .await;
        let order: Vec<&str> = report.articles.iter().map(|a| a.url.as_str()).collect();
        assert_eq!(order, vec![REUTERS_A, DAWN_B, REUTERS_C]);
        assert_eq!(report.articles[0].rank, Some(1));
    }

    #[tokio::test]
    async fn test_abort_before_start_returns_nothing() {
        let abort = AbortSignal::new();
        abort.abort();
        let (fetcher, _, pipeline) = build_pipeline(
            publisher_fetcher(),
            FakeEnrichment::with_credential(),
            ScriptedRanker::impacts(&[0.9]),
        );
        let report = pipeline.run_country("Pakistan", candidates(), "2025-06-01", &abort).await;
        assert!(report.aborted);
        assert!(report.articles.is_empty());
        assert!(fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_abort_after_first_article_keeps_finished_records() {
        let abort = AbortSignal::new();
        let (fetcher, service, pipeline) = build_pipeline(
            publisher_fetcher().abort_after(REUTERS_A, abort.clone()),
            FakeEnrichment::with_credential().respond(REUTERS_A, thumbnail_enrichment()),
            ScriptedRanker::impacts(&[0.9, 0.5, 0.1]),
        );
        let report = pipeline.run_country("Pakistan", candidates(), "2025-06-01", &abort).await;
        assert!(report.aborted);
        assert_eq!(report.articles.len(), 1);
        assert_eq!(report.articles[0].url, REUTERS_A);
        assert!(report.articles.iter().all(|a| a.rank.is_none()));
        assert!(report.failures.is_empty());
        assert_eq!(fetcher.calls(), vec![REUTERS_A.to_string()]);
        assert_eq!(service.call_count(), 0);
        assert_eq!(report.tier2_attempts, 0);
    }

    #[tokio::test]
    async fn test_abort_before_tier2_keeps_finalized_records() {
        let abort = AbortSignal::new();
        let ranker = ScriptedRanker {
            impacts: Some(vec![0.9, 0.5, 0.1]),
            abort_on_rank: Some(abort.clone()),
        };
        let (_, service, pipeline) = build_pipeline(
            publisher_fetcher(),
            FakeEnrichment::with_credential().respond(REUTERS_A, thumbnail_enrichment()),
            ranker,
        );
        let report = pipeline.run_country("Pakistan", candidates(), "2025-06-01", &abort).await;
        assert!(report.aborted);
        assert_eq!(report.articles.len(), 3);
        assert_eq!(service.call_count(), 0);
        assert_eq!(report.articles[0].extraction_tier, ExtractionTier::Tier1);
    }
}

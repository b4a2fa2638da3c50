//! Impact ranking seam.
//!
//! The enrichment gate depends on an impact ordering over a country's tier-1
//! records. That ordering normally comes from an external scoring model; this
//! module defines the seam ([`ImpactRanker`]), a deterministic keyword
//! heuristic used when no model is wired in ([`KeywordRanker`]), and the
//! pure functions that turn scores into ranks.

use chrono::{DateTime, NaiveDate, Utc};
use std::cmp::Ordering;
use std::collections::HashSet;
use thiserror::Error;

use crate::gate::MAX_ENRICHED;
use crate::models::ArticleRecord;

/// Impact assigned to one tier-1 record, identified by its position.
#[derive(Debug, Clone, PartialEq)]
pub struct ImpactScore {
    pub index: usize,
    /// Higher is more consequential. Usually within `0.0..=1.0`.
    pub impact: f64,
    /// Story cluster; records in the same topic compete for one slot.
    pub topic: Option<String>,
}

#[derive(Debug, Error)]
pub enum RankError {
    #[error("ranking collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("malformed ranking response: {0}")]
    Malformed(String),
}

/// Trait for the collaborator that scores a country's tier-1 records.
pub trait ImpactRanker {
    async fn rank(&self, country: &str, records: &[ArticleRecord]) -> Result<Vec<ImpactScore>, RankError>;
}

const HIGH_KEYWORDS: &[&str] = &[
    "government", "ministry", "parliament", "president", "prime minister",
    "central bank", "interest rate", "monetary policy", "inflation", "gdp",
    "election", "cabinet", "policy", "budget", "fiscal", "trade",
    "military", "defense", "conflict", "sanctions", "war", "coup", "security",
];

const MEDIUM_KEYWORDS: &[&str] = &[
    "economy", "economic", "finance", "currency", "debt", "growth",
    "minister", "official", "regulation", "law", "reform",
];

const NOISE_KEYWORDS: &[&str] = &[
    "sport", "football", "soccer", "basketball", "tennis", "cricket",
    "music", "entertainment", "celebrity", "festival", "award",
    "movie", "film", "actor", "singer", "concert",
];

/// Keyword relevance of a headline and summary to country risk, in `[0, 1]`.
///
/// Articles that never mention the country score 0.1. Otherwise the score
/// starts at 0.3 and moves with keyword hits:
///
/// | Signal | Effect |
/// |--------|--------|
/// | high-risk keyword | +0.15 each, at most +0.5 |
/// | medium keyword | +0.08 each, at most +0.2 |
/// | noise keyword (sport, culture) | -0.2 each |
/// | high-risk keyword in the title | +0.15 once |
pub fn keyword_relevance(title: &str, summary: &str, country: &str) -> f64 {
    let title = title.to_lowercase();
    let text = format!("{} {}", title, summary.to_lowercase());
    if !text.contains(&country.trim().to_lowercase()) {
        return 0.1;
    }

    let hits = |keywords: &[&str]| keywords.iter().filter(|kw| text.contains(*kw)).count() as f64;
    let mut score = 0.3;
    score += (hits(HIGH_KEYWORDS) * 0.15).min(0.5);
    score += (hits(MEDIUM_KEYWORDS) * 0.08).min(0.2);
    score -= hits(NOISE_KEYWORDS) * 0.2;
    if HIGH_KEYWORDS.iter().any(|kw| title.contains(kw)) {
        score += 0.15;
    }
    score.clamp(0.0, 1.0)
}

/// Deterministic [`ImpactRanker`] based on [`keyword_relevance`].
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordRanker;

impl ImpactRanker for KeywordRanker {
    async fn rank(&self, country: &str, records: &[ArticleRecord]) -> Result<Vec<ImpactScore>, RankError> {
        Ok(records
            .iter()
            .enumerate()
            .map(|(index, r)| ImpactScore {
                index,
                impact: keyword_relevance(
                    r.title.as_deref().unwrap_or_default(),
                    r.summary.as_deref().unwrap_or_default(),
                    country,
                ),
                topic: None,
            })
            .collect())
    }
}

fn recency(record: &ArticleRecord) -> Option<DateTime<Utc>> {
    let raw = record.published_at.as_deref()?.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let day = raw.get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn by_impact_desc(a: &ImpactScore, b: &ImpactScore) -> Ordering {
    b.impact.total_cmp(&a.impact)
}

/// Order record indices by descending impact.
///
/// When the scores carry topics, the best record of each topic (highest
/// impact, then most recent) comes first, ordered by impact. Remaining
/// scored records follow by impact, then unscored records in their original
/// order. Ties keep the original order. Scores pointing outside `records`
/// and repeated indices are ignored.
pub fn impact_order(records: &[ArticleRecord], scores: &[ImpactScore]) -> Vec<usize> {
    let mut seen = HashSet::new();
    let mut valid: Vec<&ImpactScore> = scores
        .iter()
        .filter(|s| s.index < records.len() && s.impact.is_finite())
        .filter(|s| seen.insert(s.index))
        .collect();
    valid.sort_by(|a, b| by_impact_desc(a, b));

    let mut order = Vec::with_capacity(records.len());

    // One representative per topic.
    let mut representatives: Vec<(&str, &ImpactScore)> = Vec::new();
    for score in valid.iter().copied() {
        let Some(topic) = score.topic.as_deref() else {
            continue;
        };
        match representatives.iter_mut().find(|(t, _)| *t == topic) {
            Some((_, best)) => {
                let better = score.impact == best.impact
                    && recency(&records[score.index]) > recency(&records[best.index]);
                if better {
                    *best = score;
                }
            }
            None => representatives.push((topic, score)),
        }
    }
    representatives.sort_by(|(_, a), (_, b)| by_impact_desc(a, b));
    order.extend(representatives.iter().map(|(_, s)| s.index));

    for score in &valid {
        if !order.contains(&score.index) {
            order.push(score.index);
        }
    }
    for index in 0..records.len() {
        if !order.contains(&index) {
            order.push(index);
        }
    }
    order
}

/// Write ranks 1..=3 and impacts onto the first records of `order`.
/// Every other record is left unranked.
pub fn assign_ranks(records: &mut [ArticleRecord], order: &[usize], scores: &[ImpactScore]) {
    for record in records.iter_mut() {
        record.rank = None;
        record.impact = None;
    }
    for (position, &index) in order.iter().take(MAX_ENRICHED).enumerate() {
        let Some(record) = records.get_mut(index) else {
            continue;
        };
        record.rank = Some(position as u8 + 1);
        record.impact = scores.iter().find(|s| s.index == index).map(|s| s.impact);
    }
}

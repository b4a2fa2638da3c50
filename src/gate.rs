//! Enrichment gate: which ranked records may go through tier-2.
//!
//! A record is eligible only when every condition holds:
//!
//! 1. it carries a rank (1..=3)
//! 2. its publisher is on the allow-list
//! 3. an enrichment credential is configured for the run
//!
//! The crawl-policy check happens later, per record, inside tier-2 itself.
//! Without a credential the gate returns immediately and selects nothing.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::models::ArticleRecord;
use crate::utils::host_of;

/// Most records ever sent to tier-2 for one country.
pub const MAX_ENRICHED: usize = 3;

/// Premium outlets worth the cost of a rendering call.
pub const DEFAULT_ALLOW_LIST: &[&str] = &["reuters.com", "bloomberg.com"];

/// Publisher allow-list.
///
/// Entries containing a dot are domains and match the record's host or any
/// subdomain of it. Other entries match the source label, ignoring case.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct AllowList(Vec<String>);

impl From<Vec<String>> for AllowList {
    fn from(entries: Vec<String>) -> Self {
        Self::new(entries)
    }
}

impl From<AllowList> for Vec<String> {
    fn from(list: AllowList) -> Self {
        list.0
    }
}

impl Default for AllowList {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOW_LIST.iter().copied())
    }
}

impl AllowList {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            entries
                .into_iter()
                .map(|e| e.as_ref().trim().to_lowercase())
                .map(|e| e.strip_prefix("www.").map(str::to_string).unwrap_or(e))
                .filter(|e| !e.is_empty())
                .collect(),
        )
    }

    pub fn entries(&self) -> &[String] {
        &self.0
    }

    pub fn matches(&self, record: &ArticleRecord) -> bool {
        let host = host_of(&record.url);
        let source = record.source.as_deref().map(|s| s.trim().to_lowercase());
        self.0.iter().any(|entry| {
            if entry.contains('.') {
                host.as_deref()
                    .is_some_and(|h| h == entry || h.ends_with(&format!(".{entry}")))
            } else {
                source.as_deref() == Some(entry.as_str())
            }
        })
    }
}

/// Gate policy for one run.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentGate {
    pub allow_list: AllowList,
    /// Only enrich ranked records that still lack a thumbnail.
    pub only_missing_thumbnail: bool,
}

/// The eligibility rule for a single record.
pub fn should_enrich(rank: Option<u8>, allow_listed: bool, has_credential: bool) -> bool {
    has_credential && allow_listed && rank.is_some_and(|r| (1..=MAX_ENRICHED as u8).contains(&r))
}

impl EnrichmentGate {
    pub fn new(allow_list: AllowList, only_missing_thumbnail: bool) -> Self {
        Self {
            allow_list,
            only_missing_thumbnail,
        }
    }

    /// Indices of the records to send to tier-2, in rank order.
    #[instrument(level = "debug", skip_all, fields(records = records.len()))]
    pub fn select(&self, records: &[ArticleRecord], has_credential: bool) -> Vec<usize> {
        if !has_credential {
            debug!("No enrichment credential; tier-2 disabled");
            return Vec::new();
        }

        let mut selected: Vec<(u8, usize)> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| should_enrich(r.rank, self.allow_list.matches(r), has_credential))
            .filter(|(_, r)| !self.only_missing_thumbnail || r.thumbnail_url.is_none())
            .filter_map(|(i, r)| r.rank.map(|rank| (rank, i)))
            .collect();
        selected.sort_unstable();
        selected.truncate(MAX_ENRICHED);

        debug!(selected = selected.len(), "Enrichment gate decided");
        selected.into_iter().map(|(_, i)| i).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CandidateLink, ResolvedLink};

    fn record(url: &str, source: Option<&str>, rank: Option<u8>) -> ArticleRecord {
        let mut candidate = CandidateLink::new(url);
        candidate.source = source.map(str::to_string);
        let mut record = ArticleRecord::from_link(&ResolvedLink::passthrough(candidate));
        record.rank = rank;
        record
    }

    #[test]
    fn test_allow_list_matching() {
        let list = AllowList::new(["www.Reuters.com", "Financial Times"]);
        assert!(list.matches(&record("https://www.reuters.com/world/a", None, None)));
        assert!(list.matches(&record("https://uk.reuters.com/a", None, None)));
        assert!(!list.matches(&record("https://notreuters.com/a", None, None)));
        assert!(list.matches(&record("https://www.ft.com/a", Some("financial times"), None)));
        assert!(!list.matches(&record("https://www.ft.com/a", Some("FT"), None)));
    }

    #[test]
    fn test_should_enrich_truth_table() {
        assert!(should_enrich(Some(1), true, true));
        assert!(!should_enrich(None, true, true));
        assert!(!should_enrich(Some(2), false, true));
        assert!(!should_enrich(Some(3), true, false));
        assert!(!should_enrich(Some(4), true, true));
    }

    #[test]
    fn test_select_in_rank_order_skipping_non_allow_listed() {
        let records = vec![
            record("https://www.bloomberg.com/b", None, Some(3)),
            record("https://www.dawn.com/x", Some("Dawn"), Some(1)),
            record("https://www.reuters.com/a", None, Some(2)),
            record("https://www.reuters.com/unranked", None, None),
        ];
        let gate = EnrichmentGate::default();
        assert_eq!(gate.select(&records, true), vec![2, 0]);
        assert!(gate.select(&records, false).is_empty());
    }

    #[test]
    fn test_select_only_missing_thumbnail() {
        let mut with_thumb = record("https://www.reuters.com/a", None, Some(1));
        with_thumb.thumbnail_url = Some("https://cdn.reuters.com/a.jpg".to_string());
        let records = vec![with_thumb, record("https://www.reuters.com/b", None, Some(2))];
        let gate = EnrichmentGate::new(AllowList::default(), true);
        assert_eq!(gate.select(&records, true), vec![1]);
    }

    #[test]
    fn test_allow_list_deserializes_from_sequence() {
        let list: AllowList = serde_yaml::from_str("- reuters.com\n- AP News\n").unwrap();
        assert_eq!(list.entries(), &["reuters.com".to_string(), "ap news".to_string()]);
    }
}

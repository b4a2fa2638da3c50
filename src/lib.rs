//! # Country Risk News
//!
//! Headline acquisition and tiered enrichment for a per-country risk feed.
//! For each country a set of candidate news links is turned into clean,
//! structured article records (title, source, publish time, summary,
//! truncated body, thumbnail) ready for a scoring model.
//!
//! ## Architecture
//!
//! The pipeline runs one country at a time, one article at a time:
//! 1. **Discovery**: candidate links from the aggregator feed or a JSON file
//! 2. **Resolution**: aggregator wrapper links decoded to publisher URLs
//! 3. **Tier-1**: one paced fetch per article, ordered fallback extraction
//! 4. **Ranking**: impact order over the tier-1 records, top 3 get a rank
//! 5. **Gate**: ranked, allow-listed records when a credential is configured
//! 6. **Tier-2**: crawl-policy check, paid rendering call, monotonic merge
//! 7. **Output**: per-country JSON plus a run summary
//!
//! A single [`pacing::Pacer`] is shared by every stage that talks to the
//! network, so the whole run stays under third-party rate limits.

pub mod cli;
pub mod config;
pub mod discovery;
pub mod gate;
pub mod http;
pub mod models;
pub mod outputs;
pub mod pacing;
pub mod pipeline;
pub mod ranking;
pub mod resolver;
pub mod scrapers;
pub mod utils;

#[cfg(test)]
mod testing;

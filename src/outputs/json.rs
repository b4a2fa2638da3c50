//! JSON output for downstream consumers.
//!
//! Files are organized by run date, one file per country plus a run summary:
//! ```text
//! output_dir/
//! └── 2025-05-06/
//!     ├── cote-divoire.json
//!     └── _run.json
//! ```

use serde::Serialize;
use std::error::Error;
use tokio::fs;
use tracing::{error, info, instrument};

use crate::models::{ArticleFailure, CountryReport, ExtractionTier};
use crate::utils::slugify;

/// Name of the per-run summary file inside the date directory.
pub const RUN_SUMMARY_FILE: &str = "_run.json";

/// One line of the run summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountrySummary {
    pub country: String,
    pub articles: usize,
    pub ranked: usize,
    pub enriched: usize,
    pub tier2_attempts: usize,
    pub aborted: bool,
    /// Set when the country failed before any article was processed.
    pub error: Option<String>,
    pub failures: Vec<ArticleFailure>,
}

impl CountrySummary {
    pub fn from_report(report: &CountryReport) -> Self {
        Self {
            country: report.country.clone(),
            articles: report.articles.len(),
            ranked: report.top_articles().count(),
            enriched: report
                .articles
                .iter()
                .filter(|a| a.extraction_tier == ExtractionTier::Tier1And2)
                .count(),
            tier2_attempts: report.tier2_attempts,
            aborted: report.aborted,
            error: None,
            failures: report.failures.clone(),
        }
    }

    /// A country whose candidates could not be obtained at all.
    pub fn failed(country: &str, error: impl ToString) -> Self {
        Self {
            country: country.to_string(),
            articles: 0,
            ranked: 0,
            enriched: 0,
            tier2_attempts: 0,
            aborted: false,
            error: Some(error.to_string()),
            failures: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_date: String,
    pub started_at: String,
    pub elapsed_ms: u64,
    pub aborted: bool,
    pub countries: Vec<CountrySummary>,
}

fn date_dir(output_dir: &str, run_date: &str) -> String {
    format!("{}/{}", output_dir.trim_end_matches('/'), run_date)
}

async fn write_json<T: Serialize>(dir: &str, file_name: &str, value: &T) -> Result<String, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(value)?;

    if let Err(e) = fs::create_dir_all(dir).await {
        error!(%dir, error = %e, "Failed to create JSON dir");
        return Err(e.into());
    }

    let path = format!("{dir}/{file_name}");
    fs::write(&path, json).await?;
    Ok(path)
}

/// Write a [`CountryReport`] to `{output_dir}/{run_date}/{country-slug}.json`.
///
/// Returns the path written.
#[instrument(level = "info", skip_all, fields(country = %report.country, output_dir = %output_dir))]
pub async fn write_country_report(report: &CountryReport, output_dir: &str) -> Result<String, Box<dyn Error>> {
    let dir = date_dir(output_dir, &report.run_date);
    let file_name = format!("{}.json", slugify(&report.country));
    let path = write_json(&dir, &file_name, report).await?;
    info!(path = %path, articles = report.articles.len(), "Wrote country report");
    Ok(path)
}

/// Write the [`RunSummary`] to `{output_dir}/{run_date}/_run.json`.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir))]
pub async fn write_run_summary(summary: &RunSummary, output_dir: &str) -> Result<String, Box<dyn Error>> {
    let dir = date_dir(output_dir, &summary.run_date);
    let path = write_json(&dir, RUN_SUMMARY_FILE, summary).await?;
    info!(path = %path, countries = summary.countries.len(), "Wrote run summary");
    Ok(path)
}

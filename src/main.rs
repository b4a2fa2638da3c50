use chrono::{NaiveDate, Utc};
use clap::Parser;
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

use country_risk_news::cli::Cli;
use country_risk_news::config::{Settings, enrichment_credential};
use country_risk_news::discovery::{GoogleNewsDiscovery, load_candidates_file};
use country_risk_news::http::HttpClient;
use country_risk_news::models::CountryReport;
use country_risk_news::outputs::json::{CountrySummary, RunSummary, write_country_report, write_run_summary};
use country_risk_news::pacing::Pacer;
use country_risk_news::pipeline::{AbortSignal, CountryPipeline};
use country_risk_news::ranking::KeywordRanker;
use country_risk_news::resolver::LinkResolver;
use country_risk_news::scrapers::advanced::{AdvancedScraper, RenderingServiceClient};
use country_risk_news::scrapers::robots::CrawlPolicyCache;
use country_risk_news::scrapers::simple::SimpleScraper;
use country_risk_news::utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    let started_at = Utc::now();
    info!("country_risk_news starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(output_dir = %args.output_dir, countries = ?args.countries, "Parsed CLI arguments");

    // Early check: ensure output dir is writable
    if let Err(e) = ensure_writable_dir(&args.output_dir).await {
        error!(
            path = %args.output_dir,
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    // ---- Settings ----
    let settings = match args.config.as_deref() {
        Some(path) => Settings::load(Path::new(path)).await.inspect_err(|e| {
            error!(error = %e, "Failed to load settings");
        })?,
        None => Settings::default(),
    }
    .with_cli_overrides(&args);

    let run_date = match args.run_date.as_deref() {
        Some(date) => NaiveDate::parse_from_str(date, "%Y-%m-%d")?.to_string(),
        None => started_at.date_naive().to_string(),
    };

    // ---- Countries and candidates ----
    let mut offline = match args.candidates.as_deref() {
        Some(path) => Some(load_candidates_file(Path::new(path)).await?),
        None => None,
    };
    let countries: Vec<String> = match (&offline, args.countries.is_empty()) {
        (_, false) => args.countries.clone(),
        (Some(map), true) => map.keys().cloned().collect(),
        (None, true) => {
            error!("No countries to process; pass --country or --candidates");
            return Err("no countries given".into());
        }
    };

    let credential = enrichment_credential(&args);
    info!(
        %run_date,
        countries = countries.len(),
        offline = offline.is_some(),
        tier2_enabled = credential.is_some(),
        allow_list = ?settings.allow_list.entries(),
        "Run configured"
    );

    // ---- Wire the stages around one client and one pacer ----
    let fetcher = Arc::new(HttpClient::new(&settings.user_agent)?);
    let (min_delay, jitter) = settings.pacing();
    let pacer = Arc::new(Pacer::new(min_delay, jitter));

    let service = Arc::new(RenderingServiceClient::new(
        Arc::clone(&fetcher),
        credential,
        settings.rendering_options(),
    ));
    let policies = CrawlPolicyCache::new(
        Arc::clone(&fetcher),
        Arc::clone(&pacer),
        &settings.robots_agent,
        settings.robots_timeout(),
    );
    let pipeline = CountryPipeline::new(
        LinkResolver::new(Arc::clone(&fetcher), Arc::clone(&pacer), settings.resolver_timeout()),
        SimpleScraper::new(
            Arc::clone(&fetcher),
            Arc::clone(&pacer),
            settings.request_timeout(),
            settings.extract_limits(),
        ),
        KeywordRanker,
        settings.gate(),
        AdvancedScraper::new(service, policies, Arc::clone(&pacer), settings.full_text_max_chars),
    );
    let discovery = GoogleNewsDiscovery::new(Arc::clone(&fetcher), Arc::clone(&pacer), settings.discovery_options());

    // ---- Ctrl-C stops the run between articles ----
    let abort = AbortSignal::new();
    {
        let abort = abort.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received; finishing the current article");
                abort.abort();
            }
        });
    }

    // ---- Countries, one at a time ----
    let mut summaries = Vec::with_capacity(countries.len());
    for (i, country) in countries.iter().enumerate() {
        if abort.is_aborted() {
            warn!(skipped = countries.len() - i, "Abort requested; skipping remaining countries");
            break;
        }
        info!(index = i, country = %country, "Processing country");

        let (report, summary) = match offline.as_mut() {
            Some(map) => {
                let candidates = map.remove(country).unwrap_or_default();
                let report = pipeline.run_country(country, candidates, &run_date, &abort).await;
                let summary = CountrySummary::from_report(&report);
                (report, summary)
            }
            None => match discovery.discover(country).await {
                Ok(candidates) => {
                    let report = pipeline.run_country(country, candidates, &run_date, &abort).await;
                    let summary = CountrySummary::from_report(&report);
                    (report, summary)
                }
                Err(e) => {
                    error!(country = %country, error = %e, "Discovery failed; writing empty evidence set");
                    (
                        CountryReport::empty(country, &run_date),
                        CountrySummary::failed(country, e),
                    )
                }
            },
        };

        if let Err(e) = write_country_report(&report, &args.output_dir).await {
            error!(country = %country, error = %e, "Failed to write country report");
        }
        summaries.push(summary);
    }

    let elapsed = start_time.elapsed();
    let run_summary = RunSummary {
        run_date,
        started_at: started_at.to_rfc3339(),
        elapsed_ms: elapsed.as_millis() as u64,
        aborted: abort.is_aborted(),
        countries: summaries,
    };
    if let Err(e) = write_run_summary(&run_summary, &args.output_dir).await {
        error!(error = %e, "Failed to write run summary");
    }

    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        countries = run_summary.countries.len(),
        aborted = run_summary.aborted,
        "Execution complete"
    );

    Ok(())
}

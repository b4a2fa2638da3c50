//! Command-line interface definitions for the country risk news pipeline.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Every tuning flag is optional and overrides the matching value from the
//! YAML settings file, which in turn overrides the built-in defaults.

use clap::Parser;

/// Command-line arguments for one batch run.
///
/// # Examples
///
/// ```sh
/// # Live discovery for two countries
/// country_risk_news -o ./out --country Ghana,Kenya
///
/// # Offline run over a prepared candidates file, with tier-2 enabled
/// CRAWLBASE_JS_TOKEN=... country_risk_news -o ./out --candidates candidates.json
///
/// # Slower pacing and a custom settings file
/// country_risk_news -o ./out -c config.yaml --pacing-delay-ms 1000 --country Chile
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Output directory for per-country JSON reports
    #[arg(short, long)]
    pub output_dir: String,

    /// Optional path to config.yaml file
    #[arg(short, long)]
    pub config: Option<String>,

    /// JSON file mapping country -> candidate links (skips live discovery)
    #[arg(long)]
    pub candidates: Option<String>,

    /// Countries to process, in order (comma separated or repeated)
    #[arg(short = 'C', long = "country", value_delimiter = ',')]
    pub countries: Vec<String>,

    /// Enrichment service token; `CRAWLBASE_TOKEN` is used when this is unset
    #[arg(long, env = "CRAWLBASE_JS_TOKEN", hide_env_values = true)]
    pub enrichment_token: Option<String>,

    /// Run date (YYYY-MM-DD) used to key the outputs; defaults to today (UTC)
    #[arg(long)]
    pub run_date: Option<String>,

    /// Minimum delay between outbound requests, in milliseconds
    #[arg(long)]
    pub pacing_delay_ms: Option<u64>,

    /// Per-request timeout for publisher pages, in milliseconds
    #[arg(long)]
    pub request_timeout_ms: Option<u64>,

    /// Maximum characters of body text kept per article
    #[arg(long)]
    pub full_text_max_chars: Option<usize>,
}

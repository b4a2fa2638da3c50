//! Run settings: built-in defaults, an optional YAML file, then CLI flags.
//!
//! ```yaml
//! pacing_delay_ms: 500
//! full_text_max_chars: 12000
//! allow_list: [reuters.com, bloomberg.com, ft.com]
//! only_enrich_missing_thumbnail: true
//! ```
//!
//! Any field left out of the file keeps its default.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::cli::Cli;
use crate::discovery::DiscoveryOptions;
use crate::gate::{AllowList, EnrichmentGate};
use crate::http::DEFAULT_USER_AGENT;
use crate::scrapers::advanced::{DEFAULT_API_BASE, RenderingOptions};
use crate::scrapers::extract::ExtractLimits;

/// Token we identify as when reading crawl policies.
pub const DEFAULT_ROBOTS_AGENT: &str = "riskfeed";

/// Fallback environment variable for the enrichment credential.
pub const FALLBACK_TOKEN_ENV: &str = "CRAWLBASE_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Yaml {
        path: String,
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub user_agent: String,
    /// Product token matched against robots.txt `User-agent` groups.
    pub robots_agent: String,
    /// Timeout for publisher pages and discovery feeds.
    pub request_timeout_ms: u64,
    /// Timeout for each aggregator wrapper request.
    pub resolver_timeout_ms: u64,
    pub robots_timeout_ms: u64,
    pub enrichment_timeout_ms: u64,
    pub full_text_max_chars: usize,
    pub summary_max_words: usize,
    pub pacing_delay_ms: u64,
    pub pacing_jitter_ms: u64,
    pub allow_list: AllowList,
    pub enrichment_api_base: String,
    pub page_wait_ms: u64,
    pub ajax_wait_ms: u64,
    pub max_candidates: usize,
    pub only_enrich_missing_thumbnail: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            robots_agent: DEFAULT_ROBOTS_AGENT.to_string(),
            request_timeout_ms: 15_000,
            resolver_timeout_ms: 8_000,
            robots_timeout_ms: 3_000,
            enrichment_timeout_ms: 20_000,
            full_text_max_chars: 24_000,
            summary_max_words: 160,
            pacing_delay_ms: 250,
            pacing_jitter_ms: 250,
            allow_list: AllowList::default(),
            enrichment_api_base: DEFAULT_API_BASE.to_string(),
            page_wait_ms: 1_000,
            ajax_wait_ms: 300,
            max_candidates: 20,
            only_enrich_missing_thumbnail: false,
        }
    }
}

impl Settings {
    pub fn from_yaml(raw: &str, path: &str) -> Result<Self, ConfigError> {
        // An empty file deserializes to `null`, which means "all defaults".
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).map_err(|source| ConfigError::Yaml {
            path: path.to_string(),
            source,
        })
    }

    #[instrument(level = "debug")]
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: display.clone(),
                source,
            })?;
        let settings = Self::from_yaml(&raw, &display)?;
        debug!(?settings, "Loaded settings");
        Ok(settings)
    }

    /// Apply CLI overrides on top of the file values.
    pub fn with_cli_overrides(mut self, cli: &Cli) -> Self {
        if let Some(ms) = cli.pacing_delay_ms {
            self.pacing_delay_ms = ms;
        }
        if let Some(ms) = cli.request_timeout_ms {
            self.request_timeout_ms = ms;
        }
        if let Some(chars) = cli.full_text_max_chars {
            self.full_text_max_chars = chars;
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn resolver_timeout(&self) -> Duration {
        Duration::from_millis(self.resolver_timeout_ms)
    }

    pub fn robots_timeout(&self) -> Duration {
        Duration::from_millis(self.robots_timeout_ms)
    }

    pub fn pacing(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.pacing_delay_ms),
            Duration::from_millis(self.pacing_jitter_ms),
        )
    }

    pub fn extract_limits(&self) -> ExtractLimits {
        ExtractLimits {
            full_text_max_chars: self.full_text_max_chars,
            summary_max_words: self.summary_max_words,
        }
    }

    pub fn rendering_options(&self) -> RenderingOptions {
        RenderingOptions {
            api_base: self.enrichment_api_base.clone(),
            timeout: Duration::from_millis(self.enrichment_timeout_ms),
            page_wait_ms: self.page_wait_ms,
            ajax_wait_ms: self.ajax_wait_ms,
            limits: self.extract_limits(),
        }
    }

    pub fn discovery_options(&self) -> DiscoveryOptions {
        DiscoveryOptions {
            timeout: self.request_timeout(),
            max_candidates: self.max_candidates,
            ..DiscoveryOptions::default()
        }
    }

    pub fn gate(&self) -> EnrichmentGate {
        EnrichmentGate::new(self.allow_list.clone(), self.only_enrich_missing_thumbnail)
    }
}

/// The enrichment credential: the primary value if set, else the fallback.
/// Blank values count as unset.
pub fn pick_credential(primary: Option<String>, fallback: Option<String>) -> Option<String> {
    primary
        .filter(|t| !t.trim().is_empty())
        .or_else(|| fallback.filter(|t| !t.trim().is_empty()))
}

/// Resolve the credential from the CLI/`CRAWLBASE_JS_TOKEN`, then `CRAWLBASE_TOKEN`.
pub fn enrichment_credential(cli: &Cli) -> Option<String> {
    pick_credential(
        cli.enrichment_token.clone(),
        std::env::var(FALLBACK_TOKEN_ENV).ok(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "pacing_delay_ms: 900\nallow_list:\n  - www.FT.com\n";
        let settings = Settings::from_yaml(yaml, "test.yaml").unwrap();
        assert_eq!(settings.pacing_delay_ms, 900);
        assert_eq!(settings.allow_list.entries(), &["ft.com".to_string()]);
        assert_eq!(settings.full_text_max_chars, 24_000);
        assert_eq!(settings.summary_max_words, 160);
        assert_eq!(settings.enrichment_api_base, DEFAULT_API_BASE);
        assert_eq!(settings.robots_agent, DEFAULT_ROBOTS_AGENT);
    }

    #[test]
    fn test_empty_and_invalid_yaml() {
        assert_eq!(Settings::from_yaml("  \n", "e.yaml").unwrap(), Settings::default());
        assert!(matches!(
            Settings::from_yaml("pacing_delay_ms: [1, 2]", "bad.yaml"),
            Err(ConfigError::Yaml { .. })
        ));
    }

    #[test]
    fn test_cli_overrides_file_values() {
        let cli = Cli::parse_from([
            "country_risk_news",
            "-o",
            "out",
            "--pacing-delay-ms",
            "50",
            "--full-text-max-chars",
            "1000",
        ]);
        let settings = Settings::from_yaml("pacing_delay_ms: 900\nrequest_timeout_ms: 5000", "f")
            .unwrap()
            .with_cli_overrides(&cli);
        assert_eq!(settings.pacing_delay_ms, 50);
        assert_eq!(settings.full_text_max_chars, 1000);
        assert_eq!(settings.request_timeout(), Duration::from_secs(5));
        assert_eq!(settings.extract_limits().full_text_max_chars, 1000);
    }

    #[test]
    fn test_pick_credential() {
        assert_eq!(pick_credential(Some("a".into()), Some("b".into())).as_deref(), Some("a"));
        assert_eq!(pick_credential(Some(" ".into()), Some("b".into())).as_deref(), Some("b"));
        assert_eq!(pick_credential(None, Some(String::new())), None);
        assert_eq!(pick_credential(None, None), None);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = Settings::load(Path::new("/nonexistent/config.yaml")).await.unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}

//! Aggregator link resolution.
//!
//! Feed items point at `news.google.com` wrapper pages rather than at the
//! publisher. The resolver replaces a wrapper with the publisher URL, trying
//! in order:
//!
//! 1. a `url=` query parameter on the wrapper itself
//! 2. the wrapper page's `c-wiz[data-p]` payload, decoded through the
//!    aggregator's `batchexecute` endpoint
//! 3. a `<meta http-equiv="refresh">` target
//! 4. the first anchor leaving the aggregator
//!
//! Resolution never fails the pipeline: on any error the original URL is
//! kept and processing continues. Each wrapper costs at most one GET and one
//! POST, both paced, with no retries.

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::http::{Fetch, FetchError, FetchedPage};
use crate::models::{CandidateLink, ResolvedLink};
use crate::pacing::Pacer;
use crate::utils::is_absolute_http_url;

const AGGREGATOR_HOST: &str = "news.google.com";
const BATCH_EXECUTE_URL: &str = "https://news.google.com/_/DotsSplashUi/data/batchexecute";

static DATA_P: Lazy<Selector> = Lazy::new(|| Selector::parse("c-wiz[data-p]").unwrap());
static META_EQUIV: Lazy<Selector> = Lazy::new(|| Selector::parse("meta[http-equiv]").unwrap());
static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("malformed url: {0}")]
    Malformed(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("could not decode wrapper payload: {0}")]
    Decode(String),
    #[error("wrapper page has no publisher link")]
    NoTarget,
}

/// True when `url` is an aggregator redirect wrapper.
pub fn is_aggregator_wrapper(url: &Url) -> bool {
    url.host_str()
        .is_some_and(|h| h.eq_ignore_ascii_case(AGGREGATOR_HOST))
}

/// Publisher hints read from a wrapper page.
#[derive(Debug, Default, PartialEq, Eq)]
struct WrapperHints {
    data_p: Option<String>,
    refresh: Option<String>,
    anchor: Option<String>,
}

impl WrapperHints {
    fn parse(body: &str) -> Self {
        let document = Html::parse_document(body);
        let data_p = document
            .select(&DATA_P)
            .find_map(|el| el.value().attr("data-p"))
            .map(str::to_string);
        let refresh = document
            .select(&META_EQUIV)
            .filter(|el| {
                el.value()
                    .attr("http-equiv")
                    .is_some_and(|v| v.trim().eq_ignore_ascii_case("refresh"))
            })
            .filter_map(|el| el.value().attr("content"))
            .find_map(refresh_target);
        let anchor = document
            .select(&ANCHOR)
            .filter_map(|a| a.value().attr("href"))
            .find(|href| href.starts_with("http") && !href.contains(AGGREGATOR_HOST))
            .map(str::to_string);
        Self {
            data_p,
            refresh,
            anchor,
        }
    }
}

/// The URL in a meta-refresh `content` such as `0;url=https://...`.
fn refresh_target(content: &str) -> Option<String> {
    let at = content.to_ascii_lowercase().find("url=")?;
    let target = content[at + 4..].trim().trim_matches(['\'', '"']);
    target.starts_with("http").then(|| target.to_string())
}

/// Build the `f.req` form value for a wrapper's `data-p` attribute.
///
/// The attribute is JSON missing its opening bracket behind a `%.@.`
/// marker. The request carries all but the last six elements, followed by
/// the final two.
pub fn batch_request_payload(data_p: &str) -> Result<String, ResolveError> {
    let normalized = data_p.replacen("%.@.", "[\"garturlreq\",", 1);
    let parsed: Value =
        serde_json::from_str(&normalized).map_err(|e| ResolveError::Decode(e.to_string()))?;
    let items = parsed
        .as_array()
        .ok_or_else(|| ResolveError::Decode("data-p is not an array".to_string()))?;

    let n = items.len();
    let trimmed: Vec<Value> = items[..n.saturating_sub(6)]
        .iter()
        .chain(&items[n.saturating_sub(2)..])
        .cloned()
        .collect();
    let inner = serde_json::to_string(&trimmed).map_err(|e| ResolveError::Decode(e.to_string()))?;
    Ok(json!([[["Fbv4je", inner, "null", "generic"]]]).to_string())
}

/// Pull the publisher URL out of a `batchexecute` response.
///
/// The body starts with an anti-JSON prefix (`)]}'`), then one or more JSON
/// chunks. The first array's `[0][2]` is itself a JSON string whose second
/// element is the URL.
pub fn parse_batch_response(body: &str) -> Result<String, ResolveError> {
    let stripped = body.trim_start_matches(|c: char| ")]}'\n\r ".contains(c));
    let envelope = serde_json::Deserializer::from_str(stripped)
        .into_iter::<Value>()
        .filter_map(Result::ok)
        .find(Value::is_array)
        .ok_or_else(|| ResolveError::Decode("no JSON array in response".to_string()))?;

    let inner = envelope[0][2]
        .as_str()
        .ok_or_else(|| ResolveError::Decode("missing [0][2] payload".to_string()))?;
    let payload: Value =
        serde_json::from_str(inner).map_err(|e| ResolveError::Decode(e.to_string()))?;
    payload[1]
        .as_str()
        .filter(|u| u.starts_with("http"))
        .map(str::to_string)
        .ok_or_else(|| ResolveError::Decode("payload has no URL".to_string()))
}

pub struct LinkResolver<F> {
    fetcher: Arc<F>,
    pacer: Arc<Pacer>,
    timeout: Duration,
}

impl<F: Fetch> LinkResolver<F> {
    pub fn new(fetcher: Arc<F>, pacer: Arc<Pacer>, timeout: Duration) -> Self {
        Self {
            fetcher,
            pacer,
            timeout,
        }
    }

    /// Resolve one candidate, falling back to its original URL on any error.
    #[instrument(level = "debug", skip_all, fields(url = %candidate.url))]
    pub async fn resolve(&self, candidate: CandidateLink) -> ResolvedLink {
        let parsed = match Url::parse(candidate.url.trim()) {
            Ok(u) => u,
            Err(e) => {
                warn!(error = %e, "Malformed candidate URL; using as-is");
                return ResolvedLink::passthrough(candidate);
            }
        };
        if !is_aggregator_wrapper(&parsed) {
            return ResolvedLink::passthrough(candidate);
        }

        match self.unwrap(&parsed).await {
            Ok(target) => {
                info!(%target, "Resolved aggregator link");
                ResolvedLink {
                    candidate,
                    url: target,
                    resolved: true,
                }
            }
            Err(e) => {
                warn!(error = %e, "Link resolution failed; keeping wrapper URL");
                ResolvedLink::passthrough(candidate)
            }
        }
    }

    async fn unwrap(&self, wrapper: &Url) -> Result<String, ResolveError> {
        if let Some((_, target)) = wrapper.query_pairs().find(|(k, _)| k == "url") {
            if is_absolute_http_url(&target) {
                return Ok(target.into_owned());
            }
        }

        self.pacer.await_turn().await;
        let page = self
            .fetcher
            .get(wrapper.as_str(), self.timeout)
            .await
            .and_then(FetchedPage::ensure_success)?;
        let hints = WrapperHints::parse(&page.body);

        if let Some(data_p) = hints.data_p.as_deref() {
            match self.decode_payload(data_p).await {
                Ok(target) => return Ok(target),
                Err(e) => debug!(error = %e, "batchexecute decode failed; trying fallbacks"),
            }
        }
        hints
            .refresh
            .or(hints.anchor)
            .ok_or(ResolveError::NoTarget)
    }

    async fn decode_payload(&self, data_p: &str) -> Result<String, ResolveError> {
        let payload = batch_request_payload(data_p)?;
        self.pacer.await_turn().await;
        let response = self
            .fetcher
            .post_form(BATCH_EXECUTE_URL, &[("f.req", payload.as_str())], self.timeout)
            .await
            .and_then(FetchedPage::ensure_success)?;
        parse_batch_response(&response.body)
    }
}

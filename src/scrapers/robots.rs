//! Crawl-policy (robots.txt) checks for the enrichment tier.
//!
//! The enrichment service fetches pages on our behalf, so a page is only
//! sent to it when the publisher's robots.txt permits our user agent to
//! crawl the path. Policies are fetched once per host per run.
//!
//! Matching follows the usual robots conventions:
//! - the longest matching rule wins, and `Allow` wins ties
//! - `*` matches any run of characters, a trailing `$` anchors the end
//! - a group naming our agent replaces the wildcard (`*`) group entirely
//!
//! Fetch outcomes map to policies as follows:
//!
//! | Outcome | Policy |
//! |---------|--------|
//! | 2xx | parsed rules |
//! | 404 / 410 | allow all |
//! | other status, timeout, network error | deny all |

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::http::Fetch;
use crate::pacing::Pacer;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Rule {
    allow: bool,
    pattern: String,
}

/// Parsed rules that apply to one user agent on one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlPolicy {
    rules: Vec<Rule>,
    deny_all: bool,
}

impl CrawlPolicy {
    pub fn allow_all() -> Self {
        Self {
            rules: Vec::new(),
            deny_all: false,
        }
    }

    pub fn deny_all() -> Self {
        Self {
            rules: Vec::new(),
            deny_all: true,
        }
    }

    /// Parse a robots.txt body for `agent`, the product token we crawl as.
    ///
    /// Group lines match when their token equals ours, ignoring case and any
    /// `/version` suffix on either side.
    pub fn parse(content: &str, agent: &str) -> Self {
        let agent = product_token(agent);
        let mut wildcard = Vec::new();
        let mut specific = Vec::new();
        let mut found_specific = false;

        // Agents of the group being read, and whether its rules have started.
        let mut group_agents: Vec<String> = Vec::new();
        let mut in_rules = false;

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or_default().trim();
            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let directive = directive.trim().to_lowercase();
            let value = value.trim();

            match directive.as_str() {
                "user-agent" => {
                    if in_rules {
                        group_agents.clear();
                        in_rules = false;
                    }
                    group_agents.push(value.to_lowercase());
                }
                "allow" | "disallow" => {
                    in_rules = true;
                    // An empty Disallow permits everything; it adds no rule.
                    if value.is_empty() {
                        continue;
                    }
                    let rule = Rule {
                        allow: directive == "allow",
                        pattern: value.to_string(),
                    };
                    if group_agents.iter().any(|a| a != "*" && product_token(a) == agent) {
                        found_specific = true;
                        specific.push(rule);
                    } else if group_agents.iter().any(|a| a == "*") {
                        wildcard.push(rule);
                    }
                }
                _ => {}
            }
        }

        Self {
            rules: if found_specific { specific } else { wildcard },
            deny_all: false,
        }
    }

    /// Whether `path` (path plus optional query) may be crawled.
    pub fn is_allowed(&self, path: &str) -> bool {
        if self.deny_all {
            return false;
        }
        let mut longest_allow = None;
        let mut longest_disallow = None;
        for rule in &self.rules {
            if !pattern_matches(path, &rule.pattern) {
                continue;
            }
            let slot = if rule.allow {
                &mut longest_allow
            } else {
                &mut longest_disallow
            };
            *slot = Some(slot.unwrap_or(0).max(rule.pattern.len()));
        }
        match (longest_allow, longest_disallow) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(allow), Some(disallow)) => allow >= disallow,
        }
    }
}

/// Match a robots path pattern with `*` wildcards and an optional `$` anchor.
fn pattern_matches(path: &str, pattern: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(p) => (p, true),
        None => (pattern, false),
    };

    let parts: Vec<&str> = pattern.split('*').collect();
    let Some((first, rest)) = parts.split_first() else {
        return true;
    };
    if !path.starts_with(first) {
        return false;
    }
    let mut pos = first.len();
    for (i, part) in rest.iter().enumerate() {
        let is_last = i + 1 == rest.len();
        if part.is_empty() {
            if is_last && anchored {
                return true;
            }
            continue;
        }
        if is_last && anchored {
            return path.len() >= pos + part.len() && path.ends_with(part);
        }
        match path[pos..].find(part) {
            Some(found) => pos += found + part.len(),
            None => return false,
        }
    }
    !anchored || pos == path.len()
}

/// `RiskFeed/1.0` -> `riskfeed`.
fn product_token(agent: &str) -> String {
    agent
        .split('/')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

/// Per-run cache of crawl policies keyed by scheme and host.
pub struct CrawlPolicyCache<F> {
    fetcher: Arc<F>,
    pacer: Arc<Pacer>,
    agent: String,
    timeout: Duration,
    policies: Mutex<HashMap<String, CrawlPolicy>>,
}

impl<F: Fetch> CrawlPolicyCache<F> {
    pub fn new(fetcher: Arc<F>, pacer: Arc<Pacer>, agent: &str, timeout: Duration) -> Self {
        Self {
            fetcher,
            pacer,
            agent: agent.to_string(),
            timeout,
            policies: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the publisher's robots.txt permits crawling `url`.
    ///
    /// Unparseable URLs are never allowed.
    #[instrument(level = "debug", skip_all, fields(%url))]
    pub async fn allows(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };
        let origin = match parsed.port() {
            Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
            None => format!("{}://{}", parsed.scheme(), host),
        };
        let path = match parsed.query() {
            Some(q) => format!("{}?{}", parsed.path(), q),
            None => parsed.path().to_string(),
        };

        let mut policies = self.policies.lock().await;
        if let Some(policy) = policies.get(&origin) {
            return policy.is_allowed(&path);
        }
        let policy = self.fetch_policy(&origin).await;
        let allowed = policy.is_allowed(&path);
        policies.insert(origin, policy);
        allowed
    }

    async fn fetch_policy(&self, origin: &str) -> CrawlPolicy {
        let robots_url = format!("{origin}/robots.txt");
        self.pacer.await_turn().await;
        match self.fetcher.get(&robots_url, self.timeout).await {
            Ok(page) if page.is_success() => {
                debug!(%robots_url, "Parsed crawl policy");
                CrawlPolicy::parse(&page.body, &self.agent)
            }
            Ok(page) if matches!(page.status, 404 | 410) => CrawlPolicy::allow_all(),
            Ok(page) => {
                warn!(%robots_url, status = page.status, "robots.txt unavailable; denying");
                CrawlPolicy::deny_all()
            }
            Err(e) => {
                warn!(%robots_url, error = %e, "robots.txt fetch failed; denying");
                CrawlPolicy::deny_all()
            }
        }
    }
}

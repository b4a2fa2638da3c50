//! In-memory fakes for the network seams, shared by the unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::http::{Fetch, FetchError, FetchedPage};
use crate::pipeline::AbortSignal;
use crate::scrapers::advanced::{EnrichError, Enrichment, EnrichmentService};

#[derive(Debug, Clone)]
pub enum Route {
    Page(FetchedPage),
    Timeout,
    Network,
}

/// Serves canned responses by URL and records every request made.
#[derive(Debug, Default)]
pub struct FakeFetcher {
    gets: HashMap<String, Route>,
    posts: HashMap<String, Route>,
    calls: Mutex<Vec<String>>,
    /// Fired once the named URL has been fetched.
    abort_after: Option<(String, AbortSignal)>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn html(mut self, url: &str, body: &str) -> Self {
        self.gets
            .insert(url.to_string(), Route::Page(FetchedPage::html(url, body)));
        self
    }

    pub fn page(mut self, url: &str, page: FetchedPage) -> Self {
        self.gets.insert(url.to_string(), Route::Page(page));
        self
    }

    pub fn status(mut self, url: &str, status: u16) -> Self {
        let mut page = FetchedPage::html(url, "");
        page.status = status;
        self.gets.insert(url.to_string(), Route::Page(page));
        self
    }

    pub fn timeout(mut self, url: &str) -> Self {
        self.gets.insert(url.to_string(), Route::Timeout);
        self
    }

    pub fn network_error(mut self, url: &str) -> Self {
        self.gets.insert(url.to_string(), Route::Network);
        self
    }

    pub fn abort_after(mut self, url: &str, signal: AbortSignal) -> Self {
        self.abort_after = Some((url.to_string(), signal));
        self
    }

    pub fn post(mut self, url: &str, body: &str) -> Self {
        self.posts
            .insert(url.to_string(), Route::Page(FetchedPage::html(url, body)));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == url).count()
    }

    fn answer(route: Option<&Route>, url: &str, timeout: Duration) -> Result<FetchedPage, FetchError> {
        match route {
            Some(Route::Page(page)) => Ok(page.clone()),
            Some(Route::Timeout) => Err(FetchError::Timeout(timeout)),
            Some(Route::Network) => Err(FetchError::Network("connection reset".to_string())),
            None => Err(FetchError::Network(format!("no route for {url}"))),
        }
    }
}

impl Fetch for FakeFetcher {
    async fn get(&self, url: &str, timeout: Duration) -> Result<FetchedPage, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        if let Some((trigger, signal)) = &self.abort_after {
            if trigger == url {
                signal.abort();
            }
        }
        Self::answer(self.gets.get(url), url, timeout)
    }

    async fn post_form(
        &self,
        url: &str,
        _form: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<FetchedPage, FetchError> {
        self.calls.lock().unwrap().push(format!("POST {url}"));
        Self::answer(self.posts.get(url), url, timeout)
    }
}

/// Enrichment service returning canned results and counting calls.
#[derive(Debug, Default)]
pub struct FakeEnrichment {
    pub credential: bool,
    responses: HashMap<String, Enrichment>,
    failing: Vec<String>,
    calls: AtomicUsize,
}

impl FakeEnrichment {
    pub fn with_credential() -> Self {
        Self {
            credential: true,
            ..Self::default()
        }
    }

    pub fn without_credential() -> Self {
        Self::default()
    }

    pub fn respond(mut self, url: &str, enrichment: Enrichment) -> Self {
        self.responses.insert(url.to_string(), enrichment);
        self
    }

    pub fn fail(mut self, url: &str) -> Self {
        self.failing.push(url.to_string());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EnrichmentService for FakeEnrichment {
    fn has_credential(&self) -> bool {
        self.credential
    }

    async fn enrich(&self, url: &str) -> Result<Enrichment, EnrichError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.iter().any(|f| f == url) {
            return Err(EnrichError::Status(429));
        }
        Ok(self.responses.get(url).cloned().unwrap_or_default())
    }
}

/// A robots.txt that allows everything, for hosts the tests don't care about.
pub const ALLOW_ALL_ROBOTS: &str = "User-agent: *\nAllow: /\n";

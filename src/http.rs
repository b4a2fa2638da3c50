//! HTTP transport seam shared by every network stage.
//!
//! The pipeline never talks to `reqwest` directly. Stages are generic over the
//! [`Fetch`] trait so that resolution, scraping, crawl-policy lookups, and
//! enrichment calls can be exercised against in-memory pages in tests.
//!
//! - [`Fetch`]: core trait, one GET or form POST with a per-request timeout
//! - [`HttpClient`]: the `reqwest`-backed implementation used at runtime
//! - [`FetchedPage`]: status, final URL, content type, and decoded body
//!
//! Only textual bodies are read, and never past [`MAX_BODY_BYTES`].
//!
//! No retries happen at this layer; one call is one attempt.

use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::models::FailureReason;

/// Browser-like user agent; some publishers serve different markup otherwise.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36";

/// Bodies are truncated past this many bytes.
pub const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Content types whose body any stage reads: markup, plain text, feeds, JSON.
/// A missing header counts as textual.
fn is_textual(content_type: Option<&str>) -> bool {
    match content_type {
        None => true,
        Some(ct) => {
            let ct = ct.to_ascii_lowercase();
            ct.starts_with("text/") || ["html", "xml", "json"].iter().any(|t| ct.contains(t))
        }
    }
}

/// Append `chunk` to `buf` without growing past `cap`. Returns true once full.
fn append_capped(buf: &mut Vec<u8>, chunk: &[u8], cap: usize) -> bool {
    let room = cap.saturating_sub(buf.len());
    buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
    buf.len() >= cap
}

/// Errors raised by a single HTTP attempt.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    fn from_reqwest(e: reqwest::Error, timeout: Duration) -> Self {
        if e.is_timeout() {
            FetchError::Timeout(timeout)
        } else if e.is_builder() {
            FetchError::InvalidUrl(e.to_string())
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

impl From<&FetchError> for FailureReason {
    fn from(e: &FetchError) -> Self {
        match e {
            FetchError::Timeout(_) => FailureReason::Timeout,
            FetchError::Network(message) => FailureReason::Network {
                message: message.clone(),
            },
            FetchError::Status(status) => FailureReason::HttpStatus { status: *status },
            FetchError::InvalidUrl(_) => FailureReason::InvalidUrl,
        }
    }
}

/// A fully read HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    /// URL after redirects.
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl FetchedPage {
    /// A `200 OK` HTML page, mostly useful for tests.
    pub fn html(url: &str, body: &str) -> Self {
        Self {
            url: url.to_string(),
            status: 200,
            content_type: Some("text/html; charset=utf-8".to_string()),
            body: body.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Fail with [`FetchError::Status`] unless the status is 2xx.
    pub fn ensure_success(self) -> Result<Self, FetchError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(FetchError::Status(self.status))
        }
    }

    /// True when the content type is HTML, or absent (many servers omit it).
    pub fn is_html(&self) -> bool {
        match self.content_type.as_deref() {
            None => true,
            Some(ct) => {
                let ct = ct.to_ascii_lowercase();
                ct.contains("text/html") || ct.contains("application/xhtml")
            }
        }
    }
}

/// Trait for a single outbound HTTP attempt.
///
/// Implementors return the response for any status; callers decide which
/// statuses they accept.
pub trait Fetch {
    /// GET `url`, giving up after `timeout`.
    async fn get(&self, url: &str, timeout: Duration) -> Result<FetchedPage, FetchError>;

    /// POST `form` as `application/x-www-form-urlencoded` to `url`.
    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<FetchedPage, FetchError>;
}

/// `reqwest`-backed [`Fetch`] implementation with connection reuse.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    user_agent: String,
}

impl HttpClient {
    pub fn new(user_agent: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(Self {
            client,
            user_agent: user_agent.to_string(),
        })
    }

    /// Read status and headers, then at most [`MAX_BODY_BYTES`] of a textual body.
    /// Other content types come back with an empty body.
    async fn read(
        mut response: reqwest::Response,
        timeout: Duration,
    ) -> Result<FetchedPage, FetchError> {
        let status = response.status().as_u16();
        let url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if !is_textual(content_type.as_deref()) {
            debug!(%url, content_type = ?content_type, "Skipping non-text body");
            return Ok(FetchedPage {
                url,
                status,
                content_type,
                body: String::new(),
            });
        }

        let mut buf = Vec::with_capacity(
            response
                .content_length()
                .map_or(0, |n| (n as usize).min(MAX_BODY_BYTES)),
        );
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::from_reqwest(e, timeout))?
        {
            if append_capped(&mut buf, &chunk, MAX_BODY_BYTES) {
                warn!(%url, limit = MAX_BODY_BYTES, "Body truncated at size limit");
                break;
            }
        }
        let body = String::from_utf8_lossy(&buf).into_owned();
        Ok(FetchedPage {
            url,
            status,
            content_type,
            body,
        })
    }
}

impl Fetch for HttpClient {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn get(&self, url: &str, timeout: Duration) -> Result<FetchedPage, FetchError> {
        let t0 = Instant::now();
        let res = match self
            .client
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .timeout(timeout)
            .send()
            .await
        {
            Ok(response) => Self::read(response, timeout).await,
            Err(e) => Err(FetchError::from_reqwest(e, timeout)),
        };
        let dt = t0.elapsed();

        match &res {
            Ok(page) => debug!(
                status = page.status,
                bytes = page.body.len(),
                elapsed_ms = dt.as_millis() as u64,
                "GET completed"
            ),
            Err(e) => warn!(elapsed_ms = dt.as_millis() as u64, error = %e, "GET failed"),
        }
        res
    }

    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<FetchedPage, FetchError> {
        let t0 = Instant::now();
        let res = match self
            .client
            .post(url)
            .header(USER_AGENT, &self.user_agent)
            .form(form)
            .timeout(timeout)
            .send()
            .await
        {
            Ok(response) => Self::read(response, timeout).await,
            Err(e) => Err(FetchError::from_reqwest(e, timeout)),
        };
        let dt = t0.elapsed();

        if let Err(e) = &res {
            warn!(elapsed_ms = dt.as_millis() as u64, error = %e, "POST failed");
        }
        res
    }
}

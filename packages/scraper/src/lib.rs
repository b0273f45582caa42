#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Document fetching and HTML extraction for county tax-lien listings.
//!
//! Provides the [`Fetcher`] (one shared [`reqwest::Client`] with a
//! browser-like identity, a hard timeout, and retry on transient errors)
//! plus structural HTML helpers: table location and row extraction
//! ([`html_table`]) and block-text / anchor discovery ([`html_blocks`]).
//!
//! This crate knows nothing about jurisdictions. It returns raw markup,
//! bytes, and string cells that callers map to lien records however they
//! like.

pub mod html_blocks;
pub mod html_table;
pub mod retry;

use std::collections::BTreeMap;
use std::time::Duration;

/// User agent sent with every request. County sites routinely reject
/// requests that do not look like a desktop browser.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Default hard timeout for a single HTTP request.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default number of retries for transient HTTP failures.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Errors that can occur while fetching or parsing a document.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    /// An HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status {
        /// Requested URL.
        url: String,
        /// Status code returned by the server.
        status: reqwest::StatusCode,
    },

    /// Parsing the response body failed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A CSS selector did not compile.
    #[error("Invalid CSS selector '{selector}': {message}")]
    InvalidSelector {
        /// The offending selector.
        selector: String,
        /// Parser message.
        message: String,
    },

    /// A URL could not be parsed or joined.
    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Parser message.
        message: String,
    },
}

/// Configuration for the shared [`Fetcher`].
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// `User-Agent` header value.
    pub user_agent: String,
    /// Hard per-request timeout.
    pub timeout: Duration,
    /// Retries for transient failures (connection errors, 429, 5xx).
    pub max_retries: u32,
    /// Additional headers sent with every request.
    pub headers: BTreeMap<String, String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        let mut headers = BTreeMap::new();
        headers.insert(
            "Accept".to_owned(),
            "text/html,application/xhtml+xml,application/xml;q=0.9,application/pdf,*/*;q=0.8"
                .to_owned(),
        );
        headers.insert("Accept-Language".to_owned(), "en-US,en;q=0.9".to_owned());

        Self {
            user_agent: BROWSER_USER_AGENT.to_owned(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            headers,
        }
    }
}

impl FetchConfig {
    /// Builds a config from defaults, honoring `TAX_LIEN_HTTP_TIMEOUT_SECS`
    /// and `TAX_LIEN_HTTP_RETRIES` when set.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(secs) = std::env::var("TAX_LIEN_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = std::env::var("TAX_LIEN_HTTP_RETRIES")
            .ok()
            .and_then(|v| v.trim().parse::<u32>().ok())
        {
            config.max_retries = retries;
        }

        config
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Adds an HTTP header to include in requests.
    #[must_use]
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_owned(), value.to_owned());
        self
    }
}

/// Fetches HTML pages and PDF documents over plain HTTP GET.
///
/// Construct one per process and pass it into every orchestrator run.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    max_retries: u32,
}

impl Fetcher {
    /// Builds a fetcher from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError`] if a header is invalid or the HTTP client
    /// cannot be constructed.
    pub fn new(config: &FetchConfig) -> Result<Self, ScrapeError> {
        let mut header_map = reqwest::header::HeaderMap::new();
        for (key, value) in &config.headers {
            let name = reqwest::header::HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| ScrapeError::Parse(format!("invalid header name '{key}': {e}")))?;
            let val = reqwest::header::HeaderValue::from_str(value)
                .map_err(|e| ScrapeError::Parse(format!("invalid header value '{value}': {e}")))?;
            header_map.insert(name, val);
        }

        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(header_map)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            max_retries: config.max_retries,
        })
    }

    /// Fetches `url` and returns the body as text (HTML pages).
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError`] if the request fails after all retries or
    /// the server answers with a non-retryable error status.
    pub async fn fetch_text(&self, url: &str) -> Result<String, ScrapeError> {
        let response = retry::send(|| self.client.get(url), self.max_retries).await?;
        let body = response.text().await?;
        log::debug!("Fetched {} bytes of markup from {url}", body.len());
        Ok(body)
    }

    /// Fetches `url` and returns the raw body bytes (PDF documents).
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError`] if the request fails after all retries or
    /// the server answers with a non-retryable error status.
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, ScrapeError> {
        let response = retry::send(|| self.client.get(url), self.max_retries).await?;
        let bytes = response.bytes().await?;
        log::debug!("Downloaded {} bytes from {url}", bytes.len());
        Ok(bytes.to_vec())
    }
}

/// Collapses runs of whitespace (including non-breaking spaces) into one
/// space and trims the ends.
#[must_use]
pub fn collapse_whitespace(s: &str) -> String {
    s.split(|c: char| c.is_whitespace() || c == '\u{a0}')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

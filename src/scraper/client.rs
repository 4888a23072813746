//! Blocking HTTP client with browser-like headers and linear-backoff retries.

use crate::scraper::{PageSource, ScraperError};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::warn;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0 Safari/537.36";
const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";
const DEFAULT_TIMEOUT_SECS: u64 = 20;
const MAX_REDIRECTS: usize = 10;

/// Default number of attempts for a fetch (initial plus retries).
const DEFAULT_RETRY_COUNT: u32 = 3;
/// Default backoff unit in seconds; attempt `n` (1-based) waits `n * backoff`.
const DEFAULT_BACKOFF_SECS: f64 = 1.0;

/// Blocking HTTP client shared by the listing walk and the detail workers.
///
/// Fetching takes `&self`, so one client can serve every worker thread.
#[derive(Debug, Clone)]
pub struct PoliteClient {
    inner: reqwest::blocking::Client,
    retry_count: u32,
    backoff: Duration,
}

impl PoliteClient {
    /// Build a client with default User-Agent, language header, timeout, and retries.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::builder().build()
    }

    pub fn builder() -> PoliteClientBuilder {
        PoliteClientBuilder::default()
    }

    /// Single GET. Anything but HTTP 200 is an error.
    fn get_once(&self, url: &str) -> Result<String, ScraperError> {
        let response = self
            .inner
            .get(url)
            .send()
            .map_err(|e| ScraperError::Network {
                url: url.to_string(),
                source: e,
            })?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(ScraperError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        response.text().map_err(|e| ScraperError::BodyRead {
            url: url.to_string(),
            source: e,
        })
    }

    /// GET with retries. Every failure (transport or status) is retried the same way.
    pub fn get_with_retry(&self, url: &str) -> Result<String, ScraperError> {
        retry_with_backoff(url, self.retry_count, self.backoff, |_| self.get_once(url))
    }
}

impl PageSource for PoliteClient {
    fn fetch_page(&self, url: &str) -> Result<String, ScraperError> {
        self.get_with_retry(url)
    }
}

/// Run `attempt` up to `max_attempts` times. After failed attempt `n` (1-based), log a warning and
/// sleep `backoff * n` before the next one. No sleep follows the last attempt.
pub(crate) fn retry_with_backoff<T, F>(
    url: &str,
    max_attempts: u32,
    backoff: Duration,
    attempt: F,
) -> Result<T, ScraperError>
where
    F: FnMut(u32) -> Result<T, ScraperError>,
{
    retry_with_sleep(url, max_attempts, backoff, attempt, std::thread::sleep)
}

fn retry_with_sleep<T, F, S>(
    url: &str,
    max_attempts: u32,
    backoff: Duration,
    mut attempt: F,
    mut sleep: S,
) -> Result<T, ScraperError>
where
    F: FnMut(u32) -> Result<T, ScraperError>,
    S: FnMut(Duration),
{
    let max_attempts = max_attempts.max(1);
    let mut n = 1;
    loop {
        match attempt(n) {
            Ok(value) => return Ok(value),
            Err(e) if n >= max_attempts => {
                return Err(ScraperError::RetriesExhausted {
                    url: url.to_string(),
                    attempts: n,
                    last: Box::new(e),
                })
            }
            Err(e) => {
                warn!(attempt = n, max_attempts, "{}", e);
                sleep(backoff.saturating_mul(n));
                n += 1;
            }
        }
    }
}

/// Builder for PoliteClient with optional User-Agent, language, timeout, and retry settings.
#[derive(Debug)]
pub struct PoliteClientBuilder {
    user_agent: Option<String>,
    accept_language: Option<String>,
    timeout_secs: u64,
    retry_count: u32,
    backoff_secs: f64,
}

impl Default for PoliteClientBuilder {
    fn default() -> Self {
        Self {
            user_agent: None,
            accept_language: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retry_count: DEFAULT_RETRY_COUNT,
            backoff_secs: DEFAULT_BACKOFF_SECS,
        }
    }
}

impl PoliteClientBuilder {
    /// Set a custom User-Agent. If not set, a browser-like default is used.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Set the Accept-Language header. Default `en-US,en;q=0.9`.
    pub fn accept_language(mut self, lang: impl Into<String>) -> Self {
        self.accept_language = Some(lang.into());
        self
    }

    /// Set request timeout in seconds. Default 20.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Set number of attempts per fetch (default 3, minimum 1).
    pub fn retry_count(mut self, n: u32) -> Self {
        self.retry_count = n.max(1);
        self
    }

    /// Set the backoff unit in seconds. Negative or NaN values become 0; huge values saturate.
    pub fn backoff_secs(mut self, secs: f64) -> Self {
        self.backoff_secs = secs;
        self
    }

    pub fn build(self) -> Result<PoliteClient, reqwest::Error> {
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let language = self
            .accept_language
            .unwrap_or_else(|| DEFAULT_ACCEPT_LANGUAGE.to_string());
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&language) {
            headers.insert(ACCEPT_LANGUAGE, value);
        } else {
            warn!("Ignoring invalid Accept-Language value {:?}", language);
        }
        let inner = reqwest::blocking::Client::builder()
            .cookie_store(true)
            .user_agent(user_agent)
            .default_headers(headers)
            .timeout(Duration::from_secs(self.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(PoliteClient {
            inner,
            retry_count: self.retry_count,
            backoff: secs_to_duration(self.backoff_secs),
        })
    }
}

/// Seconds as f64 to Duration. Negative or NaN input becomes zero; values too large for a
/// Duration saturate to `Duration::MAX`.
fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

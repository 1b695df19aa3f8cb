//! Listing API access with bounded, escalating retry.
//!
//! The orchestrator pages through search results via the [`SearchSource`]
//! trait:
//! - [`PeopleSearchClient`]: POSTs the JSON search payload to the real API
//! - [`RetryListing`]: decorator that retries a failing page with an
//!   escalating cooldown and gives up with [`HarvestError::ListingStalled`]
//!   after a fixed number of consecutive failures
//!
//! # Retry Strategy
//!
//! ```text
//! cooldown = min(base * 2^(failures-1), max) + random_jitter(0..250ms)
//! ```

use crate::config::{ListingRetryConfig, SearchConfig};
use crate::error::HarvestError;
use crate::models::{CandidateItem, Window};
use rand::{Rng, rng};
use reqwest::Client;
use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

/// A paginated source of candidate items.
///
/// An empty page means the window is exhausted.
pub trait SearchSource {
    async fn fetch_page(&self, window: &Window, page: u32)
    -> Result<Vec<CandidateItem>, HarvestError>;
}

/// JSON body of a search request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchPayload<'a> {
    key: &'a str,
    page: u32,
    limit: u32,
    has_title: bool,
    has_content: bool,
    is_fuzzy: bool,
    #[serde(rename = "type")]
    search_type: u32,
    sort_type: u32,
    start_time: i64,
    end_time: i64,
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Option<SearchData>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchData {
    #[serde(default)]
    records: Option<Vec<CandidateItem>>,
}

/// Client for the people.cn front search endpoint.
#[derive(Debug, Clone)]
pub struct PeopleSearchClient {
    client: Client,
    config: SearchConfig,
}

impl PeopleSearchClient {
    /// Build a client with the cookie and user agent as default headers.
    ///
    /// # Errors
    ///
    /// [`HarvestError::Config`] if the cookie is not a valid header value,
    /// [`HarvestError::Http`] if the client cannot be built.
    pub fn new(config: SearchConfig) -> Result<Self, HarvestError> {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = config.cookie.as_deref().filter(|c| !c.is_empty()) {
            let value = HeaderValue::from_str(cookie)
                .map_err(|e| HarvestError::Config(format!("invalid cookie header: {}", e)))?;
            headers.insert(COOKIE, value);
        }
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(config.timeout())
            .build()?;
        Ok(Self { client, config })
    }

    fn payload(&self, window: &Window, page: u32) -> SearchPayload<'_> {
        SearchPayload {
            key: &self.config.keyword,
            page,
            limit: self.config.page_limit,
            has_title: self.config.has_title,
            has_content: self.config.has_content,
            is_fuzzy: self.config.is_fuzzy,
            search_type: self.config.search_type,
            sort_type: self.config.sort_type,
            start_time: window.start_millis(),
            end_time: window.end_millis(),
        }
    }
}

impl SearchSource for PeopleSearchClient {
    #[instrument(level = "info", skip_all, fields(window = %window, page = page))]
    async fn fetch_page(
        &self,
        window: &Window,
        page: u32,
    ) -> Result<Vec<CandidateItem>, HarvestError> {
        let response = self
            .client
            .post(&self.config.api_url)
            .json(&self.payload(window, page))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HarvestError::ListingStatus(status.as_u16()));
        }
        let text = response.text().await?;
        let parsed: SearchResponse = serde_json::from_str(&text)?;
        let records = parsed.data.and_then(|d| d.records).unwrap_or_default();
        debug!(count = records.len(), "Listing page received");
        Ok(records)
    }
}

/// Wrapper that adds bounded retry with escalating cooldown to any
/// [`SearchSource`].
pub struct RetryListing<S> {
    inner: S,
    config: ListingRetryConfig,
}

impl<S> RetryListing<S> {
    /// Wrap `inner`; `config.max_attempts` counts the first try.
    pub fn new(inner: S, config: ListingRetryConfig) -> Self {
        Self { inner, config }
    }

    fn cooldown(&self, failures: u32) -> Duration {
        let base = Duration::from_millis(self.config.base_cooldown_ms);
        let max = Duration::from_millis(self.config.max_cooldown_ms);
        let delay = base.saturating_mul(1 << failures.saturating_sub(1).min(16)).min(max);
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + Duration::from_millis(jitter_ms)
    }
}

impl<S> fmt::Debug for RetryListing<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryListing")
            .field("max_attempts", &self.config.max_attempts)
            .field("base_cooldown_ms", &self.config.base_cooldown_ms)
            .field("max_cooldown_ms", &self.config.max_cooldown_ms)
            .finish()
    }
}

impl<S> SearchSource for RetryListing<S>
where
    S: SearchSource,
{
    async fn fetch_page(
        &self,
        window: &Window,
        page: u32,
    ) -> Result<Vec<CandidateItem>, HarvestError> {
        let t0 = Instant::now();
        let max_attempts = self.config.max_attempts.max(1);
        let mut failures = 0u32;

        loop {
            match self.inner.fetch_page(window, page).await {
                Ok(items) => return Ok(items),
                Err(e) => {
                    failures += 1;
                    if failures >= max_attempts {
                        error!(
                            %window,
                            page,
                            attempts = failures,
                            elapsed_ms_total = t0.elapsed().as_millis() as u64,
                            error = %e,
                            "Listing API stalled"
                        );
                        return Err(HarvestError::ListingStalled {
                            window: window.to_string(),
                            page,
                            attempts: failures,
                        });
                    }
                    let delay = self.cooldown(failures);
                    warn!(
                        %window,
                        page,
                        attempt = failures,
                        max = max_attempts,
                        ?delay,
                        error = %e,
                        "Listing request failed; cooling down"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

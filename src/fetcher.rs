//! Concurrent article page downloader.
//!
//! One [`reqwest::Client`] (one connection pool) serves a whole run. Each
//! batch fans out with `buffer_unordered`, and every URL gets its own retry
//! budget:
//!
//! - request timeouts, connect failures and HTTP 429/500/502/503/504 are
//!   retried with exponential backoff (`base * 2^attempt`)
//! - any other status or transport error gives up at once
//! - running out of attempts gives up too
//!
//! Giving up means `html: None` on the [`FetchResult`]; nothing here returns
//! an error to the caller. Response bytes are decoded with an encoding sniffed
//! from the bytes themselves, because Chinese news sites routinely lie about
//! their charset in headers.

use crate::config::FetchConfig;
use crate::error::HarvestError;
use crate::models::{CandidateItem, FetchResult};
use chardetng::EncodingDetector;
use futures::stream::{self, StreamExt};
use reqwest::{Client, StatusCode};
use std::time::Instant;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Statuses worth another attempt.
const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Downloads article pages for a batch of candidates.
///
/// Cloning is cheap and shares the connection pool.
#[derive(Debug, Clone)]
pub struct BatchFetcher {
    /// Pooled client carrying the user agent and per-attempt timeout.
    client: Client,
    /// Retry budget, backoff base and concurrency.
    config: FetchConfig,
}

impl BatchFetcher {
    /// Build the shared HTTP client.
    ///
    /// # Errors
    ///
    /// [`HarvestError::Http`] if the TLS backend cannot be initialised.
    pub fn new(config: FetchConfig) -> Result<Self, HarvestError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout())
            .build()?;
        Ok(Self { client, config })
    }

    /// Download every fetchable item of a batch concurrently.
    ///
    /// Items whose URL is empty, not HTTP(S) or points at video content are
    /// dropped before any request is made and do not appear in the output.
    /// Output order follows completion order, not input order.
    #[instrument(level = "info", skip_all, fields(batch = items.len()))]
    pub async fn fetch_batch(&self, items: Vec<CandidateItem>) -> Vec<FetchResult> {
        let total = items.len();
        let accepted: Vec<(CandidateItem, String)> = items
            .into_iter()
            .filter_map(|item| {
                let url = item.fetch_url();
                if is_fetchable(&url) {
                    Some((item, url))
                } else {
                    debug!(url = %url, "Skipping unfetchable URL");
                    None
                }
            })
            .collect();

        if accepted.is_empty() {
            return Vec::new();
        }
        info!(count = accepted.len(), skipped = total - accepted.len(), "Fetching article pages");

        let results: Vec<FetchResult> = stream::iter(accepted)
            .map(|(item, url)| async move {
                let html = self.fetch_url(&url).await;
                FetchResult { item, url, html }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let fetched = results.iter().filter(|r| r.html.is_some()).count();
        info!(fetched, failed = results.len() - fetched, "Batch fetch complete");
        results
    }

    /// Fetch one page and decode it, retrying transient failures.
    #[instrument(level = "debug", skip_all, fields(%url))]
    pub async fn fetch_url(&self, url: &str) -> Option<String> {
        let t0 = Instant::now();
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 0..max_attempts {
            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::OK {
                        match response.bytes().await {
                            Ok(bytes) => {
                                debug!(bytes = bytes.len(), attempt, "Fetched page");
                                return Some(decode_body(&bytes));
                            }
                            Err(e) if e.is_timeout() => {
                                warn!(attempt, error = %e, "Body read timed out; backing off");
                            }
                            Err(e) => {
                                warn!(error = %e, "Body read failed; giving up");
                                return None;
                            }
                        }
                    } else if RETRYABLE_STATUSES.contains(&status.as_u16()) {
                        warn!(attempt, status = status.as_u16(), "Retryable status; backing off");
                    } else {
                        warn!(status = status.as_u16(), "Non-retryable status; giving up");
                        return None;
                    }
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    warn!(attempt, error = %e, "Request failed transiently; backing off");
                }
                Err(e) => {
                    warn!(error = %e, "Request failed; giving up");
                    return None;
                }
            }

            if attempt + 1 < max_attempts {
                let delay = self.config.backoff_base().saturating_mul(1 << attempt.min(16));
                sleep(delay).await;
            }
        }

        warn!(
            attempts = max_attempts,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetch exhausted retries"
        );
        None
    }
}

/// Whether a URL is worth requesting: absolute HTTP(S) and not video content.
pub fn is_fetchable(url: &str) -> bool {
    if url.is_empty() || url.contains("video") {
        return false;
    }
    match Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some(),
        Err(_) => false,
    }
}

/// Decode raw page bytes using a sniffed encoding; malformed sequences become
/// U+FFFD instead of failing.
pub fn decode_body(bytes: &[u8]) -> String {
    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);
    let (text, actual, had_errors) = encoding.decode(bytes);
    if had_errors {
        debug!(encoding = actual.name(), "Decoded page with replacement characters");
    }
    text.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    fn test_config() -> FetchConfig {
        FetchConfig {
            user_agent: "Mozilla/5.0".to_string(),
            timeout_secs: 1,
            max_attempts: 3,
            backoff_base_ms: 10,
            concurrency: 5,
        }
    }

    fn item(url: &str) -> CandidateItem {
        CandidateItem {
            title: Some(format!("title for {}", url)),
            url: Some(url.to_string()),
            ..Default::default()
        }
    }

    /// Accepts connections and never answers, counting accepts.
    async fn silent_server() -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&accepts);
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                held.push(socket);
            }
        });
        (format!("http://{}/hangs", addr), accepts)
    }

    #[test]
    fn test_is_fetchable() {
        assert!(is_fetchable("http://politics.people.com.cn/n1/2024/0415/c1001-1.html"));
        assert!(is_fetchable("https://example.com/a"));
        assert!(!is_fetchable(""));
        assert!(!is_fetchable("ftp://example.com/file"));
        assert!(!is_fetchable("not a url"));
        assert!(!is_fetchable("/relative/path.html"));
        assert!(!is_fetchable("http://v.people.cn/video/2024/0415.html"));
    }

    #[test]
    fn test_decode_body_utf8() {
        let html = "<p>国务院常务会议研究部署财政政策</p>";
        assert_eq!(decode_body(html.as_bytes()), html);
    }

    #[test]
    fn test_decode_body_gbk_without_header_hint() {
        let text = "<html><body><p>国务院总理主持召开国务院常务会议，研究部署进一步深化财政体制改革，\
            推动经济持续回升向好。会议指出，要保持宏观政策的连续性稳定性，加强财政、货币、\
            就业、产业、区域等政策协调配合，形成推动高质量发展的合力。</p></body></html>";
        let (bytes, _, _) = encoding_rs::GBK.encode(text);
        assert_eq!(decode_body(&bytes), text);
    }

    #[test]
    fn test_decode_body_invalid_bytes_is_lenient() {
        let bytes = [0x3c, 0x70, 0x3e, 0xff, 0xfe, 0xfd, 0x3c, 0x2f, 0x70, 0x3e];
        let decoded = decode_body(&bytes);
        assert!(decoded.starts_with("<p>"));
    }

    #[tokio::test]
    async fn test_fetch_batch_resilience() {
        let mut server = mockito::Server::new_async().await;

        let ok = server
            .mock("GET", "/ok")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<p>immediate</p>")
            .expect(1)
            .create_async()
            .await;
        let flaky_503 = server
            .mock("GET", "/flaky")
            .with_status(503)
            .expect(1)
            .create_async()
            .await;
        let flaky_200 = server
            .mock("GET", "/flaky")
            .with_status(200)
            .with_body("<p>second try</p>")
            .expect(1)
            .create_async()
            .await;
        let missing = server
            .mock("GET", "/missing")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let (hang_url, accepts) = silent_server().await;
        let base = server.url();
        let items = vec![
            item(&hang_url),
            item(&format!("{}/flaky", base)),
            item(&format!("{}/missing", base)),
            item("mailto:editor@people.cn"),
            item(&format!("{}/ok", base)),
        ];

        let fetcher = BatchFetcher::new(test_config()).unwrap();
        let results = fetcher.fetch_batch(items).await;

        assert_eq!(results.len(), 4, "non-HTTP item must be filtered before fetching");
        let body_of = |suffix: &str| {
            results
                .iter()
                .find(|r| r.url.ends_with(suffix))
                .map(|r| r.html.clone())
                .unwrap()
        };
        assert_eq!(body_of("/ok").as_deref(), Some("<p>immediate</p>"));
        assert_eq!(body_of("/flaky").as_deref(), Some("<p>second try</p>"));
        assert_eq!(body_of("/missing"), None);
        assert_eq!(body_of("/hangs"), None);
        assert!(results.iter().all(|r| !r.url.starts_with("mailto:")));

        ok.assert_async().await;
        flaky_503.assert_async().await;
        flaky_200.assert_async().await;
        missing.assert_async().await;
        assert_eq!(accepts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fetch_url_gives_up_after_max_attempts() {
        let mut server = mockito::Server::new_async().await;
        let down = server
            .mock("GET", "/down")
            .with_status(502)
            .expect(3)
            .create_async()
            .await;

        let fetcher = BatchFetcher::new(test_config()).unwrap();
        let html = fetcher.fetch_url(&format!("{}/down", server.url())).await;
        assert!(html.is_none());
        down.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_batch_all_filtered() {
        let fetcher = BatchFetcher::new(test_config()).unwrap();
        let results = fetcher
            .fetch_batch(vec![item(""), item("http://example.com/video/1")])
            .await;
        assert!(results.is_empty());
    }
}

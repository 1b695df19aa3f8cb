//! Harvest orchestration.
//!
//! Walks the configured date range backwards in fixed-width windows and pages
//! through each window until the listing API returns an empty page. Every
//! non-empty page is one batch:
//!
//! 1. **Fetch**: all batch URLs concurrently over one connection pool
//! 2. **Extract**: bodies parsed on the blocking pool, `extract.workers` at a time
//! 3. **Filter**: body length and keyword hits
//! 4. **Upsert**: surviving articles go into the [`DedupStore`] one at a time
//!
//! The batch is a barrier: nothing is upserted until every item has been
//! fetched and extracted. The store is only touched from this control flow.
//! A checkpoint snapshot is written once enough records were inserted or
//! updated since the last successful one.

use crate::config::HarvestConfig;
use crate::error::HarvestError;
use crate::extract::extract_body;
use crate::fetcher::BatchFetcher;
use crate::models::{CandidateItem, ExtractedArticle, FetchResult, UpsertOutcome, Window};
use crate::relevance::{RelevanceFilter, Verdict};
use crate::search::SearchSource;
use crate::store::{DedupStore, SnapshotKind};
use crate::utils::truncate_for_log;
use chrono::{Duration as ChronoDuration, NaiveDate};
use futures::stream::{self, StreamExt};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// Where the run currently is, published on a watch channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Starting,
    Running { window: Window, page: u32 },
    /// The listing API kept failing at this position; the run stopped paging.
    Stalled {
        window: Window,
        page: u32,
        attempts: u32,
    },
    Completed,
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub windows: usize,
    /// Non-empty listing pages.
    pub pages: usize,
    pub items_seen: usize,
    /// Pages downloaded with a 200 response.
    pub fetched: usize,
    /// Articles that passed the relevance filter, duplicates included.
    pub relevant: usize,
    pub too_short: usize,
    pub no_keywords: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    /// Successful checkpoint snapshots; the final snapshot is not counted.
    pub checkpoints: usize,
    pub failed_checkpoints: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Split `[start, end)` into windows of `days`, newest first. The oldest
/// window is clamped to `start`.
pub fn time_windows(start: NaiveDate, end: NaiveDate, days: u32) -> Vec<Window> {
    let width = ChronoDuration::days(i64::from(days.max(1)));
    let start = start.and_time(chrono::NaiveTime::MIN);
    let mut current = end.and_time(chrono::NaiveTime::MIN);
    let mut windows = Vec::new();
    while current > start {
        let prev = (current - width).max(start);
        windows.push(Window {
            start: prev,
            end: current,
        });
        current = prev;
    }
    windows
}

/// The harvest driver: one listing source, one fetcher, one filter, and the
/// window plan computed from the config.
///
/// Status changes are published on a watch channel; see [`Pipeline::subscribe`].
pub struct Pipeline<S> {
    source: S,
    fetcher: BatchFetcher,
    filter: RelevanceFilter,
    windows: Vec<Window>,
    page_delay: Duration,
    extract_workers: usize,
    checkpoint_interval: usize,
    status: watch::Sender<RunStatus>,
}

impl<S> Pipeline<S>
where
    S: SearchSource,
{
    /// Build a pipeline over `source`.
    ///
    /// # Arguments
    ///
    /// * `source` - Listing pages, usually a [`crate::search::RetryListing`]
    /// * `fetcher` - Shared article downloader
    /// * `filter` - Length and keyword gate applied to extracted bodies
    /// * `config` - Supplies the window plan, page delay, extraction workers and
    ///   checkpoint interval
    pub fn new(
        source: S,
        fetcher: BatchFetcher,
        filter: RelevanceFilter,
        config: &HarvestConfig,
    ) -> Self {
        let (status, _) = watch::channel(RunStatus::Starting);
        Self {
            source,
            fetcher,
            filter,
            windows: time_windows(
                config.window.start_date,
                config.window.end_date,
                config.window.days,
            ),
            page_delay: config.search.page_delay(),
            extract_workers: config.extract.workers.max(1),
            checkpoint_interval: config.output.checkpoint_interval,
            status,
        }
    }

    /// A receiver that always holds the latest [`RunStatus`].
    pub fn subscribe(&self) -> watch::Receiver<RunStatus> {
        self.status.subscribe()
    }

    /// Harvest every window into `store`, accumulating counters in `summary`.
    ///
    /// Returns an error only when the listing API stalls; the store keeps
    /// everything admitted up to that point and the caller still owns the
    /// final snapshot.
    #[instrument(level = "info", skip_all, fields(windows = self.windows.len()))]
    pub async fn run(
        &self,
        store: &mut DedupStore,
        summary: &mut RunSummary,
    ) -> Result<(), HarvestError> {
        let mut since_checkpoint = 0usize;

        for window in &self.windows {
            summary.windows += 1;
            info!(%window, "Harvesting window");
            let mut page = 1u32;

            loop {
                self.status.send_replace(RunStatus::Running {
                    window: *window,
                    page,
                });
                let items = match self.source.fetch_page(window, page).await {
                    Ok(items) => items,
                    Err(e) => {
                        let attempts = match &e {
                            HarvestError::ListingStalled { attempts, .. } => *attempts,
                            _ => 1,
                        };
                        self.status.send_replace(RunStatus::Stalled {
                            window: *window,
                            page,
                            attempts,
                        });
                        error!(%window, page, error = %e, "Stopping run: listing API unavailable");
                        return Err(e);
                    }
                };

                if items.is_empty() {
                    info!(%window, page, "No more records in window");
                    break;
                }
                summary.pages += 1;
                summary.items_seen += items.len();
                info!(%window, page, count = items.len(), "Listing page received");

                let articles = self.process_batch(items, summary).await;
                if articles.is_empty() {
                    info!(%window, page, "Batch produced no usable articles");
                }
                for article in articles {
                    let outcome = store.upsert(article);
                    summary.record(outcome);
                    if outcome.is_net_new() {
                        since_checkpoint += 1;
                    }
                }

                if self.checkpoint_interval > 0 && since_checkpoint >= self.checkpoint_interval {
                    info!(rows = store.len(), since_checkpoint, "Checkpoint threshold reached");
                    match store.snapshot_all(SnapshotKind::Checkpoint).await {
                        Ok(_) => {
                            since_checkpoint = 0;
                            summary.checkpoints += 1;
                        }
                        Err(e) => {
                            summary.failed_checkpoints += 1;
                            error!(error = %e, "Checkpoint snapshot failed; will retry after next batch");
                        }
                    }
                }

                page += 1;
                if !self.page_delay.is_zero() {
                    sleep(self.page_delay).await;
                }
            }
        }

        self.status.send_replace(RunStatus::Completed);
        Ok(())
    }

    /// Fetch, extract and filter one batch, returning the articles worth
    /// upserting in completion order.
    pub async fn process_batch(
        &self,
        items: Vec<CandidateItem>,
        summary: &mut RunSummary,
    ) -> Vec<ExtractedArticle> {
        let fetched = self.fetcher.fetch_batch(items).await;
        summary.fetched += fetched.iter().filter(|r| r.html.is_some()).count();

        let extracted: Vec<(CandidateItem, String)> = stream::iter(fetched)
            .map(|result| async move {
                let FetchResult { item, url, html } = result;
                let html = html.unwrap_or_default();
                let body = match tokio::task::spawn_blocking(move || extract_body(&html)).await {
                    Ok(body) => body,
                    Err(e) => {
                        warn!(%url, error = %e, "Extraction task failed");
                        String::new()
                    }
                };
                (item, body)
            })
            .buffer_unordered(self.extract_workers)
            .collect()
            .await;

        let mut articles = Vec::new();
        for (item, body) in extracted {
            let title = item.clean_title();
            match self.filter.assess(&body) {
                Verdict::TooShort { chars } => {
                    summary.too_short += 1;
                    debug!(title = %truncate_for_log(&title, 40), chars, "Body too short or empty; skipping");
                }
                Verdict::NoKeywords => {
                    summary.no_keywords += 1;
                    debug!(title = %truncate_for_log(&title, 40), "No keyword hit; skipping");
                }
                Verdict::Relevant(hits) => {
                    summary.relevant += 1;
                    articles.push(ExtractedArticle {
                        title,
                        published_date: item.published_date(),
                        url: item.record_url(),
                        char_count: body.chars().count(),
                        body,
                        matched_keywords: hits,
                    });
                }
            }
        }
        articles
    }
}

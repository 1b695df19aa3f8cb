//! # News Harvest
//!
//! Incrementally harvests news articles from the people.cn search API over a
//! historical date range, keeps the ones whose full text hits a keyword
//! vocabulary, and maintains an always-growing, duplicate-free corpus on disk.
//!
//! ## Usage
//!
//! ```sh
//! news_harvest -o ./data --start-date 2024-04-01 --end-date 2024-05-01
//! ```
//!
//! ## Architecture
//!
//! 1. **Resume**: rebuild the dedup store from the previous CSV snapshot
//! 2. **List**: page through the search API one day-window at a time, newest first
//! 3. **Fetch**: download each page's article URLs concurrently, with retry/backoff
//! 4. **Extract**: pull the main text out of each page on the blocking pool
//! 5. **Filter**: drop short bodies and bodies with no keyword hit
//! 6. **Dedup**: upsert by title/date fingerprint, keeping the longest body
//! 7. **Snapshot**: checkpoint every N new records, and once more at the end

use clap::Parser;
use std::error::Error;
use std::process::ExitCode;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod error;
mod extract;
mod fetcher;
mod fingerprint;
mod models;
mod outputs;
mod pipeline;
mod relevance;
mod search;
mod store;
mod utils;

use cli::Cli;
use fetcher::BatchFetcher;
use outputs::SnapshotPaths;
use pipeline::{Pipeline, RunSummary};
use relevance::{KeywordMatcher, RelevanceFilter};
use search::{PeopleSearchClient, RetryListing};
use store::{DedupStore, SnapshotKind};
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<ExitCode, Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("news_harvest starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(config = ?args.config, output_dir = ?args.output_dir, "Parsed CLI arguments");

    // ---- Load & validate config ----
    let mut config = config::load_config(args.config.as_deref())?;
    config.apply_cli(&args);
    config.validate()?;
    info!(
        start = %config.window.start_date,
        end = %config.window.end_date,
        window_days = config.window.days,
        keyword = %config.search.keyword,
        "Configuration ready"
    );

    // Early check: ensure the snapshot dir is writable
    if let Err(e) = ensure_writable_dir(&config.output.dir).await {
        error!(
            path = %config.output.dir.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    // ---- Build pipeline ----
    let matcher = KeywordMatcher::new(&config.keywords.0)?;
    if matcher.is_empty() {
        error!("Keyword vocabulary has no usable terms");
        return Ok(ExitCode::FAILURE);
    }
    info!(vocabulary = matcher.len(), "Keyword matcher ready");
    let relevance = RelevanceFilter::new(matcher, config.extract.min_body_chars);
    let fetcher = BatchFetcher::new(config.fetch.clone())?;
    let source = RetryListing::new(
        PeopleSearchClient::new(config.search.clone())?,
        config.listing_retry.clone(),
    );
    let pipeline = Pipeline::new(source, fetcher, relevance, &config);
    let status = pipeline.subscribe();

    // ---- Resume & run ----
    let mut store = DedupStore::load(SnapshotPaths::from(&config.output));
    if store.is_empty() {
        info!("Starting from an empty corpus");
    } else {
        info!(records = store.len(), "Resuming from snapshot");
    }

    let mut summary = RunSummary::default();
    let outcome = pipeline.run(&mut store, &mut summary).await;

    // ---- Final snapshot, whatever happened above ----
    info!(rows = store.len(), "Writing final snapshot");
    match store.snapshot_all(SnapshotKind::Final).await {
        Ok(rows) => info!(
            rows,
            csv = %store.paths().csv.display(),
            xlsx = %store.paths().xlsx.display(),
            "Final snapshot saved"
        ),
        Err(e) => error!(error = %e, "Final snapshot failed"),
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        windows = summary.windows,
        pages = summary.pages,
        items_seen = summary.items_seen,
        fetched = summary.fetched,
        relevant = summary.relevant,
        too_short = summary.too_short,
        no_keywords = summary.no_keywords,
        inserted = summary.inserted,
        updated = summary.updated,
        skipped = summary.skipped,
        checkpoints = summary.checkpoints,
        failed_checkpoints = summary.failed_checkpoints,
        total_records = store.len(),
        "Execution complete"
    );

    match outcome {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            error!(
                error = %e,
                status = ?*status.borrow(),
                "Run stopped early; rerun to resume from the snapshot"
            );
            Ok(ExitCode::FAILURE)
        }
    }
}

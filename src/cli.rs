//! Command-line interface definitions.
//!
//! Everything here is optional: flags override the YAML config file, which in
//! turn overrides the built-in defaults (see [`crate::config`]).

use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the harvester.
///
/// # Examples
///
/// ```sh
/// # Resume the default April 2024 run, snapshots in ./data
/// news_harvest -o ./data
///
/// # Different range and search term, cookie from the environment
/// PEOPLE_SEARCH_COOKIE='__jsluid_h=...' news_harvest \
///     --start-date 2024-01-01 --end-date 2024-02-01 -k 经济
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to a YAML config file
    #[arg(short, long, env = "NEWS_HARVEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding the CSV/XLSX snapshots
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Oldest day to harvest (inclusive)
    #[arg(long)]
    pub start_date: Option<NaiveDate>,

    /// Day the harvest walks backwards from
    #[arg(long)]
    pub end_date: Option<NaiveDate>,

    /// Search term sent to the listing API
    #[arg(short, long)]
    pub keyword: Option<String>,

    /// Width of each time window in days
    #[arg(long)]
    pub window_days: Option<u32>,

    /// Snapshot after this many inserted or updated records
    #[arg(long)]
    pub checkpoint_interval: Option<usize>,

    /// Cookie header for the search API
    #[arg(long, env = "PEOPLE_SEARCH_COOKIE", hide_env_values = true)]
    pub cookie: Option<String>,
}

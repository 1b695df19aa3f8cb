//! Harvest configuration.
//!
//! Loaded from a YAML file when one is given (or `news_harvest.yaml` exists in
//! the working directory), otherwise built from defaults that reproduce the
//! April 2024 people.cn "政策" harvest. Every field is optional in the file.
//! CLI flags are applied on top with [`HarvestConfig::apply_cli`].

use crate::cli::Cli;
use crate::error::HarvestError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument};

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "news_harvest.yaml";

/// Economic-policy-uncertainty vocabulary used when the config names none.
pub const DEFAULT_KEYWORDS: [&str; 55] = [
    "经济", "金融", "商业", "不确定", "不明确", "未明", "不明朗", "不清晰", "未清晰",
    "难料", "难以预料", "难以预测", "难以预计", "难以估计", "无法预料", "无法预测",
    "无法预计", "无法估计", "不可预料", "不可预测", "不可预计", "不可估计", "波动",
    "震荡", "动荡", "不稳", "未知", "政策", "制度", "体制", "战略", "措施", "规章",
    "规例", "条例", "政治", "执政", "政府", "国务院", "人大", "人民代表大会",
    "中央", "国家领导人", "总理", "改革", "整改", "整治", "规管", "监管", "财政",
    "税", "人民银行", "央行", "赤字", "利率",
];

/// Root of the YAML config file.
///
/// Every section may be omitted. Unknown keys are rejected so a misspelled
/// setting fails loudly instead of silently keeping its default.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarvestConfig {
    /// Listing API request parameters.
    pub search: SearchConfig,
    /// Retry policy for failed listing calls.
    pub listing_retry: ListingRetryConfig,
    /// Date range and window width.
    pub window: WindowConfig,
    /// Article page downloads.
    pub fetch: FetchConfig,
    /// Body extraction and length gate.
    pub extract: ExtractConfig,
    /// Relevance vocabulary.
    pub keywords: KeywordConfig,
    /// Snapshot location and checkpoint cadence.
    pub output: OutputConfig,
}

/// Listing API request parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    /// Search endpoint the JSON payload is POSTed to.
    pub api_url: String,
    /// Search term (`key` in the payload).
    pub keyword: String,
    /// Records per listing page.
    pub page_limit: u32,
    pub has_title: bool,
    pub has_content: bool,
    pub is_fuzzy: bool,
    /// Sent as `type`.
    pub search_type: u32,
    /// `2` orders results by time.
    pub sort_type: u32,
    /// Session cookie; the API answers anonymous clients with a captcha page.
    pub cookie: Option<String>,
    pub user_agent: String,
    /// Whole-request timeout for one listing call.
    pub timeout_secs: u64,
    /// Pause between two listing calls.
    pub page_delay_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_url: "http://search.people.cn/search-platform/front/search".to_string(),
            keyword: "政策".to_string(),
            page_limit: 10,
            has_title: true,
            has_content: true,
            is_fuzzy: true,
            search_type: 1,
            sort_type: 2,
            cookie: None,
            user_agent: "Mozilla/5.0".to_string(),
            timeout_secs: 12,
            page_delay_ms: 500,
        }
    }
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }
}

/// Cooldown policy for failed listing calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ListingRetryConfig {
    /// Consecutive failures at one page before the run is declared stalled.
    pub max_attempts: u32,
    /// Cooldown after the first failure; doubles with every further one.
    pub base_cooldown_ms: u64,
    /// Upper bound on a single cooldown, jitter excluded.
    pub max_cooldown_ms: u64,
}

impl Default for ListingRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_cooldown_ms: 5_000,
            max_cooldown_ms: 60_000,
        }
    }
}

/// Harvested date range, walked backwards from `end_date`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowConfig {
    /// Oldest day harvested (inclusive).
    pub start_date: NaiveDate,
    /// First day not harvested.
    pub end_date: NaiveDate,
    /// Window width in days.
    pub days: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap_or_default(),
            end_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap_or_default(),
            days: 1,
        }
    }
}

/// Article page download settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    pub user_agent: String,
    /// Per-attempt timeout, connect through body.
    pub timeout_secs: u64,
    /// Total attempts per URL, first try included.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles each attempt.
    pub backoff_base_ms: u64,
    /// Downloads in flight at once within a batch.
    pub concurrency: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0".to_string(),
            timeout_secs: 15,
            max_attempts: 3,
            backoff_base_ms: 1_000,
            concurrency: 10,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

/// Extraction and relevance thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractConfig {
    /// Blocking workers parsing HTML at once.
    pub workers: usize,
    /// Bodies shorter than this are dropped before keyword matching.
    pub min_body_chars: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            min_body_chars: crate::relevance::MIN_BODY_CHARS,
        }
    }
}

/// Keyword vocabulary; a bare YAML list.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(transparent)]
pub struct KeywordConfig(pub Vec<String>);

impl Default for KeywordConfig {
    fn default() -> Self {
        Self(DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect())
    }
}

/// Where snapshots go and how often checkpoints are taken.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Directory holding both snapshot files.
    pub dir: PathBuf,
    /// Reloadable CSV snapshot, also the resume point.
    pub csv_name: String,
    /// Spreadsheet copy for reading.
    pub xlsx_name: String,
    /// Net-new records (inserted + updated) between checkpoints.
    pub checkpoint_interval: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            csv_name: "people_news_backup_final_deduped.csv".to_string(),
            xlsx_name: "people_news_final_deduped.xlsx".to_string(),
            checkpoint_interval: 20,
        }
    }
}

impl OutputConfig {
    pub fn csv_path(&self) -> PathBuf {
        self.dir.join(&self.csv_name)
    }

    pub fn xlsx_path(&self) -> PathBuf {
        self.dir.join(&self.xlsx_name)
    }
}

impl HarvestConfig {
    /// Parse a config from YAML text.
    ///
    /// # Errors
    ///
    /// [`HarvestError::Yaml`] on malformed YAML, wrong value types or unknown keys.
    pub fn from_yaml(yaml: &str) -> Result<Self, HarvestError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Apply command-line overrides.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(dir) = &cli.output_dir {
            self.output.dir = dir.clone();
        }
        if let Some(start) = cli.start_date {
            self.window.start_date = start;
        }
        if let Some(end) = cli.end_date {
            self.window.end_date = end;
        }
        if let Some(keyword) = &cli.keyword {
            self.search.keyword = keyword.clone();
        }
        if let Some(days) = cli.window_days {
            self.window.days = days;
        }
        if let Some(interval) = cli.checkpoint_interval {
            self.output.checkpoint_interval = interval;
        }
        if let Some(cookie) = &cli.cookie {
            self.search.cookie = Some(cookie.clone());
        }
    }

    /// Reject settings the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// [`HarvestError::Config`] naming the first offending setting.
    pub fn validate(&self) -> Result<(), HarvestError> {
        let invalid = |msg: &str| Err(HarvestError::Config(msg.to_string()));
        if self.window.start_date >= self.window.end_date {
            return invalid("window.start_date must be before window.end_date");
        }
        if self.window.days == 0 {
            return invalid("window.days must be at least 1");
        }
        if self.fetch.max_attempts == 0 || self.listing_retry.max_attempts == 0 {
            return invalid("retry max_attempts must be at least 1");
        }
        if self.fetch.timeout_secs == 0 || self.search.timeout_secs == 0 {
            return invalid("timeout_secs must be at least 1");
        }
        if self.fetch.concurrency == 0 || self.extract.workers == 0 {
            return invalid("fetch.concurrency and extract.workers must be at least 1");
        }
        if self.keywords.0.iter().all(|k| k.trim().is_empty()) {
            return invalid("keywords must contain at least one term");
        }
        if self.search.keyword.trim().is_empty() {
            return invalid("search.keyword must not be empty");
        }
        Ok(())
    }
}

/// Load the config from `path`, or from [`DEFAULT_CONFIG_FILE`] when present,
/// or fall back to defaults.
///
/// # Errors
///
/// An explicit `path` that cannot be read is an error; so is any YAML that
/// [`HarvestConfig::from_yaml`] rejects.
#[instrument(level = "info", skip_all)]
pub fn load_config(path: Option<&Path>) -> Result<HarvestConfig, HarvestError> {
    let path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.exists()),
    };
    match path {
        Some(p) => {
            let yaml = std::fs::read_to_string(&p)?;
            let config = HarvestConfig::from_yaml(&yaml)?;
            info!(path = %p.display(), "Loaded configuration");
            Ok(config)
        }
        None => {
            info!("No config file; using built-in defaults");
            Ok(HarvestConfig::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_defaults_are_valid() {
        let config = HarvestConfig::default();
        config.validate().unwrap();
        assert_eq!(config.keywords.0.len(), 55);
        assert_eq!(config.fetch.timeout(), Duration::from_secs(15));
        assert_eq!(config.fetch.max_attempts, 3);
        assert_eq!(config.output.checkpoint_interval, 20);
        assert_eq!(config.search.page_limit, 10);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = HarvestConfig::from_yaml(
            r#"
window:
  start_date: 2024-01-01
  end_date: 2024-01-08
keywords: [经济, 财政]
fetch:
  timeout_secs: 2
"#,
        )
        .unwrap();
        assert_eq!(config.window.start_date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(config.window.days, 1);
        assert_eq!(config.keywords.0, vec!["经济", "财政"]);
        assert_eq!(config.fetch.timeout(), Duration::from_secs(2));
        assert_eq!(config.fetch.max_attempts, 3);
        assert_eq!(config.search.keyword, "政策");
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = HarvestConfig::from_yaml("{}").unwrap();
        assert_eq!(config.output.csv_name, "people_news_backup_final_deduped.csv");
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = HarvestConfig::default();
        let cli = Cli::parse_from([
            "news_harvest",
            "-o",
            "/tmp/harvest",
            "-k",
            "经济",
            "--window-days",
            "3",
            "--cookie",
            "a=b",
        ]);
        config.apply_cli(&cli);
        assert_eq!(config.output.csv_path(), PathBuf::from("/tmp/harvest/people_news_backup_final_deduped.csv"));
        assert_eq!(config.search.keyword, "经济");
        assert_eq!(config.window.days, 3);
        assert_eq!(config.search.cookie.as_deref(), Some("a=b"));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = HarvestConfig::default();
        config.window.start_date = config.window.end_date;
        assert!(config.validate().is_err());

        let mut config = HarvestConfig::default();
        config.window.days = 0;
        assert!(config.validate().is_err());

        let mut config = HarvestConfig::default();
        config.keywords = KeywordConfig(vec![" ".to_string()]);
        assert!(config.validate().is_err());

        let mut config = HarvestConfig::default();
        config.fetch.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = HarvestConfig::default();
        config.search.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timeouts_are_read_in_seconds() {
        let config =
            HarvestConfig::from_yaml("fetch:\n  timeout_secs: 1\nsearch:\n  timeout_secs: 2\n").unwrap();
        assert_eq!(config.fetch.timeout(), Duration::from_secs(1));
        assert_eq!(config.search.timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        for yaml in [
            "fetch:\n  timeout_ms: 2000\n",
            "search:\n  keywrd: 改革\n",
            "outputs:\n  dir: /tmp\n",
        ] {
            assert!(
                matches!(HarvestConfig::from_yaml(yaml), Err(HarvestError::Yaml(_))),
                "accepted {:?}",
                yaml
            );
        }
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harvest.yaml");
        std::fs::write(&path, "search:\n  keyword: 改革\n").unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.search.keyword, "改革");

        assert!(load_config(Some(&dir.path().join("missing.yaml"))).is_err());
    }
}

//! Data models flowing through the harvest pipeline.
//!
//! - [`CandidateItem`]: one search hit as returned by the listing API
//! - [`FetchResult`]: a candidate plus the decoded HTML of its page, if any
//! - [`ExtractedArticle`]: a candidate that survived extraction and filtering
//! - [`Record`]: the canonical stored row, one per fingerprint
//! - [`UpsertOutcome`]: what the dedup store did with an article
//! - [`Window`]: one slice of the harvested time range

use crate::utils::clean_text;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use itertools::Itertools;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

/// Title used when the search API hands back an item without one.
pub const UNTITLED: &str = "无标题";

/// A raw search hit from the listing API.
///
/// Every field is optional on the wire; the pipeline degrades missing values
/// to empty strings or an absent date instead of rejecting the item.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CandidateItem {
    pub title: Option<String>,
    pub url: Option<String>,
    pub origin_url: Option<String>,
    /// Either epoch seconds/milliseconds or a `YYYY-MM-DD...` string.
    pub display_time: Option<Value>,
    pub publish_time: Option<Value>,
}

impl CandidateItem {
    /// The page to download: `url`, falling back to `originUrl`.
    pub fn fetch_url(&self) -> String {
        let raw = self
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .or(self.origin_url.as_deref())
            .unwrap_or_default();
        clean_text(raw)
    }

    /// The URL stored in the record (always the primary `url` field).
    pub fn record_url(&self) -> String {
        clean_text(self.url.as_deref().unwrap_or_default())
    }

    pub fn clean_title(&self) -> String {
        let title = clean_text(self.title.as_deref().unwrap_or_default());
        if title.is_empty() {
            UNTITLED.to_string()
        } else {
            title
        }
    }

    /// Publication date, preferring `displayTime` over `publishTime`.
    pub fn published_date(&self) -> Option<NaiveDate> {
        let raw = self
            .display_time
            .as_ref()
            .filter(|v| is_present(v))
            .or(self.publish_time.as_ref())?;
        parse_publish_time(raw)
    }
}

fn is_present(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => true,
    }
}

/// Parse the API's loosely typed publish time into a local calendar date.
///
/// Numbers above `1e11` are epoch milliseconds, smaller ones epoch seconds.
/// Strings must start with `YYYY-MM-DD`. Anything else yields `None`.
pub fn parse_publish_time(raw: &Value) -> Option<NaiveDate> {
    if !is_present(raw) {
        return None;
    }
    match raw {
        Value::Number(n) => {
            let x = n.as_f64()?;
            let secs = if x > 1e11 { (x / 1000.0) as i64 } else { x as i64 };
            let utc = DateTime::from_timestamp(secs, 0)?;
            Some(utc.with_timezone(&Local).date_naive())
        }
        Value::String(s) => {
            let head: String = s.chars().take(10).collect();
            NaiveDate::parse_from_str(&head, "%Y-%m-%d").ok()
        }
        _ => None,
    }
}

/// A candidate after the network phase. `html` is `None` when the page could
/// not be downloaded (filtered URL, permanent error, or exhausted retries).
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub item: CandidateItem,
    pub url: String,
    pub html: Option<String>,
}

/// An article that passed extraction and relevance filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedArticle {
    pub title: String,
    pub published_date: Option<NaiveDate>,
    pub url: String,
    pub body: String,
    pub char_count: usize,
    pub matched_keywords: BTreeSet<String>,
}

impl ExtractedArticle {
    pub fn date_string(&self) -> String {
        self.published_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default()
    }
}

/// The canonical stored row.
///
/// Column headers match the snapshot files written by earlier versions of the
/// harvester so old snapshots reload without conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "标题", default)]
    pub title: String,
    /// `YYYY-MM-DD` or empty.
    #[serde(rename = "时间", default)]
    pub published: String,
    #[serde(rename = "URL", default)]
    pub url: String,
    #[serde(rename = "正文", default)]
    pub body: String,
    #[serde(rename = "字数", default, deserialize_with = "lenient_count")]
    pub char_count: usize,
    /// Comma-joined matched keywords.
    #[serde(rename = "命中关键词", default)]
    pub matched_keywords: String,
}

impl Record {
    pub fn body_chars(&self) -> usize {
        self.body.chars().count()
    }
}

impl From<ExtractedArticle> for Record {
    fn from(article: ExtractedArticle) -> Self {
        let published = article.date_string();
        Record {
            title: article.title,
            published,
            url: article.url,
            body: article.body,
            char_count: article.char_count,
            matched_keywords: article.matched_keywords.iter().join(","),
        }
    }
}

// Spreadsheet tools sometimes round-trip integer columns as "123.0" or blanks.
fn lenient_count<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let raw = raw.trim();
    Ok(raw
        .parse::<usize>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().filter(|f| *f >= 0.0).map(|f| f as usize))
        .unwrap_or(0))
}

/// What [`crate::store::DedupStore::upsert`] did with an article.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// New fingerprint, record added.
    Inserted,
    /// Known fingerprint, longer body replaced the stored record.
    Updated,
    /// Known fingerprint, stored record kept.
    Skipped,
}

impl UpsertOutcome {
    /// Inserted and Updated both count towards the checkpoint threshold.
    pub fn is_net_new(self) -> bool {
        matches!(self, UpsertOutcome::Inserted | UpsertOutcome::Updated)
    }
}

/// A half-open time range `[start, end)` queried against the listing API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Window {
    pub fn start_millis(&self) -> i64 {
        local_millis(self.start)
    }

    pub fn end_millis(&self) -> i64 {
        local_millis(self.end)
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} → {}", self.start.date(), self.end.date())
    }
}

// Window bounds are wall-clock times; DST gaps fall back to UTC.
fn local_millis(t: NaiveDateTime) -> i64 {
    t.and_local_timezone(Local)
        .earliest()
        .map(|d| d.timestamp_millis())
        .unwrap_or_else(|| t.and_utc().timestamp_millis())
}

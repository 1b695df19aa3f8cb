//! Durable snapshot files.
//!
//! A snapshot is the full record set of the dedup store written twice:
//!
//! - [`csv_snapshot`]: the reloadable CSV a later run resumes from
//! - [`xlsx_report`]: a spreadsheet copy for people to read
//!
//! Both carry the same rows and the same columns. The CSV is written first
//! and atomically, so a failure writing the spreadsheet never costs the
//! resume point.
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── people_news_backup_final_deduped.csv   # reloadable, UTF-8 with BOM
//! └── people_news_final_deduped.xlsx         # human copy
//! ```

pub mod csv_snapshot;
pub mod xlsx_report;

use crate::config::OutputConfig;
use crate::error::HarvestError;
use crate::models::Record;
use std::path::PathBuf;
use tracing::{info, instrument};

/// Column headers shared by both files.
pub const COLUMNS: [&str; 6] = ["标题", "时间", "URL", "正文", "字数", "命中关键词"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPaths {
    pub csv: PathBuf,
    pub xlsx: PathBuf,
}

impl From<&OutputConfig> for SnapshotPaths {
    fn from(config: &OutputConfig) -> Self {
        Self {
            csv: config.csv_path(),
            xlsx: config.xlsx_path(),
        }
    }
}

/// Write `records` to both snapshot files, overwriting earlier snapshots.
#[instrument(level = "info", skip_all, fields(rows = records.len(), csv = %paths.csv.display()))]
pub fn write_snapshot(paths: &SnapshotPaths, records: &[Record]) -> Result<(), HarvestError> {
    csv_snapshot::write_records(&paths.csv, records)?;
    xlsx_report::write_workbook(&paths.xlsx, records)?;
    info!(xlsx = %paths.xlsx.display(), "Snapshot written");
    Ok(())
}

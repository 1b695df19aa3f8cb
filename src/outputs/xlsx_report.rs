//! Spreadsheet copy of the snapshot for human readers.

use super::COLUMNS;
use crate::error::HarvestError;
use crate::models::Record;
use rust_xlsxwriter::Workbook;
use std::path::Path;
use tracing::{debug, warn};

/// Longest string a single XLSX cell can hold.
pub const MAX_CELL_CHARS: usize = 32_767;

pub fn write_workbook(path: &Path, records: &[Record]) -> Result<(), HarvestError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("articles")?;

    for (col, header) in COLUMNS.iter().enumerate() {
        sheet.write_string(0, col as u16, *header)?;
    }

    for (i, record) in records.iter().enumerate() {
        let row = (i + 1) as u32;
        sheet.write_string(row, 0, cell_text(&record.title))?;
        sheet.write_string(row, 1, cell_text(&record.published))?;
        sheet.write_string(row, 2, cell_text(&record.url))?;
        sheet.write_string(row, 3, cell_text(&record.body))?;
        sheet.write_number(row, 4, record.char_count as f64)?;
        sheet.write_string(row, 5, cell_text(&record.matched_keywords))?;
    }

    workbook.save(path)?;
    debug!(path = %path.display(), rows = records.len(), "Wrote XLSX snapshot");
    Ok(())
}

// The CSV keeps the full text; the spreadsheet cell is cut at the format limit.
fn cell_text(s: &str) -> String {
    if s.chars().count() <= MAX_CELL_CHARS {
        s.to_string()
    } else {
        warn!(chars = s.chars().count(), "Cell text over XLSX limit; truncating");
        s.chars().take(MAX_CELL_CHARS).collect()
    }
}

//! Reloadable CSV snapshot.
//!
//! Written with a UTF-8 byte order mark so spreadsheet tools open the CJK
//! text correctly, and through a sibling temp file plus rename so an
//! interrupted write leaves the previous snapshot intact.

use super::COLUMNS;
use crate::error::HarvestError;
use crate::models::Record;
use csv::{ReaderBuilder, WriterBuilder};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tracing::debug;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub fn write_records(path: &Path, records: &[Record]) -> Result<(), HarvestError> {
    let tmp_path = path.with_extension("csv.tmp");
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(UTF8_BOM)?;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        writer.write_record(COLUMNS)?;
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp_path, path)?;
    debug!(path = %path.display(), rows = records.len(), "Wrote CSV snapshot");
    Ok(())
}

/// Read a snapshot back. Tolerates a leading BOM and missing columns.
pub fn read_records(path: &Path) -> Result<Vec<Record>, HarvestError> {
    let bytes = fs::read(path)?;
    let data = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes[..]);
    let mut reader = ReaderBuilder::new().flexible(true).from_reader(data);
    let records = reader.deserialize().collect::<Result<Vec<Record>, _>>()?;
    debug!(path = %path.display(), rows = records.len(), "Read CSV snapshot");
    Ok(records)
}

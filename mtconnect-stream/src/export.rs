//! History export
//!
//! Pure serializations of a history snapshot. Nothing here touches the live
//! store; callers pass the records they got from `snapshot()`.

use crate::types::{Record, Result, SelectionSet, StreamError, NOT_AVAILABLE, TIMESTAMP_COLUMN};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Write records as CSV: `Timestamp` then the selection labels, in selection order
///
/// # Returns
/// * `Ok(rows)` - number of data rows written (the header is always written)
pub fn write_csv<W: Write>(writer: W, selection: &SelectionSet, records: &[Record]) -> Result<usize> {
    let mut csv = csv::Writer::from_writer(writer);

    let columns: Vec<&str> = std::iter::once(TIMESTAMP_COLUMN)
        .chain(selection.labels())
        .collect();
    csv.write_record(&columns).map_err(export_error)?;

    for record in records {
        let row = columns
            .iter()
            .map(|column| record.get(column).unwrap_or(NOT_AVAILABLE));
        csv.write_record(row).map_err(export_error)?;
    }

    csv.flush()?;
    Ok(records.len())
}

/// Write records as CSV to a file, replacing it
pub fn export_csv(path: &Path, selection: &SelectionSet, records: &[Record]) -> Result<usize> {
    let file = File::create(path)?;
    let rows = write_csv(BufWriter::new(file), selection, records)?;
    log::info!("Exported {} records to {:?}", rows, path);
    Ok(rows)
}

/// Write records as a pretty-printed JSON array of objects
pub fn write_json<W: Write>(writer: W, records: &[Record]) -> Result<()> {
    serde_json::to_writer_pretty(writer, records).map_err(|e| StreamError::Export(e.to_string()))
}

/// `(timestamp, value)` points for one label, skipping `N/A` and non-numeric cells
pub fn numeric_series(records: &[Record], label: &str) -> Vec<(String, f64)> {
    records
        .iter()
        .filter_map(|record| {
            let value = record.get(label)?.parse::<f64>().ok()?;
            Some((record.timestamp().to_string(), value))
        })
        .collect()
}

fn export_error(e: csv::Error) -> StreamError {
    StreamError::Export(e.to_string())
}

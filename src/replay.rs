//! Reads a durable log back into readings.
//!
//! Replaying the data rows of a session log into an empty window of the same
//! capacity reproduces the window the live session ended with (timestamps
//! are only kept to whole seconds in the log).
use std::path::Path;
use chrono::{Local, NaiveDateTime, TimeZone};
use crate::pipeline::{parse_value, HistoryWindow, ReplayError};
use crate::recorder::TIMESTAMP_FORMAT;
use crate::types::Reading;
/// Loads every data row of the log at `path`.
///
/// `channel_count` is the number of value columns expected after the
/// timestamp. Header cells may be padded with spaces.
pub fn read_log(path: &Path, channel_count: usize) -> Result<Vec<Reading>, ReplayError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| ReplayError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    let mut readings = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        // Row 1 is the header.
        let row = idx as u64 + 2;
        let record = record.map_err(|source| ReplayError::Csv { row, source })?;
        readings.push(parse_record(&record, row, channel_count)?);
    }
    Ok(readings)
}
/// Replays `readings` into `window`, applying its usual eviction.
pub fn rebuild_window(window: &mut HistoryWindow, readings: impl IntoIterator<Item = Reading>) {
    window.extend(readings);
}
fn parse_record(
    record: &csv::StringRecord,
    row: u64,
    channel_count: usize,
) -> Result<Reading, ReplayError> {
    if record.len() != channel_count + 1 {
        return Err(ReplayError::FieldCount {
            row,
            expected: channel_count,
            actual: record.len().saturating_sub(1),
        });
    }
    let stamp = &record[0];
    let timestamp = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
        .ok()
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .ok_or_else(|| ReplayError::Timestamp {
            row,
            value: stamp.to_owned(),
        })?;
    let channels = record
        .iter()
        .skip(1)
        .enumerate()
        .map(|(column, field)| {
            parse_value(field).ok_or_else(|| ReplayError::Value {
                row,
                column: column + 1,
                value: field.to_owned(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Reading::new(timestamp, channels))
}

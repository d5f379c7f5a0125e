use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use log::{debug, info};
use crate::pipeline::LogError;
use crate::types::Reading;
/// Timestamp column format shared by the writer and the replay reader.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// Append-only CSV record of every accepted reading.
///
/// The file is opened on the first append. The header row is written at that
/// moment, and only if the file was empty; reopening an existing log just
/// continues it.
pub struct DurableLog {
    path: PathBuf,
    header: Vec<String>,
    writer: Option<csv::Writer<File>>,
    closed: bool,
    rows_written: u64,
}
impl DurableLog {
    pub fn new(path: impl Into<PathBuf>, channel_labels: &[String]) -> Self {
        let header = std::iter::once("timestamp".to_owned())
            .chain(channel_labels.iter().cloned())
            .collect();
        Self {
            path: path.into(),
            header,
            writer: None,
            closed: false,
            rows_written: 0,
        }
    }
    pub fn path(&self) -> &Path {
        &self.path
    }
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }
    /// Writes one row and flushes it before returning.
    pub fn append(&mut self, reading: &Reading) -> Result<(), LogError> {
        let row = render_row(reading);
        let writer = self.ensure_open()?;
        writer.write_record(&row)?;
        writer.flush()?;
        self.rows_written += 1;
        debug!("logged row {}: {}", self.rows_written, row.join(","));
        Ok(())
    }
    /// Flushes and releases the file. Safe to call more than once.
    pub fn close(&mut self) -> Result<(), LogError> {
        self.closed = true;
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            let mut file = writer
                .into_inner()
                .map_err(|e| LogError::Flush(e.into_error()))?;
            file.flush()?;
            info!(
                "Closed log {} ({} rows this session)",
                self.path.display(),
                self.rows_written
            );
        }
        Ok(())
    }
    fn ensure_open(&mut self) -> Result<&mut csv::Writer<File>, LogError> {
        if self.closed {
            return Err(LogError::Closed);
        }
        if self.writer.is_none() {
            let open_err = |source| LogError::Open {
                path: self.path.clone(),
                source,
            };
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .map_err(open_err)?;
            let was_empty = file.metadata().map_err(open_err)?.len() == 0;
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .terminator(csv::Terminator::Any(b'\n'))
                .from_writer(file);
            if was_empty {
                writer.write_record(&self.header)?;
                info!("Started log {}", self.path.display());
            } else {
                info!("Appending to existing log {}", self.path.display());
            }
            self.writer = Some(writer);
        }
        self.writer.as_mut().ok_or(LogError::Closed)
    }
}
/// Renders a reading as a log row: local timestamp then each value in its
/// shortest round-trip form (`21.5`, `3.0`).
pub fn render_row(reading: &Reading) -> Vec<String> {
    std::iter::once(reading.timestamp().format(TIMESTAMP_FORMAT).to_string())
        .chain(reading.channels().iter().map(|v| format!("{v:?}")))
        .collect()
}

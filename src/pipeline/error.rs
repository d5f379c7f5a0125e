use std::io;
use std::path::PathBuf;
use thiserror::Error;
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("line is not valid UTF-8 (valid up to byte {valid_up_to})")]
    InvalidUtf8 { valid_up_to: usize },
}
impl From<std::str::Utf8Error> for DecodeError {
    fn from(value: std::str::Utf8Error) -> Self {
        DecodeError::InvalidUtf8 {
            valid_up_to: value.valid_up_to(),
        }
    }
}
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("failed to open serial port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },
    #[error("failed to enumerate serial ports: {0}")]
    Enumerate(#[source] serialport::Error),
    #[error("stream read failed: {0}")]
    Io(#[from] io::Error),
    #[error("stream is already closed")]
    Closed,
}
#[derive(Debug, Error)]
pub enum LogError {
    #[error("cannot open log {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot write log row: {0}")]
    Write(#[from] csv::Error),
    #[error("cannot flush log: {0}")]
    Flush(#[from] io::Error),
    #[error("log is already closed")]
    Closed,
}
/// Failures that end an ingestion session.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("reading could not be persisted: {0}")]
    Persist(#[source] LogError),
    #[error("stream failure: {0}")]
    Stream(#[source] StreamError),
    #[error("ingestion cycle is closed")]
    Closed,
}
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("cannot read log {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("malformed log row {row}: {source}")]
    Csv {
        row: u64,
        #[source]
        source: csv::Error,
    },
    #[error("row {row}: expected {expected} values, got {actual}")]
    FieldCount {
        row: u64,
        expected: usize,
        actual: usize,
    },
    #[error("row {row}: bad timestamp {value:?}")]
    Timestamp { row: u64, value: String },
    #[error("row {row}: bad value {value:?} in column {column}")]
    Value {
        row: u64,
        column: usize,
        value: String,
    },
}
#[derive(Debug, Error)]
pub enum PlotError {
    #[error("history window is empty")]
    EmptyWindow,
    #[error("failed to render plot: {0}")]
    Draw(String),
    #[error("failed to encode png: {0}")]
    Encode(#[from] image::ImageError),
    #[error("failed to write snapshot: {0}")]
    Io(#[from] io::Error),
}
impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for PlotError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        PlotError::Draw(format!("{value:?}"))
    }
}

// src/types.rs
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// One parsed, timestamped multi-channel sample.
///
/// Readings are immutable once built: the log serializes one copy and the
/// history window buffers another.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Reading {
    timestamp: DateTime<Local>,
    channels: Vec<f64>,
}

impl Reading {
    pub fn new(timestamp: DateTime<Local>, channels: Vec<f64>) -> Self {
        Self {
            timestamp,
            channels,
        }
    }
    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }
    pub fn channels(&self) -> &[f64] {
        &self.channels
    }
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

/// How the display groups channels onto value axes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DisplayLayout {
    /// Single panel, every channel shares one value axis.
    #[default]
    Overlay,
    /// One panel (and one value axis) per channel.
    PerChannel,
}

impl DisplayLayout {
    /// Margin applied to a value axis whose observed range is zero.
    pub fn default_zero_range_margin(self) -> f64 {
        match self {
            DisplayLayout::Overlay => 1000.0,
            DisplayLayout::PerChannel => 0.1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct AxisRange {
    pub min: f64,
    pub max: f64,
}

impl AxisRange {
    pub fn contains(&self, value: f64) -> bool {
        self.min < value && value < self.max
    }
}

/// Value axis for a group of channels drawn on the same panel.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChannelGroupBounds {
    pub channels: Vec<usize>,
    pub y: AxisRange,
}

/// Axis ranges for the current window. Recomputed every tick, never persisted.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DisplayBounds {
    pub x_min: DateTime<Local>,
    pub x_max: DateTime<Local>,
    pub groups: Vec<ChannelGroupBounds>,
}

impl DisplayBounds {
    /// Bounds of the group that draws `channel`, if any.
    pub fn group_for(&self, channel: usize) -> Option<&ChannelGroupBounds> {
        self.groups.iter().find(|g| g.channels.contains(&channel))
    }
}

/// Why a tick produced no reading even though a line arrived.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SkipReason {
    #[error("line is empty")]
    Empty,
    #[error("line is not a candidate reading")]
    NotCandidate,
    #[error("line is not valid text")]
    Undecodable,
    #[error("expected {expected} fields, got {actual}")]
    FieldCount { expected: usize, actual: usize },
    #[error("field {index} is not a finite number")]
    InvalidNumber { index: usize },
}

/// What one tick of the ingestion cycle produced.
#[derive(Clone, Debug, PartialEq)]
pub enum TickOutcome {
    /// The stream yielded nothing before the read timeout.
    NoData,
    /// A line arrived but did not become a reading.
    Skipped(SkipReason),
    /// A reading was persisted, buffered and the bounds recomputed.
    Accepted {
        reading: Reading,
        bounds: DisplayBounds,
    },
}

impl TickOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, TickOutcome::Accepted { .. })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Reading,
    Parsing,
    Persisting,
    Buffering,
    Estimating,
    Closing,
}

/// Counters kept across a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CycleStats {
    pub ticks: u64,
    pub accepted: u64,
    pub skipped: u64,
    pub no_data: u64,
    pub stream_errors: u64,
}

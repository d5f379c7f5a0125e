// src/config.rs
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use crate::pipeline::{CandidacyRule, DEFAULT_DELIMITER};
use crate::types::DisplayLayout;
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0}")]
    Invalid(String),
}
/// Everything fixed at session start. Loaded from an optional JSON file and
/// then overridden by command-line flags.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub port: String,
    pub baud_rate: u32,
    pub output: PathBuf,
    pub window_capacity: usize,
    pub tick_interval_ms: u64,
    pub read_timeout_ms: u64,
    pub channel_labels: Vec<String>,
    pub layout: DisplayLayout,
    /// Value-axis margin for a constant channel; the layout decides when unset.
    pub zero_range_margin: Option<f64>,
    pub candidacy: CandidacyRule,
    pub delimiter: String,
}
impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_owned(),
            // ESP8266 boot ROM speed, so the boot banner is readable too.
            baud_rate: 74_880,
            output: PathBuf::from("arduino_data.csv"),
            window_capacity: 1000,
            tick_interval_ms: 100,
            read_timeout_ms: 1000,
            channel_labels: vec!["tempExt".into(), "tempInt".into(), "battVolt".into()],
            layout: DisplayLayout::Overlay,
            zero_range_margin: None,
            candidacy: CandidacyRule::LeadingDigit,
            delimiter: DEFAULT_DELIMITER.to_owned(),
        }
    }
}
impl SessionConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_owned()));
        if self.window_capacity == 0 {
            return invalid("window_capacity must be at least 1");
        }
        if self.tick_interval_ms == 0 {
            return invalid("tick_interval_ms must be greater than zero");
        }
        if self.baud_rate == 0 {
            return invalid("baud_rate must be greater than zero");
        }
        if self.channel_labels.is_empty() {
            return invalid("at least one channel label is required");
        }
        if self.delimiter.is_empty() {
            return invalid("delimiter must not be empty");
        }
        if let Some(margin) = self.zero_range_margin {
            if !margin.is_finite() || margin <= 0.0 {
                return invalid("zero_range_margin must be a positive number");
            }
        }
        Ok(())
    }
    pub fn channel_count(&self) -> usize {
        self.channel_labels.len()
    }
    pub fn capacity(&self) -> Result<NonZeroUsize, ConfigError> {
        NonZeroUsize::new(self.window_capacity)
            .ok_or_else(|| ConfigError::Invalid("window_capacity must be at least 1".into()))
    }
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
    pub fn effective_zero_range_margin(&self) -> f64 {
        self.zero_range_margin
            .unwrap_or_else(|| self.layout.default_zero_range_margin())
    }
}

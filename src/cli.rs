use std::path::PathBuf;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use crate::config::SessionConfig;
use crate::pipeline::CandidacyRule;
use crate::types::DisplayLayout;
#[derive(Parser)]
#[command(
    name = "sensorlog",
    version,
    about = "Log a serial sensor stream to CSV and plot it live",
    long_about = "Reads `f1, f2, f3` lines from a serial sensor, appends every valid reading \n\
                  to a CSV log and shows a live, auto-rescaling plot of the recent history."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
    #[command(flatten)]
    pub session: SessionArgs,
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}
#[derive(Subcommand)]
pub enum Command {
    /// Log and plot the stream in a window (default)
    Monitor,
    /// Log the stream without a display
    Record(RecordArgs),
    /// Rebuild the history window from an existing log and print it as JSON
    Replay(ReplayArgs),
    /// List serial ports
    Ports,
}
#[derive(Args)]
pub struct RecordArgs {
    /// Stop after this many seconds (runs until killed otherwise)
    #[arg(long)]
    pub duration: Option<f64>,
}
#[derive(Args)]
pub struct ReplayArgs {
    /// Log file to replay (defaults to the configured output)
    pub log: Option<PathBuf>,
    /// Print every buffered reading, not just the summary
    #[arg(long)]
    pub readings: bool,
}
/// Session settings; each flag overrides the config file.
#[derive(Args)]
pub struct SessionArgs {
    /// JSON config file
    #[arg(long, global = true, env = "SENSORLOG_CONFIG")]
    pub config: Option<PathBuf>,
    /// Serial port (e.g. /dev/ttyUSB0, COM4)
    #[arg(long, global = true)]
    pub port: Option<String>,
    /// Baud rate
    #[arg(long, global = true)]
    pub baud: Option<u32>,
    /// CSV log to append to
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,
    /// Number of readings kept for display
    #[arg(long, global = true)]
    pub capacity: Option<usize>,
    /// Tick interval in milliseconds
    #[arg(long, global = true)]
    pub interval_ms: Option<u64>,
    /// Serial read timeout in milliseconds
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,
    /// Comma-separated channel labels, used as CSV column names
    #[arg(long, global = true, value_delimiter = ',')]
    pub labels: Option<Vec<String>>,
    /// Display layout
    #[arg(long, global = true, value_enum)]
    pub layout: Option<DisplayLayout>,
    /// Value-axis margin for a constant channel
    #[arg(long, global = true)]
    pub zero_margin: Option<f64>,
    /// Accept lines starting with a sign or decimal point (negative readings)
    #[arg(long, global = true)]
    pub allow_signed: bool,
    /// Read from a built-in simulated sensor instead of a serial port
    #[arg(long, global = true)]
    pub simulate: bool,
    /// Write a PNG of the final window here when the session ends
    #[arg(long, global = true)]
    pub snapshot: Option<PathBuf>,
}
impl SessionArgs {
    /// Loads the config file (if any), applies the flags and validates.
    pub fn resolve(&self) -> Result<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::load(path)?,
            None => SessionConfig::default(),
        };
        self.apply(&mut config);
        config.validate().context("invalid session settings")?;
        Ok(config)
    }
    fn apply(&self, config: &mut SessionConfig) {
        if let Some(port) = &self.port {
            config.port = port.clone();
        }
        if let Some(baud) = self.baud {
            config.baud_rate = baud;
        }
        if let Some(output) = &self.output {
            config.output = output.clone();
        }
        if let Some(capacity) = self.capacity {
            config.window_capacity = capacity;
        }
        if let Some(interval) = self.interval_ms {
            config.tick_interval_ms = interval;
        }
        if let Some(timeout) = self.timeout_ms {
            config.read_timeout_ms = timeout;
        }
        if let Some(labels) = &self.labels {
            config.channel_labels = labels.iter().map(|l| l.trim().to_owned()).collect();
        }
        if let Some(layout) = self.layout {
            config.layout = layout;
        }
        if let Some(margin) = self.zero_margin {
            config.zero_range_margin = Some(margin);
        }
        if self.allow_signed {
            config.candidacy = CandidacyRule::Signed;
        }
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "sensorlog",
            "record",
            "--duration",
            "8",
            "--port",
            "/dev/ttyUSB1",
            "--labels",
            "a, b",
            "--layout",
            "per-channel",
            "--allow-signed",
        ])
        .unwrap();
        let config = cli.session.resolve().unwrap();
        assert_eq!(config.port, "/dev/ttyUSB1");
        assert_eq!(config.channel_labels, vec!["a", "b"]);
        assert_eq!(config.layout, DisplayLayout::PerChannel);
        assert_eq!(config.candidacy, CandidacyRule::Signed);
        assert!(matches!(
            cli.command,
            Some(Command::Record(RecordArgs { duration: Some(d) })) if d == 8.0
        ));
    }
    #[test]
    fn zero_capacity_is_rejected() {
        let cli = Cli::try_parse_from(["sensorlog", "--capacity", "0"]).unwrap();
        assert!(cli.session.resolve().is_err());
    }
}

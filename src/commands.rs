use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use anyhow::{Context, Result};
use log::{info, warn};
use serde::Serialize;
use signal_hook::consts::{SIGINT, SIGTERM};
use crate::config::SessionConfig;
use crate::gui;
use crate::pipeline::{
    save_window_png, BoundsEstimator, CycleError, HistoryWindow, IngestionCycle, PlotStyle,
    ReadingParser, SensorStream, SimulatedStream,
};
use crate::recorder::DurableLog;
use crate::replay::{read_log, rebuild_window};
use crate::serial::{list_ports, SerialStream};
use crate::types::{CycleStats, DisplayBounds, Reading};
pub type BoxedCycle = IngestionCycle<Box<dyn SensorStream>>;
/// Acquires the stream: the serial port, or the simulator when asked for.
pub fn open_stream(config: &SessionConfig, simulate: bool) -> Result<Box<dyn SensorStream>> {
    if simulate {
        info!("Using the simulated sensor");
        return Ok(Box::new(SimulatedStream::new(rand::random())));
    }
    let stream = SerialStream::open(&config.port, config.baud_rate, config.read_timeout())
        .with_context(|| format!("cannot start logging from {}", config.port))?;
    Ok(Box::new(stream))
}
pub fn build_cycle<S: SensorStream>(config: &SessionConfig, stream: S) -> Result<IngestionCycle<S>> {
    let parser = ReadingParser::new(
        config.channel_count(),
        config.delimiter.clone(),
        config.candidacy,
    );
    let log = DurableLog::new(&config.output, &config.channel_labels);
    let window = HistoryWindow::new(config.capacity()?);
    let estimator = BoundsEstimator::new(config.layout, config.effective_zero_range_margin());
    Ok(IngestionCycle::new(stream, parser, log, window, estimator))
}
/// Flag raised by SIGINT or SIGTERM. Checked between ticks so the session
/// still closes the stream and the log on its way out.
pub fn stop_flag() -> Result<Arc<AtomicBool>> {
    let stop = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&stop))
            .context("cannot install the stop signal handler")?;
    }
    Ok(stop)
}
/// Live display session; returns once the window is closed.
pub fn monitor(config: &SessionConfig, simulate: bool, snapshot: Option<&Path>) -> Result<()> {
    let stop = stop_flag()?;
    let cycle = build_cycle(config, open_stream(config, simulate)?)?;
    let mut cycle = gui::run(cycle, config, stop)?;
    let closed = cycle.close();
    write_snapshot(&cycle, config, snapshot);
    closed.context("session ended with an error")?;
    info!("Session stats: {:?}", cycle.stats());
    Ok(())
}
/// Headless logging at the configured cadence.
pub fn record(
    config: &SessionConfig,
    simulate: bool,
    duration: Option<f64>,
    snapshot: Option<&Path>,
) -> Result<()> {
    let stop = stop_flag()?;
    let mut cycle = build_cycle(config, open_stream(config, simulate)?)?;
    let deadline = duration
        .map(|secs| Duration::try_from_secs_f64(secs).context("--duration must be a positive number"))
        .transpose()?
        .map(|d| Instant::now() + d);
    info!(
        "Recording to {} every {:?}",
        config.output.display(),
        config.tick_interval()
    );
    let result = run_recording(&mut cycle, config.tick_interval(), &stop, deadline);
    write_snapshot(&cycle, config, snapshot);
    let stats = result.context("recording aborted")?;
    print_stats(&stats, cycle.log().rows_written());
    Ok(())
}
/// Ticks until the deadline passes or a stop is requested, then closes.
fn run_recording<S: SensorStream>(
    cycle: &mut IngestionCycle<S>,
    interval: Duration,
    stop: &AtomicBool,
    deadline: Option<Instant>,
) -> Result<CycleStats, CycleError> {
    cycle.run_until(interval, |_| {
        if stop.load(Ordering::Relaxed) {
            info!("Stop requested");
            return true;
        }
        deadline.is_some_and(|d| Instant::now() >= d)
    })
}
#[derive(Serialize)]
struct ReplaySummary<'a> {
    log: &'a Path,
    rows: usize,
    window_len: usize,
    capacity: usize,
    first: Option<&'a Reading>,
    last: Option<&'a Reading>,
    bounds: Option<DisplayBounds>,
    #[serde(skip_serializing_if = "Option::is_none")]
    readings: Option<Vec<Reading>>,
}
/// Rebuilds the window from a log as the live session would have.
pub fn replay(config: &SessionConfig, log: Option<&Path>, with_readings: bool) -> Result<()> {
    let path = log.unwrap_or(config.output.as_path());
    let readings = read_log(path, config.channel_count())?;
    let rows = readings.len();
    let mut window = HistoryWindow::new(config.capacity()?);
    rebuild_window(&mut window, readings);
    let bounds = BoundsEstimator::new(config.layout, config.effective_zero_range_margin())
        .estimate(&window);
    let summary = ReplaySummary {
        log: path,
        rows,
        window_len: window.len(),
        capacity: window.capacity(),
        first: window.values().next(),
        last: window.latest(),
        bounds,
        readings: with_readings.then(|| window.snapshot()),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
pub fn ports() -> Result<()> {
    let ports = list_ports()?;
    if ports.is_empty() {
        println!("No serial ports found.");
    }
    for (name, kind) in ports {
        println!("{name}\t{kind}");
    }
    Ok(())
}
fn write_snapshot<S: SensorStream>(
    cycle: &IngestionCycle<S>,
    config: &SessionConfig,
    path: Option<&Path>,
) {
    let Some(path) = path else { return };
    let Some(bounds) = cycle.bounds() else {
        warn!("No readings yet; skipping snapshot {}", path.display());
        return;
    };
    match save_window_png(
        path,
        cycle.window(),
        bounds,
        &config.channel_labels,
        &PlotStyle::default(),
    ) {
        Ok(()) => info!("Wrote snapshot {}", path.display()),
        Err(e) => warn!("Could not write snapshot {}: {e}", path.display()),
    }
}
fn print_stats(stats: &CycleStats, rows: u64) {
    println!(
        "ticks: {}  accepted: {}  skipped: {}  idle: {}  read errors: {}  rows written: {}",
        stats.ticks, stats.accepted, stats.skipped, stats.no_data, stats.stream_errors, rows
    );
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ScriptedStream;
    #[test]
    fn built_cycle_follows_the_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig {
            output: dir.path().join("out.csv"),
            window_capacity: 2,
            channel_labels: vec!["a".into(), "b".into()],
            ..SessionConfig::default()
        };
        let stream = ScriptedStream::from_lines(["1.0, 2.0", "3.0, 4.0", "5.0, 6.0", "7.0, 8.0, 9.0"]);
        let mut cycle = build_cycle(&config, stream).unwrap();
        let stats = cycle.run_until(Duration::ZERO, |s| s.ticks >= 4).unwrap();
        assert_eq!(stats.accepted, 3);
        assert_eq!(cycle.window().len(), 2);
        let text = std::fs::read_to_string(&config.output).unwrap();
        assert!(text.starts_with("timestamp,a,b\n"));
    }
    #[test]
    fn stop_request_ends_recording_and_releases_the_stream() {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig {
            output: dir.path().join("out.csv"),
            ..SessionConfig::default()
        };
        let stream = ScriptedStream::from_lines(["1.0, 2.0, 3.0"]);
        let closes = stream.close_counter();
        let mut cycle = build_cycle(&config, stream).unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        let raiser = {
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                stop.store(true, Ordering::Relaxed);
            })
        };
        let stats = run_recording(&mut cycle, Duration::from_millis(1), &stop, None).unwrap();
        raiser.join().unwrap();
        assert!(stats.ticks >= 1);
        assert_eq!(stats.accepted, 1);
        assert!(cycle.is_closed());
        assert_eq!(closes.get(), 1);
        let text = std::fs::read_to_string(&config.output).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
    #[test]
    fn record_with_simulator_writes_a_log() {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig {
            output: dir.path().join("sim.csv"),
            tick_interval_ms: 1,
            ..SessionConfig::default()
        };
        record(&config, true, Some(0.05), None).unwrap();
        let text = std::fs::read_to_string(&config.output).unwrap();
        assert!(text.starts_with("timestamp,tempExt,tempInt,battVolt\n"));
        assert!(text.lines().count() > 1);
    }
}

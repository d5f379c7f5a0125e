use std::thread;
use std::time::{Duration, Instant};
use chrono::{DateTime, Local};
use log::{debug, error, info, trace, warn};
use crate::pipeline::bounds::BoundsEstimator;
use crate::pipeline::decoder::decode_line;
use crate::pipeline::error::{CycleError, StreamError};
use crate::pipeline::parser::ReadingParser;
use crate::pipeline::source::SensorStream;
use crate::pipeline::HistoryWindow;
use crate::recorder::DurableLog;
use crate::types::{CycleState, CycleStats, DisplayBounds, SkipReason, TickOutcome};
type Clock = Box<dyn FnMut() -> DateTime<Local>>;
/// One ingestion session: read, parse, persist, buffer and rescale, once per tick.
///
/// Every buffered reading has a matching row in the durable log. The stream
/// and the log are released exactly once, either by [`IngestionCycle::close`]
/// or when the cycle is dropped.
pub struct IngestionCycle<S: SensorStream> {
    stream: S,
    parser: ReadingParser,
    log: DurableLog,
    window: HistoryWindow,
    estimator: BoundsEstimator,
    bounds: Option<DisplayBounds>,
    state: CycleState,
    stats: CycleStats,
    clock: Clock,
    closed: bool,
}
impl<S: SensorStream> IngestionCycle<S> {
    pub fn new(
        stream: S,
        parser: ReadingParser,
        log: DurableLog,
        window: HistoryWindow,
        estimator: BoundsEstimator,
    ) -> Self {
        Self {
            stream,
            parser,
            log,
            window,
            estimator,
            bounds: None,
            state: CycleState::Idle,
            stats: CycleStats::default(),
            clock: Box::new(Local::now),
            closed: false,
        }
    }
    /// Replaces the wall clock used to stamp readings.
    pub fn with_clock(mut self, clock: impl FnMut() -> DateTime<Local> + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }
    pub fn window(&self) -> &HistoryWindow {
        &self.window
    }
    /// Bounds of the current window; `None` until the first reading.
    pub fn bounds(&self) -> Option<&DisplayBounds> {
        self.bounds.as_ref()
    }
    pub fn state(&self) -> CycleState {
        self.state
    }
    pub fn stats(&self) -> CycleStats {
        self.stats
    }
    pub fn stream(&self) -> &S {
        &self.stream
    }
    pub fn log(&self) -> &DurableLog {
        &self.log
    }
    pub fn is_closed(&self) -> bool {
        self.closed
    }
    /// Runs one tick. Only a persistence failure (or a closed stream) is an
    /// error; every other problem is logged and ends the tick early.
    pub fn tick(&mut self) -> Result<TickOutcome, CycleError> {
        if self.closed {
            return Err(CycleError::Closed);
        }
        self.stats.ticks += 1;
        self.state = CycleState::Reading;
        let raw = match self.stream.read_line() {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok(self.no_data()),
            Err(StreamError::Closed) => {
                error!("{} is gone", self.stream.describe());
                if let Err(close_err) = self.close() {
                    warn!("shutdown after losing the stream was incomplete: {close_err}");
                }
                return Err(CycleError::Stream(StreamError::Closed));
            }
            Err(e) => {
                warn!("{} read failed: {e}", self.stream.describe());
                self.stats.stream_errors += 1;
                return Ok(self.no_data());
            }
        };
        trace!("raw_line={:?}", String::from_utf8_lossy(&raw));
        self.state = CycleState::Parsing;
        let line = match decode_line(&raw) {
            Ok(Some(line)) => line,
            Ok(None) => return Ok(self.no_data()),
            Err(e) => {
                warn!("dropping undecodable line: {e}");
                return Ok(self.skip(SkipReason::Undecodable));
            }
        };
        let timestamp = (self.clock)();
        let reading = match self.parser.parse_at(line, timestamp) {
            Ok(reading) => reading,
            Err(reason) => {
                debug!("skipping line {line:?}: {reason}");
                return Ok(self.skip(reason));
            }
        };
        self.state = CycleState::Persisting;
        if let Err(e) = self.log.append(&reading) {
            error!("cannot persist reading to {}: {e}", self.log.path().display());
            if let Err(close_err) = self.close() {
                warn!("shutdown after persistence failure was incomplete: {close_err}");
            }
            return Err(CycleError::Persist(e));
        }
        self.state = CycleState::Buffering;
        self.window.push(reading.clone());
        self.state = CycleState::Estimating;
        self.stats.accepted += 1;
        // The window holds at least the reading just pushed.
        let Some(bounds) = self.estimator.estimate(&self.window) else {
            self.state = CycleState::Idle;
            return Ok(TickOutcome::NoData);
        };
        self.bounds = Some(bounds.clone());
        self.state = CycleState::Idle;
        Ok(TickOutcome::Accepted { reading, bounds })
    }
    /// Ticks every `interval` until `should_close` returns true or a tick
    /// fails, then closes the cycle.
    pub fn run_until(
        &mut self,
        interval: Duration,
        mut should_close: impl FnMut(&CycleStats) -> bool,
    ) -> Result<CycleStats, CycleError> {
        let outcome = loop {
            if should_close(&self.stats) {
                break Ok(());
            }
            let started = Instant::now();
            if let Err(e) = self.tick() {
                break Err(e);
            }
            if let Some(rest) = interval.checked_sub(started.elapsed()) {
                thread::sleep(rest);
            }
        };
        let closed = self.close();
        outcome?;
        closed?;
        Ok(self.stats)
    }
    /// Releases the stream and flushes the log. Runs once; later calls are no-ops.
    pub fn close(&mut self) -> Result<(), CycleError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.state = CycleState::Closing;
        info!("Closing {}...", self.stream.describe());
        let stream = self.stream.close().map_err(CycleError::Stream);
        let log = self.log.close().map_err(CycleError::Persist);
        stream.and(log)
    }
    fn no_data(&mut self) -> TickOutcome {
        self.state = CycleState::Idle;
        self.stats.no_data += 1;
        TickOutcome::NoData
    }
    fn skip(&mut self, reason: SkipReason) -> TickOutcome {
        self.state = CycleState::Idle;
        self.stats.skipped += 1;
        TickOutcome::Skipped(reason)
    }
}
impl<S: SensorStream> Drop for IngestionCycle<S> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("ingestion cycle did not shut down cleanly: {e}");
        }
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::parser::{CandidacyRule, DEFAULT_DELIMITER};
    use crate::pipeline::source::ScriptedStream;
    use crate::replay::{read_log, rebuild_window};
    use crate::types::DisplayLayout;
    use chrono::{SubsecRound, TimeZone};
    use proptest::prelude::*;
    use std::io;
    use std::num::NonZeroUsize;
    use std::path::Path;
    fn labels() -> Vec<String> {
        vec!["tempExt".into(), "tempInt".into(), "battVolt".into()]
    }
    /// Clock that advances one second per reading.
    fn stepping_clock() -> impl FnMut() -> DateTime<Local> {
        stepping_clock_by(chrono::Duration::seconds(1))
    }
    fn stepping_clock_by(step: chrono::Duration) -> impl FnMut() -> DateTime<Local> {
        let mut now = Local.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        move || {
            now += step;
            now
        }
    }
    fn cycle(
        stream: ScriptedStream,
        log_path: &Path,
        capacity: usize,
    ) -> IngestionCycle<ScriptedStream> {
        IngestionCycle::new(
            stream,
            ReadingParser::new(3, DEFAULT_DELIMITER, CandidacyRule::LeadingDigit),
            DurableLog::new(log_path, &labels()),
            HistoryWindow::new(NonZeroUsize::new(capacity).unwrap()),
            BoundsEstimator::for_layout(DisplayLayout::Overlay),
        )
        .with_clock(stepping_clock())
    }
    fn tick_all(cycle: &mut IngestionCycle<ScriptedStream>, n: usize) -> Vec<TickOutcome> {
        (0..n).map(|_| cycle.tick().unwrap()).collect()
    }
    #[test]
    fn garbage_between_readings_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        let stream = ScriptedStream::from_lines(["21.5, 30.2, 3.7", "garbage", "21.6, 30.1, 3.7"]);
        let mut c = cycle(stream, &path, 2);
        let outcomes = tick_all(&mut c, 3);
        assert!(outcomes[0].is_accepted());
        assert_eq!(outcomes[1], TickOutcome::Skipped(SkipReason::NotCandidate));
        assert!(outcomes[2].is_accepted());
        let values: Vec<Vec<f64>> = c.window().values().map(|r| r.channels().to_vec()).collect();
        assert_eq!(values, vec![vec![21.5, 30.2, 3.7], vec![21.6, 30.1, 3.7]]);
        c.close().unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "timestamp,tempExt,tempInt,battVolt");
        assert!(lines[1].ends_with(",21.5,30.2,3.7"));
        assert!(lines[2].ends_with(",21.6,30.1,3.7"));
    }
    #[test]
    fn log_keeps_rows_the_window_evicted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        let stream = ScriptedStream::from_lines(["1.0, 2.0, 3.0", "4.0, 5.0, 6.0", "7.0, 8.0, 9.0"]);
        let mut c = cycle(stream, &path, 1);
        tick_all(&mut c, 3);
        assert_eq!(c.window().len(), 1);
        assert_eq!(c.window().latest().unwrap().channels(), &[7.0, 8.0, 9.0]);
        assert_eq!(c.log().rows_written(), 3);
        c.close().unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 4);
    }
    #[test]
    fn header_appears_once_after_idle_ticks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        let stream = ScriptedStream::new([
            None,
            Some(b"boot\r\n".to_vec()),
            Some(b"\r\n".to_vec()),
            None,
            Some(b"1.5, 2.5, 3.5\r\n".to_vec()),
        ]);
        let mut c = cycle(stream, &path, 10);
        let outcomes = tick_all(&mut c, 5);
        assert_eq!(outcomes[0], TickOutcome::NoData);
        assert_eq!(outcomes[2], TickOutcome::Skipped(SkipReason::Empty));
        assert!(c.bounds().is_some());
        c.close().unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("timestamp").count(), 1);
        assert!(text.starts_with("timestamp,"));
        assert_eq!(text.lines().count(), 2);
    }
    #[test]
    fn malformed_lines_never_touch_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        let stream = ScriptedStream::from_lines([
            "21.5, 30.2",
            "21.5, 30.2, 3.7, 9.9",
            "21.5, warm, 3.7",
            "-3.0, 30.2, 3.7",
        ]);
        let mut c = cycle(stream, &path, 10);
        let outcomes = tick_all(&mut c, 4);
        assert!(outcomes.iter().all(|o| matches!(o, TickOutcome::Skipped(_))));
        assert!(c.window().is_empty());
        assert!(c.bounds().is_none());
        assert_eq!(c.log().rows_written(), 0);
        assert!(!path.exists());
        assert_eq!(c.stats().skipped, 4);
    }
    #[test]
    fn undecodable_bytes_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let stream = ScriptedStream::new([Some(vec![0xfe, 0xff, b'\n'])]);
        let mut c = cycle(stream, &dir.path().join("data.csv"), 10);
        assert_eq!(
            c.tick().unwrap(),
            TickOutcome::Skipped(SkipReason::Undecodable)
        );
        assert_eq!(c.state(), CycleState::Idle);
    }
    #[test]
    fn persistence_failure_is_fatal_and_releases_the_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no-such-dir").join("data.csv");
        let stream = ScriptedStream::from_lines(["1.0, 2.0, 3.0", "4.0, 5.0, 6.0"]);
        let closes = stream.close_counter();
        let mut c = cycle(stream, &path, 10);
        let err = c.tick().unwrap_err();
        assert!(matches!(err, CycleError::Persist(_)));
        assert!(c.window().is_empty());
        assert_eq!(closes.get(), 1);
        assert!(matches!(c.tick(), Err(CycleError::Closed)));
        drop(c);
        assert_eq!(closes.get(), 1);
    }
    #[test]
    fn close_runs_once() {
        let dir = tempfile::tempdir().unwrap();
        let stream = ScriptedStream::from_lines(["1.0, 2.0, 3.0"]);
        let closes = stream.close_counter();
        let mut c = cycle(stream, &dir.path().join("data.csv"), 10);
        c.tick().unwrap();
        c.close().unwrap();
        c.close().unwrap();
        assert_eq!(c.state(), CycleState::Closing);
        drop(c);
        assert_eq!(closes.get(), 1);
    }
    #[test]
    fn drop_releases_the_stream() {
        let dir = tempfile::tempdir().unwrap();
        let stream = ScriptedStream::from_lines(["1.0, 2.0, 3.0"]);
        let closes = stream.close_counter();
        {
            let mut c = cycle(stream, &dir.path().join("data.csv"), 10);
            c.tick().unwrap();
        }
        assert_eq!(closes.get(), 1);
    }
    #[test]
    fn run_until_stops_on_signal_and_closes() {
        let dir = tempfile::tempdir().unwrap();
        let stream = ScriptedStream::from_lines(["1.0, 2.0, 3.0", "x", "2.0, 3.0, 4.0"]);
        let closes = stream.close_counter();
        let mut c = cycle(stream, &dir.path().join("data.csv"), 10);
        let stats = c.run_until(Duration::ZERO, |s| s.ticks >= 5).unwrap();
        assert_eq!(stats.ticks, 5);
        assert_eq!(stats.accepted, 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.no_data, 2);
        assert!(c.is_closed());
        assert_eq!(closes.get(), 1);
    }
    #[test]
    fn io_error_is_an_idle_tick_and_closed_stream_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let stream = ScriptedStream::from_results([
            Err(StreamError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))),
            Ok(Some(b"1.0, 2.0, 3.0\r\n".to_vec())),
            Err(StreamError::Closed),
        ]);
        let closes = stream.close_counter();
        let mut c = cycle(stream, &dir.path().join("data.csv"), 10);
        assert_eq!(c.tick().unwrap(), TickOutcome::NoData);
        assert_eq!(c.stats().stream_errors, 1);
        assert!(c.tick().unwrap().is_accepted());
        assert!(matches!(
            c.tick(),
            Err(CycleError::Stream(StreamError::Closed))
        ));
        assert!(c.is_closed());
        assert_eq!(closes.get(), 1);
        assert!(matches!(c.tick(), Err(CycleError::Closed)));
        assert_eq!(c.log().rows_written(), 1);
    }
    #[test]
    fn replaying_the_log_rebuilds_the_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        let lines = [
            "21.5, 30.2, 3.7",
            "noise",
            "21.6, 30.1, 3.7",
            "21.7, 30.0, 3.69",
            "",
            "21.8, 29.9, 3.69",
        ];
        let mut c = cycle(ScriptedStream::from_lines(lines), &path, 3)
            .with_clock(stepping_clock_by(chrono::Duration::milliseconds(400)));
        tick_all(&mut c, lines.len());
        let live = c.window().snapshot();
        c.close().unwrap();
        let mut rebuilt = HistoryWindow::new(NonZeroUsize::new(3).unwrap());
        rebuild_window(&mut rebuilt, read_log(&path, 3).unwrap());
        // The log keeps whole seconds only.
        let rebuilt = rebuilt.snapshot();
        assert_eq!(rebuilt.len(), live.len());
        for (replayed, recorded) in rebuilt.iter().zip(&live) {
            assert_eq!(replayed.channels(), recorded.channels());
            assert_eq!(replayed.timestamp(), recorded.timestamp().trunc_subsecs(0));
        }
        assert!(live.iter().any(|r| r.timestamp().timestamp_subsec_millis() != 0));
    }
    /// One scripted read.
    #[derive(Clone, Debug)]
    enum Feed {
        Valid([f64; 3]),
        Malformed(String),
        Timeout,
    }
    impl Feed {
        fn read(&self) -> Option<Vec<u8>> {
            match self {
                Feed::Valid([a, b, c]) => Some(format!("{a:?}, {b:?}, {c:?}\r\n").into_bytes()),
                Feed::Malformed(line) => Some(format!("{line}\r\n").into_bytes()),
                Feed::Timeout => None,
            }
        }
    }
    fn feed() -> impl Strategy<Value = Feed> {
        let value = (0u32..100_000).prop_map(|v| f64::from(v) / 100.0);
        prop_oneof![
            3 => [value.clone(), value.clone(), value].prop_map(Feed::Valid),
            2 => prop_oneof![
                Just(String::new()),
                Just("garbage".to_owned()),
                Just("-1.5, 2.0, 3.0".to_owned()),
                Just("1.0, 2.0".to_owned()),
                Just("1.0, 2.0, 3.0, 4.0".to_owned()),
                Just("1.0, warm, 3.0".to_owned()),
                Just("1.0,2.0,3.0".to_owned()),
                Just("1.0, 2.0, inf".to_owned()),
                "[a-z :,]{1,24}",
            ]
            .prop_map(Feed::Malformed),
            1 => Just(Feed::Timeout),
        ]
    }
    proptest! {
        #[test]
        fn window_and_log_follow_the_accepted_readings(
            capacity in 1usize..8,
            feeds in prop::collection::vec(feed(), 0..40),
        ) {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("data.csv");
            let stream = ScriptedStream::new(feeds.iter().map(Feed::read));
            let mut c = cycle(stream, &path, capacity);
            let mut accepted: Vec<Vec<f64>> = Vec::new();
            for f in &feeds {
                let before = (c.window().snapshot(), c.bounds().cloned(), c.log().rows_written());
                let outcome = c.tick().unwrap();
                match f {
                    Feed::Valid(values) => {
                        prop_assert!(outcome.is_accepted());
                        accepted.push(values.to_vec());
                    }
                    Feed::Malformed(_) | Feed::Timeout => {
                        prop_assert!(!outcome.is_accepted());
                        let after = (c.window().snapshot(), c.bounds().cloned(), c.log().rows_written());
                        prop_assert_eq!(after, before);
                    }
                }
                prop_assert!(c.window().len() <= capacity);
            }
            let expected: Vec<Vec<f64>> = accepted
                .iter()
                .skip(accepted.len().saturating_sub(capacity))
                .cloned()
                .collect();
            let buffered: Vec<Vec<f64>> = c.window().values().map(|r| r.channels().to_vec()).collect();
            prop_assert_eq!(buffered, expected);
            prop_assert_eq!(c.log().rows_written(), accepted.len() as u64);
            c.close().unwrap();
            if accepted.is_empty() {
                prop_assert!(!path.exists());
            } else {
                let text = std::fs::read_to_string(&path).unwrap();
                let lines: Vec<&str> = text.lines().collect();
                prop_assert_eq!(lines[0], "timestamp,tempExt,tempInt,battVolt");
                prop_assert_eq!(text.matches("timestamp").count(), 1);
                prop_assert_eq!(lines.len(), accepted.len() + 1);
            }
        }
    }
}

use std::cell::Cell;
use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, ErrorKind, Read};
use std::rc::Rc;
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use crate::pipeline::error::StreamError;
/// Something that yields raw sensor lines with a bounded wait.
pub trait SensorStream {
    /// Reads the next line (terminator included). `Ok(None)` means nothing
    /// complete arrived before the read timeout.
    fn read_line(&mut self) -> Result<Option<Vec<u8>>, StreamError>;
    /// Releases the underlying resource. Later reads fail with
    /// [`StreamError::Closed`].
    fn close(&mut self) -> Result<(), StreamError>;
    fn describe(&self) -> String;
}
impl<S: SensorStream + ?Sized> SensorStream for Box<S> {
    fn read_line(&mut self) -> Result<Option<Vec<u8>>, StreamError> {
        (**self).read_line()
    }
    fn close(&mut self) -> Result<(), StreamError> {
        (**self).close()
    }
    fn describe(&self) -> String {
        (**self).describe()
    }
}
/// Longest line kept while waiting for its terminator. A stream that never
/// sends `\n` (wrong baud rate) is handed out in chunks of this size.
pub const MAX_LINE_BYTES: usize = 4096;
/// Line framing over a byte reader whose reads may time out.
///
/// Bytes of a line cut short by a timeout are kept and completed by a later
/// call instead of being handed out as a truncated line.
pub struct LineReader<R> {
    inner: BufReader<R>,
    pending: Vec<u8>,
}
impl<R: Read> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
            pending: Vec::new(),
        }
    }
    pub fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        let room = MAX_LINE_BYTES.saturating_sub(self.pending.len()) as u64;
        match (&mut self.inner).take(room).read_until(b'\n', &mut self.pending) {
            Ok(0) if self.pending.is_empty() => Ok(None),
            // A full line, the tail of a reader that hit EOF, or a full buffer.
            Ok(_) => Ok(Some(std::mem::take(&mut self.pending))),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                if self.pending.len() >= MAX_LINE_BYTES {
                    Ok(Some(std::mem::take(&mut self.pending)))
                } else {
                    Ok(None)
                }
            }
            Err(e) => Err(e),
        }
    }
}
/// In-memory source useful for tests and deterministic playback.
///
/// `None` entries stand for reads that timed out. Once the script runs out
/// every read times out.
pub struct ScriptedStream {
    queue: VecDeque<Result<Option<Vec<u8>>, StreamError>>,
    closed: bool,
    close_calls: Rc<Cell<usize>>,
}
impl ScriptedStream {
    pub fn new(reads: impl IntoIterator<Item = Option<Vec<u8>>>) -> Self {
        Self::from_results(reads.into_iter().map(Ok))
    }
    /// Script that can also fail, e.g. a port unplugged mid-session.
    pub fn from_results(
        reads: impl IntoIterator<Item = Result<Option<Vec<u8>>, StreamError>>,
    ) -> Self {
        Self {
            queue: reads.into_iter().collect(),
            closed: false,
            close_calls: Rc::new(Cell::new(0)),
        }
    }
    /// One read per line, each terminated with `\r\n` like the firmware does.
    pub fn from_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new(
            lines
                .into_iter()
                .map(|line| Some(format!("{line}\r\n").into_bytes())),
        )
    }
    /// Shared counter of `close` calls, readable after the stream is moved.
    pub fn close_counter(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.close_calls)
    }
}
impl SensorStream for ScriptedStream {
    fn read_line(&mut self) -> Result<Option<Vec<u8>>, StreamError> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        self.queue.pop_front().unwrap_or(Ok(None))
    }
    fn close(&mut self) -> Result<(), StreamError> {
        self.closed = true;
        self.close_calls.set(self.close_calls.get() + 1);
        Ok(())
    }
    fn describe(&self) -> String {
        "scripted".to_owned()
    }
}
/// Synthetic telemetry: external temperature, internal temperature and
/// battery voltage drifting around plausible values.
///
/// Like the real board it first prints a boot banner, which the parser is
/// expected to skip.
pub struct SimulatedStream {
    rng: StdRng,
    boot_lines: VecDeque<&'static str>,
    temp_ext: f64,
    temp_int: f64,
    batt_volt: f64,
    closed: bool,
}
impl SimulatedStream {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            boot_lines: VecDeque::from([
                "",
                " ets Jan  8 2013,rst cause:2, boot mode:(3,6)",
                "load 0x4010f000, len 3460, room 16",
                "sensor node ready",
            ]),
            temp_ext: 18.0,
            temp_int: 27.5,
            batt_volt: 3.9,
            closed: false,
        }
    }
    fn next_sample(&mut self) -> String {
        self.temp_ext = (self.temp_ext + self.rng.gen_range(-0.05..0.05)).clamp(0.5, 45.0);
        self.temp_int = (self.temp_int + self.rng.gen_range(-0.03..0.03)).clamp(5.0, 60.0);
        // The battery only ever discharges.
        self.batt_volt = (self.batt_volt - self.rng.gen_range(0.0..0.0005)).max(3.0);
        format!(
            "{:.2}, {:.2}, {:.3}",
            self.temp_ext, self.temp_int, self.batt_volt
        )
    }
}
impl SensorStream for SimulatedStream {
    fn read_line(&mut self) -> Result<Option<Vec<u8>>, StreamError> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        let line = match self.boot_lines.pop_front() {
            Some(banner) => banner.to_owned(),
            None => self.next_sample(),
        };
        Ok(Some(format!("{line}\r\n").into_bytes()))
    }
    fn close(&mut self) -> Result<(), StreamError> {
        if !self.closed {
            self.closed = true;
            info!("Simulated sensor stopped");
        }
        Ok(())
    }
    fn describe(&self) -> String {
        "simulated sensor".to_owned()
    }
}

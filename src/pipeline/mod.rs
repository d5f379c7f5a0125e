// src/pipeline/mod.rs
// Per-tick ingestion: decode -> parse -> persist -> buffer -> estimate bounds.
pub mod bounds;
pub mod buffer;
pub mod cycle;
pub mod decoder;
pub mod error;
pub mod parser;
pub mod plot;
pub mod source;
pub use bounds::BoundsEstimator;
pub use buffer::HistoryWindow;
pub use cycle::IngestionCycle;
pub use decoder::decode_line;
pub use error::{CycleError, DecodeError, LogError, PlotError, ReplayError, StreamError};
pub use parser::{parse_value, CandidacyRule, ReadingParser, DEFAULT_DELIMITER};
pub use plot::{render_window_png, save_window_png, PlotStyle};
pub use source::{LineReader, ScriptedStream, SensorStream, SimulatedStream};

// src/acquisition/mod.rs
//! Framing, fan-out and the reader threads that drive them

pub mod display;
pub mod engine;
pub mod framing;
pub mod live_buffer;
pub mod reader;
pub mod sink;

pub use display::{DisplayRefresher, Renderer};
pub use engine::{AcquisitionEngine, StopReport};
pub use framing::{format_frame, parse_frame, FrameHealth, SequenceGate, TimestampPolicy};
pub use live_buffer::{DisplayFrame, LiveBuffer, SeriesSnapshot};
pub use reader::{run_reader, ReaderReport, ReaderSettings};
pub use sink::{ChannelSink, Ingest, SampleSink};

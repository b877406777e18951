// src/hal/traits.rs
//! Core traits shared by hardware and simulated sources

use crate::error::{AcquisitionError, StreamError};
use crate::hal::types::{ConnectionState, DeviceCommand, Role, Sample, SourceKind};
use std::time::Duration;

/// Anything that can produce per-role sample streams
pub trait SampleSource: Send {
    fn kind(&self) -> SourceKind;

    /// Open a blocking stream for one role. The stream owns its own handle,
    /// so it can be moved to a reader thread.
    fn open_stream(&mut self, role: Role) -> Result<Box<dyn SampleStream>, AcquisitionError>;

    /// Write a control command to the device serving `role`
    fn send_command(&mut self, role: Role, command: DeviceCommand) -> Result<(), AcquisitionError>;

    fn connection_state(&self, role: Role) -> ConnectionState;

    /// Record that the reader of `role` gave up on its link
    fn mark_faulted(&mut self, _role: Role) {}
}

/// A blocking source of samples for exactly one role
pub trait SampleStream: Send {
    fn role(&self) -> Role;

    /// Wait at most `timeout` for the next sample.
    ///
    /// `Ok(None)` means nothing arrived in time. A malformed frame is
    /// `Err(StreamError::Frame)` and the stream stays usable.
    fn next_sample(&mut self, timeout: Duration) -> Result<Option<Sample>, StreamError>;
}

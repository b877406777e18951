// src/error.rs
//! Unified error handling for the QuickDeck core
//!
//! Each component reports its own error type; `DeckError` consolidates them so
//! front-ends can propagate anything with `?`. The split follows how failures
//! are handled:
//!
//! - [`ConnectError`]: probing or opening a device failed. Recoverable, the
//!   link is left closed.
//! - [`FrameError`]: one malformed line. Counted and dropped; only a long run
//!   of them escalates into [`AcquisitionError::Faulted`].
//! - [`SessionError::InvalidState`]: lifecycle misuse, a programming error.
//! - [`StorageError`]: filesystem failure. Not retried; an open session stays
//!   open so the caller can decide.

use crate::hal::Role;
use crate::session::RecorderState;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for QuickDeck operations
pub type DeckResult<T> = Result<T, DeckError>;

/// Failure to bring up a device link
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("wrong device on {port}: expected reply containing {expected}, got {response:?}")]
    WrongDevice {
        port: String,
        expected: &'static str,
        response: String,
    },

    #[error("no identity reply from {port} within {timeout_ms} ms")]
    Timeout { port: String, timeout_ms: u64 },

    #[error("serial port {port} is busy or unavailable: {reason}")]
    PortBusy { port: String, reason: String },

    #[error("{role} device is already connected on {port}")]
    AlreadyConnected { role: Role, port: String },

    #[error("serial port enumeration failed: {0}")]
    Enumeration(String),

    #[error("I/O error on {port}: {source}")]
    Io {
        port: String,
        #[source]
        source: io::Error,
    },
}

/// A single line that is not a valid frame
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameError {
    #[error("line does not start with {expected},")]
    MissingTag { expected: &'static str },

    #[error("{role} frame needs {expected} fields, got {actual}")]
    FieldCount {
        role: Role,
        expected: usize,
        actual: usize,
    },

    #[error("invalid timestamp {raw:?}")]
    Timestamp { raw: String },

    #[error("value {index} is not a number: {raw:?}")]
    Value { index: usize, raw: String },

    #[error("value {index} is not finite")]
    NonFinite { index: usize },

    #[error("line is not valid UTF-8")]
    Encoding,

    #[error("line exceeds {limit} bytes")]
    LineTooLong { limit: usize },
}

/// Outcome of one stream read that did not yield a sample
#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("link failure: {0}")]
    Io(#[from] io::Error),
}

/// Filesystem failure while writing or reading a session
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("CSV error on {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("JSON error on {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed data in {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| StorageError::Io { path, source }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>) -> impl FnOnce(csv::Error) -> Self {
        let path = path.into();
        move |source| StorageError::Csv { path, source }
    }

    pub(crate) fn json(path: impl Into<PathBuf>) -> impl FnOnce(serde_json::Error) -> Self {
        let path = path.into();
        move |source| StorageError::Json { path, source }
    }
}

/// Session lifecycle and lookup errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("cannot {operation} while recorder is {state}")]
    InvalidState {
        operation: &'static str,
        state: RecorderState,
    },

    #[error("session {name:?} already exists")]
    Duplicate { name: String },

    #[error("session {name:?} not found")]
    NotFound { name: String },

    #[error("invalid session name {name:?}")]
    InvalidName { name: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Failure delivering a sample downstream
#[derive(Debug, Error)]
pub enum SinkError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("sample of role {actual} delivered as {expected}")]
    RoleMismatch { expected: Role, actual: Role },

    #[error("sample consumer disconnected")]
    Disconnected,
}

/// Reader loop failures
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("{0} device is not connected")]
    NotConnected(Role),

    #[error("acquisition is already running")]
    AlreadyRunning,

    #[error("{role} reader faulted after {consecutive} consecutive invalid frames")]
    Faulted { role: Role, consecutive: u32 },

    #[error("{role} link failed: {source}")]
    Io {
        role: Role,
        #[source]
        source: io::Error,
    },

    #[error("{role} sample could not be delivered: {source}")]
    Sink {
        role: Role,
        #[source]
        source: SinkError,
    },

    #[error("could not spawn {role} reader: {source}")]
    Spawn {
        role: Role,
        #[source]
        source: io::Error,
    },
}

/// Top-level error of the crate
#[derive(Debug, Error)]
pub enum DeckError {
    #[error("connection error: {0}")]
    Connect(#[from] ConnectError),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("acquisition error: {0}")]
    Acquisition(#[from] AcquisitionError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl DeckError {
    /// Whether the caller can reasonably retry or carry on
    pub fn is_recoverable(&self) -> bool {
        match self {
            DeckError::Connect(_) | DeckError::Frame(_) => true,
            DeckError::Session(SessionError::InvalidState { .. }) => false,
            DeckError::Session(_) | DeckError::Storage(_) | DeckError::Io(_) => true,
            DeckError::Acquisition(AcquisitionError::Faulted { .. }) => true,
            DeckError::Acquisition(AcquisitionError::AlreadyRunning) => false,
            DeckError::Acquisition(_) => true,
            DeckError::Config(_) | DeckError::Configuration(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConnectError::WrongDevice {
            port: "/dev/ttyACM0".to_string(),
            expected: "STRAIN_ARDUINO_READY",
            response: "MOTION_ARDUINO_READY".to_string(),
        };
        let display = err.to_string();
        assert!(display.contains("/dev/ttyACM0"));
        assert!(display.contains("STRAIN_ARDUINO_READY"));

        let err = FrameError::FieldCount { role: Role::Motion, expected: 11, actual: 4 };
        assert_eq!(err.to_string(), "motion frame needs 11 fields, got 4");
    }

    #[test]
    fn test_error_conversion() {
        let err: DeckError = SessionError::Duplicate { name: "t1".to_string() }.into();
        assert!(matches!(err, DeckError::Session(SessionError::Duplicate { .. })));

        let storage = StorageError::io("/tmp/x")(io::Error::new(io::ErrorKind::Other, "disk full"));
        let err: SessionError = storage.into();
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_recoverability() {
        let invalid: DeckError = SessionError::InvalidState {
            operation: "append",
            state: RecorderState::Idle,
        }
        .into();
        assert!(!invalid.is_recoverable());

        let timeout: DeckError = ConnectError::Timeout { port: "COM3".into(), timeout_ms: 1000 }.into();
        assert!(timeout.is_recoverable());
    }

    #[test]
    fn test_error_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DeckError>();
        assert_send_sync::<AcquisitionError>();
    }
}

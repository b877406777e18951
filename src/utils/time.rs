// src/utils/time.rs
//! Wall-clock access for session naming and metadata stamps

use crate::config::constants::storage;
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, Local};
use parking_lot::Mutex;

/// Time provider trait for dependency injection and testing
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Local system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// Mock clock for deterministic testing
#[derive(Debug)]
pub struct MockClock {
    current: Mutex<DateTime<FixedOffset>>,
}

impl MockClock {
    pub fn new(start: DateTime<FixedOffset>) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    /// Parse an RFC 3339 start time
    pub fn from_rfc3339(start: &str) -> Result<Self, chrono::ParseError> {
        DateTime::parse_from_rfc3339(start).map(Self::new)
    }

    pub fn advance_by(&self, duration: std::time::Duration) {
        let step = ChronoDuration::from_std(duration).unwrap_or(ChronoDuration::zero());
        let mut current = self.current.lock();
        *current += step;
    }

    pub fn set_time(&self, time: DateTime<FixedOffset>) {
        *self.current.lock() = time;
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.current.lock()
    }
}

/// Default session name, `test_YYYYmmdd_HHMMSS`
pub fn default_session_name(at: &DateTime<FixedOffset>) -> String {
    format!(
        "{}{}",
        storage::SESSION_NAME_PREFIX,
        at.format(storage::SESSION_NAME_FORMAT)
    )
}

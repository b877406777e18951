// src/acquisition/framing.rs
//! Line framing and validation for the device text protocol
//!
//! A frame is one newline-terminated ASCII line:
//!
//! ```text
//! STRAIN,<timestamp_ms>,<v1>,...,<v8>
//! MOTION,<timestamp_ms>,<s1_pitch>,<s1_roll>,<s1_yaw>,...,<s3_yaw>
//! ```

use crate::config::constants::protocol;
use crate::error::FrameError;
use crate::hal::{Role, Sample};
use serde::{Deserialize, Serialize};

/// Decode raw line bytes, rejecting anything that is not UTF-8
pub fn decode_line(bytes: &[u8]) -> Result<&str, FrameError> {
    std::str::from_utf8(bytes).map_err(|_| FrameError::Encoding)
}

/// Parse one line into a sample of `role`
pub fn parse_frame(role: Role, line: &str) -> Result<Sample, FrameError> {
    let line = line.trim();
    let tag = role.tag();

    let body = line
        .strip_prefix(tag)
        .and_then(|rest| rest.strip_prefix(protocol::FIELD_SEPARATOR))
        .ok_or(FrameError::MissingTag { expected: tag })?;

    let fields: Vec<&str> = body.split(protocol::FIELD_SEPARATOR).collect();
    let expected = role.value_count() + 2;
    // tag + timestamp + values
    let actual = fields.len() + 1;
    if actual != expected {
        return Err(FrameError::FieldCount { role, expected, actual });
    }

    let raw_ts = fields[0].trim();
    let timestamp = raw_ts.parse::<u64>().map_err(|_| FrameError::Timestamp {
        raw: raw_ts.to_string(),
    })?;

    let mut values = Vec::with_capacity(role.value_count());
    for (index, raw) in fields[1..].iter().enumerate() {
        let raw = raw.trim();
        let value = raw.parse::<f64>().map_err(|_| FrameError::Value {
            index,
            raw: raw.to_string(),
        })?;
        if !value.is_finite() {
            return Err(FrameError::NonFinite { index });
        }
        values.push(value);
    }

    Sample::new(role, timestamp, values)
}

/// Render a sample back into its wire form
pub fn format_frame(sample: &Sample) -> String {
    let mut line = format!("{},{}", sample.role().tag(), sample.timestamp());
    for value in sample.values() {
        line.push(protocol::FIELD_SEPARATOR);
        line.push_str(&value.to_string());
    }
    line
}

/// Valid/invalid frame accounting for one role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHealth {
    threshold: u32,
    valid: u64,
    invalid: u64,
    consecutive_invalid: u32,
}

impl FrameHealth {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            valid: 0,
            invalid: 0,
            consecutive_invalid: 0,
        }
    }

    pub fn record_valid(&mut self) {
        self.valid += 1;
        self.consecutive_invalid = 0;
    }

    /// Count an invalid frame; true once the run exceeds the threshold
    pub fn record_invalid(&mut self) -> bool {
        self.invalid += 1;
        self.consecutive_invalid = self.consecutive_invalid.saturating_add(1);
        self.is_faulted()
    }

    pub fn is_faulted(&self) -> bool {
        self.consecutive_invalid > self.threshold
    }

    pub fn valid(&self) -> u64 {
        self.valid
    }

    pub fn invalid(&self) -> u64 {
        self.invalid
    }

    pub fn consecutive_invalid(&self) -> u32 {
        self.consecutive_invalid
    }
}

/// What to do with device timestamps that go backwards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampPolicy {
    /// Record every sample as observed
    #[default]
    AcceptAll,
    /// Drop samples older than the last accepted one
    NonDecreasing,
    /// Drop samples not newer than the last accepted one
    StrictlyIncreasing,
}

/// Per-role admission check against the timestamp policy.
/// Rejected samples are dropped, never reordered.
#[derive(Debug, Clone)]
pub struct SequenceGate {
    policy: TimestampPolicy,
    last: Option<u64>,
    rejected: u64,
}

impl SequenceGate {
    pub fn new(policy: TimestampPolicy) -> Self {
        Self {
            policy,
            last: None,
            rejected: 0,
        }
    }

    pub fn admit(&mut self, timestamp: u64) -> bool {
        let accepted = match (self.policy, self.last) {
            (TimestampPolicy::AcceptAll, _) | (_, None) => true,
            (TimestampPolicy::NonDecreasing, Some(last)) => timestamp >= last,
            (TimestampPolicy::StrictlyIncreasing, Some(last)) => timestamp > last,
        };
        if accepted {
            self.last = Some(timestamp);
        } else {
            self.rejected += 1;
        }
        accepted
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}

// src/session/mod.rs
//! Test sessions: recording, summaries and the on-disk catalog
//!
//! Each session lives in its own directory under the storage base:
//!
//! ```text
//! <base>/<name>/strain_data.csv
//! <base>/<name>/motion_data.csv
//! <base>/<name>/metadata.json
//! <base>/<name>/summary.json     (after finalize)
//! ```

pub mod catalog;
pub mod recorder;
pub mod stats;

pub use catalog::{SessionCatalog, SessionData, SessionInfo};
pub use recorder::{RecorderState, SessionRecorder};
pub use stats::{ChannelStatistics, RunningStats, SessionStats};

use crate::config::constants::protocol;
use crate::error::{SessionError, StorageError};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::warn;

/// Metadata keys owned by the recorder
pub const RESERVED_METADATA_KEYS: [&str; 8] = [
    "test_name",
    "start_time",
    "end_time",
    "strain_channels",
    "motion_sensors",
    "sample_rate_strain",
    "sample_rate_motion",
    "summary",
];

/// Channel layout recorded with every session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub strain_channels: usize,
    pub motion_sensors: usize,
    /// Nominal strain rate in Hz
    pub sample_rate_strain: u32,
    /// Nominal motion rate in Hz
    pub sample_rate_motion: u32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            strain_channels: protocol::STRAIN_CHANNEL_COUNT,
            motion_sensors: protocol::MOTION_SENSOR_COUNT,
            sample_rate_strain: protocol::NOMINAL_STRAIN_RATE_HZ,
            sample_rate_motion: protocol::NOMINAL_MOTION_RATE_HZ,
        }
    }
}

/// Statistics computed when a session is finalized
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Summary {
    pub strain_statistics: BTreeMap<String, ChannelStatistics>,
    pub motion_statistics: BTreeMap<String, ChannelStatistics>,
    /// Largest absolute pitch per motion sensor
    pub max_angle: BTreeMap<String, f64>,
    pub duration_ms: u64,
    pub duration_seconds: f64,
    pub strain_samples: u64,
    pub motion_samples: u64,
}

/// Contents of `metadata.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub test_name: String,
    pub start_time: DateTime<FixedOffset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<FixedOffset>>,
    #[serde(flatten)]
    pub channel_config: ChannelConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Summary>,
    /// Caller-supplied key/values
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SessionMetadata {
    pub fn new(test_name: &str, start_time: DateTime<FixedOffset>) -> Self {
        Self {
            test_name: test_name.to_string(),
            start_time,
            end_time: None,
            channel_config: ChannelConfig::default(),
            summary: None,
            extra: Map::new(),
        }
    }

    /// Merge caller values, skipping keys the recorder owns
    pub fn merge_extra(&mut self, values: Map<String, Value>) {
        for (key, value) in values {
            if RESERVED_METADATA_KEYS.contains(&key.as_str()) {
                warn!(key = %key, "Ignoring reserved metadata key");
                continue;
            }
            self.extra.insert(key, value);
        }
    }
}

/// One test run
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub name: String,
    pub directory: PathBuf,
    pub start_time: DateTime<FixedOffset>,
    pub end_time: Option<DateTime<FixedOffset>>,
    pub channel_config: ChannelConfig,
    pub summary: Option<Summary>,
}

/// Session names must be a single, ordinary path component
pub fn validate_name(name: &str) -> Result<(), SessionError> {
    let mut components = Path::new(name).components();
    let single_normal = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if name.trim().is_empty() || !single_normal || name.contains(['/', '\\']) {
        return Err(SessionError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Write JSON through a temporary file so readers never see a torn document
pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let tmp = path.with_extension("json.tmp");
    let body = serde_json::to_vec_pretty(value).map_err(StorageError::json(path))?;
    fs::write(&tmp, body).map_err(StorageError::io(&tmp))?;
    fs::rename(&tmp, path).map_err(StorageError::io(path))
}

pub(crate) fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
    let body = fs::read(path).map_err(StorageError::io(path))?;
    serde_json::from_slice(&body).map_err(StorageError::json(path))
}

// src/hal/types.rs
//! Core types shared by hardware and simulated sample sources

use crate::config::constants::{display, protocol, storage};
use crate::error::FrameError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which microcontroller, and which channel group, a sample belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Strain,
    Motion,
}

impl Role {
    /// Both roles, strain first
    pub const ALL: [Role; 2] = [Role::Strain, Role::Motion];

    /// Frame tag emitted by the device
    pub fn tag(self) -> &'static str {
        match self {
            Role::Strain => protocol::STRAIN_TAG,
            Role::Motion => protocol::MOTION_TAG,
        }
    }

    /// Token the device answers to an identity probe with
    pub fn ready_token(self) -> &'static str {
        match self {
            Role::Strain => protocol::STRAIN_READY_TOKEN,
            Role::Motion => protocol::MOTION_READY_TOKEN,
        }
    }

    /// Number of values carried by one frame
    pub fn value_count(self) -> usize {
        match self {
            Role::Strain => protocol::STRAIN_CHANNEL_COUNT,
            Role::Motion => protocol::MOTION_VALUE_COUNT,
        }
    }

    pub fn nominal_rate_hz(self) -> u32 {
        match self {
            Role::Strain => protocol::NOMINAL_STRAIN_RATE_HZ,
            Role::Motion => protocol::NOMINAL_MOTION_RATE_HZ,
        }
    }

    pub fn data_file(self) -> &'static str {
        match self {
            Role::Strain => storage::STRAIN_FILE,
            Role::Motion => storage::MOTION_FILE,
        }
    }

    /// Value column names, without the leading timestamp column
    pub fn column_names(self) -> Vec<String> {
        match self {
            Role::Strain => (1..=protocol::STRAIN_CHANNEL_COUNT)
                .map(|i| format!("strain{i}"))
                .collect(),
            Role::Motion => (1..=protocol::MOTION_SENSOR_COUNT)
                .flat_map(|i| {
                    ["pitch", "roll", "yaw"]
                        .into_iter()
                        .map(move |axis| format!("sensor{i}_{axis}"))
                })
                .collect(),
        }
    }

    /// Full header row of the role's data file
    pub fn header(self) -> Vec<String> {
        let mut header = vec![storage::TIMESTAMP_COLUMN.to_string()];
        header.extend(self.column_names());
        header
    }

    fn index(self) -> usize {
        match self {
            Role::Strain => 0,
            Role::Motion => 1,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Strain => write!(f, "strain"),
            Role::Motion => write!(f, "motion"),
        }
    }
}

/// Fixed two-slot map keyed by role
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerRole<T> {
    slots: [T; 2],
}

impl<T> PerRole<T> {
    pub fn new(strain: T, motion: T) -> Self {
        Self { slots: [strain, motion] }
    }

    pub fn get(&self, role: Role) -> &T {
        &self.slots[role.index()]
    }

    pub fn get_mut(&mut self, role: Role) -> &mut T {
        &mut self.slots[role.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Role, &T)> {
        Role::ALL.into_iter().zip(self.slots.iter())
    }
}

/// One timestamped frame of readings
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    timestamp: u64,
    role: Role,
    values: Vec<f64>,
}

impl Sample {
    /// Build a sample, enforcing the value count of the role
    pub fn new(role: Role, timestamp: u64, values: Vec<f64>) -> Result<Self, FrameError> {
        if values.len() != role.value_count() {
            return Err(FrameError::FieldCount {
                role,
                expected: role.value_count() + 2,
                actual: values.len() + 2,
            });
        }
        Ok(Self { timestamp, role, values })
    }

    /// Device-assigned timestamp in milliseconds
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Pitch angles of the motion sensors (every third value)
    pub fn pitches(&self) -> impl Iterator<Item = f64> + '_ {
        let count = match self.role {
            Role::Motion => protocol::MOTION_SENSOR_COUNT,
            Role::Strain => 0,
        };
        self.values.iter().copied().step_by(protocol::AXES_PER_SENSOR).take(count)
    }
}

/// Serial port discovered on the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    pub device_id: String,
    pub description: String,
}

/// Link state of one role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// Port open, identity probe pending
    Connecting,
    Connected,
    Faulted,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Faulted => "faulted",
        };
        f.write_str(label)
    }
}

/// One physical (or simulated) source bound to a role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub device_id: String,
    pub role: Role,
    pub state: ConnectionState,
}

/// Fire-and-forget control commands understood by the devices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    Identity,
    /// Zero the strain bridges
    Tare,
    /// Recalibrate the motion sensors
    Calibrate,
}

impl DeviceCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceCommand::Identity => protocol::IDENTITY_PROBE,
            DeviceCommand::Tare => protocol::TARE_COMMAND,
            DeviceCommand::Calibrate => protocol::CALIBRATE_COMMAND,
        }
    }

    /// Wire form, newline terminated
    pub fn to_line(self) -> String {
        format!("{}{}", self.as_str(), protocol::LINE_TERMINATOR)
    }
}

/// Which implementation feeds the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Hardware,
    #[default]
    Simulated,
}

/// Identifier of one live display series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeriesId(usize);

impl SeriesId {
    pub const COUNT: usize = display::SERIES_COUNT;

    /// Strain channel, zero based
    pub fn strain(channel: usize) -> Option<Self> {
        (channel < protocol::STRAIN_CHANNEL_COUNT).then_some(Self(channel))
    }

    /// Pitch of a motion sensor, zero based
    pub fn pitch(sensor: usize) -> Option<Self> {
        (sensor < protocol::MOTION_SENSOR_COUNT)
            .then_some(Self(protocol::STRAIN_CHANNEL_COUNT + sensor))
    }

    pub fn all() -> impl Iterator<Item = SeriesId> {
        (0..Self::COUNT).map(SeriesId)
    }

    pub fn of_role(role: Role) -> impl Iterator<Item = SeriesId> {
        let range = match role {
            Role::Strain => 0..protocol::STRAIN_CHANNEL_COUNT,
            Role::Motion => protocol::STRAIN_CHANNEL_COUNT..Self::COUNT,
        };
        range.map(SeriesId)
    }

    pub fn role(self) -> Role {
        if self.0 < protocol::STRAIN_CHANNEL_COUNT {
            Role::Strain
        } else {
            Role::Motion
        }
    }

    pub fn index(self) -> usize {
        self.0
    }

    pub fn label(self) -> String {
        match self.role() {
            Role::Strain => format!("strain{}", self.0 + 1),
            Role::Motion => format!("sensor{}_pitch", self.0 - protocol::STRAIN_CHANNEL_COUNT + 1),
        }
    }
}

// src/config/mod.rs
//! Configuration management for the rig core

pub mod constants;
pub mod loader;

pub use constants::*;
pub use loader::{ConfigError, ConfigLoader};

use crate::acquisition::framing::TimestampPolicy;
use crate::hal::{Role, SourceKind};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Complete system configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct SystemConfig {
    #[serde(default)]
    pub serial: SerialSettings,
    #[serde(default)]
    pub acquisition: AcquisitionSettings,
    #[serde(default)]
    pub simulator: SimulatorSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub display: DisplaySettings,
}

/// Serial link settings shared by both devices
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SerialSettings {
    #[serde(default = "defaults::baud_rate")]
    pub baud_rate: u32,

    /// How long the identity probe waits for a reply
    #[serde(default = "defaults::read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Pause after opening the port before probing
    #[serde(default = "defaults::settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Read timeout of the reader loop, bounds stop latency
    #[serde(default = "defaults::poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "defaults::max_line_length")]
    pub max_line_length: usize,

    /// Ports connected when the hardware source is selected
    #[serde(default)]
    pub strain_port: Option<String>,

    #[serde(default)]
    pub motion_port: Option<String>,
}

/// Reader loop behavior
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AcquisitionSettings {
    #[serde(default = "defaults::source")]
    pub source: SourceKind,

    /// Consecutive invalid frames tolerated before a role faults
    #[serde(default = "defaults::fault_threshold")]
    pub fault_threshold: u32,

    #[serde(default = "defaults::stop_timeout_ms")]
    pub stop_timeout_ms: u64,

    #[serde(default)]
    pub timestamp_policy: TimestampPolicy,

    /// Drop a hardware line identical to the previous one
    #[serde(default)]
    pub dedupe_repeated_lines: bool,
}

/// Simulated load rig
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SimulatorSettings {
    #[serde(default = "defaults::strain_interval_ms")]
    pub strain_interval_ms: u64,

    #[serde(default = "defaults::motion_interval_ms")]
    pub motion_interval_ms: u64,

    /// Load model resolution
    #[serde(default = "defaults::tick_ms")]
    pub tick_ms: u64,

    #[serde(default = "defaults::load_step_per_tick")]
    pub load_step_per_tick: f64,

    #[serde(default = "defaults::manual_load_step")]
    pub manual_load_step: f64,

    #[serde(default = "defaults::max_load")]
    pub max_load: f64,

    #[serde(default = "defaults::noise_enabled")]
    pub noise_enabled: bool,

    /// Fixed noise seed; entropy when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StorageSettings {
    #[serde(default = "defaults::base_dir")]
    pub base_dir: PathBuf,

    /// fsync data files after every appended row
    #[serde(default)]
    pub sync_on_append: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DisplaySettings {
    #[serde(default = "defaults::capacity")]
    pub capacity: usize,

    #[serde(default = "defaults::refresh_interval_ms")]
    pub refresh_interval_ms: u64,

    #[serde(default = "defaults::extreme_floor")]
    pub extreme_floor: f64,
}

/// Default value providers using constants
mod defaults {
    use crate::config::constants::*;
    use crate::hal::SourceKind;
    use std::path::PathBuf;

    pub fn baud_rate() -> u32 { serial::DEFAULT_BAUD_RATE }
    pub fn read_timeout_ms() -> u64 { serial::DEFAULT_READ_TIMEOUT_MS }
    pub fn settle_delay_ms() -> u64 { serial::DEFAULT_SETTLE_DELAY_MS }
    pub fn poll_interval_ms() -> u64 { serial::DEFAULT_POLL_INTERVAL_MS }
    pub fn max_line_length() -> usize { serial::DEFAULT_MAX_LINE_LENGTH }

    pub fn source() -> SourceKind { SourceKind::Simulated }
    pub fn fault_threshold() -> u32 { acquisition::DEFAULT_FAULT_THRESHOLD }
    pub fn stop_timeout_ms() -> u64 { acquisition::DEFAULT_STOP_TIMEOUT_MS }

    pub fn strain_interval_ms() -> u64 { simulation::DEFAULT_STRAIN_INTERVAL_MS }
    pub fn motion_interval_ms() -> u64 { simulation::DEFAULT_MOTION_INTERVAL_MS }
    pub fn tick_ms() -> u64 { simulation::DEFAULT_TICK_MS }
    pub fn load_step_per_tick() -> f64 { simulation::DEFAULT_LOAD_STEP_PER_TICK }
    pub fn manual_load_step() -> f64 { simulation::DEFAULT_MANUAL_LOAD_STEP }
    pub fn max_load() -> f64 { simulation::DEFAULT_MAX_LOAD }
    pub fn noise_enabled() -> bool { true }

    pub fn base_dir() -> PathBuf { PathBuf::from(storage::DEFAULT_BASE_DIR) }

    pub fn capacity() -> usize { display::DEFAULT_CAPACITY }
    pub fn refresh_interval_ms() -> u64 { display::DEFAULT_REFRESH_INTERVAL_MS }
    pub fn extreme_floor() -> f64 { display::DEFAULT_EXTREME_FLOOR }
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: defaults::baud_rate(),
            read_timeout_ms: defaults::read_timeout_ms(),
            settle_delay_ms: defaults::settle_delay_ms(),
            poll_interval_ms: defaults::poll_interval_ms(),
            max_line_length: defaults::max_line_length(),
            strain_port: None,
            motion_port: None,
        }
    }
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            source: defaults::source(),
            fault_threshold: defaults::fault_threshold(),
            stop_timeout_ms: defaults::stop_timeout_ms(),
            timestamp_policy: TimestampPolicy::default(),
            dedupe_repeated_lines: false,
        }
    }
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            strain_interval_ms: defaults::strain_interval_ms(),
            motion_interval_ms: defaults::motion_interval_ms(),
            tick_ms: defaults::tick_ms(),
            load_step_per_tick: defaults::load_step_per_tick(),
            manual_load_step: defaults::manual_load_step(),
            max_load: defaults::max_load(),
            noise_enabled: defaults::noise_enabled(),
            seed: None,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            base_dir: defaults::base_dir(),
            sync_on_append: false,
        }
    }
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            capacity: defaults::capacity(),
            refresh_interval_ms: defaults::refresh_interval_ms(),
            extreme_floor: defaults::extreme_floor(),
        }
    }
}

impl SerialSettings {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn port(&self, role: Role) -> Option<&str> {
        match role {
            Role::Strain => self.strain_port.as_deref(),
            Role::Motion => self.motion_port.as_deref(),
        }
    }
}

impl AcquisitionSettings {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

impl DisplaySettings {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

/// Configuration utility functions
impl SystemConfig {
    /// Validate configuration consistency
    pub fn validate_consistency(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !(serial::MIN_BAUD_RATE..=serial::MAX_BAUD_RATE).contains(&self.serial.baud_rate) {
            errors.push(format!(
                "Baud rate {} outside supported range {}..={}",
                self.serial.baud_rate,
                serial::MIN_BAUD_RATE,
                serial::MAX_BAUD_RATE
            ));
        }
        if self.serial.read_timeout_ms == 0 {
            errors.push("Identity read timeout must be greater than zero".to_string());
        }
        if self.serial.poll_interval_ms == 0 {
            errors.push("Reader poll interval must be greater than zero".to_string());
        }
        // Stop must be able to observe at least one poll cycle
        if self.serial.poll_interval_ms >= self.acquisition.stop_timeout_ms {
            errors.push(format!(
                "Poll interval ({} ms) must be shorter than stop timeout ({} ms)",
                self.serial.poll_interval_ms, self.acquisition.stop_timeout_ms
            ));
        }
        if self.serial.max_line_length < serial::MIN_LINE_LENGTH {
            errors.push(format!(
                "Maximum line length must be at least {} bytes",
                serial::MIN_LINE_LENGTH
            ));
        }

        if self.acquisition.fault_threshold == 0 {
            errors.push("Fault threshold must be greater than zero".to_string());
        }

        let sim = &self.simulator;
        if sim.strain_interval_ms == 0 || sim.motion_interval_ms == 0 {
            errors.push("Simulator emission intervals must be greater than zero".to_string());
        }
        if sim.tick_ms == 0 {
            errors.push("Simulator tick must be greater than zero".to_string());
        }
        if !(sim.max_load.is_finite() && sim.max_load > 0.0) {
            errors.push(format!("Maximum load must be positive, got {}", sim.max_load));
        }
        if !(sim.load_step_per_tick.is_finite() && sim.load_step_per_tick > 0.0) {
            errors.push("Load ramp step must be positive".to_string());
        }
        if !(sim.manual_load_step.is_finite() && sim.manual_load_step > 0.0) {
            errors.push("Manual load step must be positive".to_string());
        }

        if self.storage.base_dir.as_os_str().is_empty() {
            errors.push("Storage base directory must not be empty".to_string());
        }

        if self.display.capacity == 0 {
            errors.push("Display capacity must be greater than zero".to_string());
        }
        if self.display.refresh_interval_ms == 0 {
            errors.push("Display refresh interval must be greater than zero".to_string());
        }
        if !(self.display.extreme_floor.is_finite() && self.display.extreme_floor >= 0.0) {
            errors.push("Display extreme floor must be a non-negative number".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_creation() {
        let config = SystemConfig::default();
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.acquisition.fault_threshold, 50);
        assert_eq!(config.display.capacity, 500);
        assert_eq!(config.acquisition.source, SourceKind::Simulated);
        assert!(config.validate_consistency().is_ok());
    }

    #[test]
    fn test_serial_port_per_role() {
        let mut serial = SerialSettings::default();
        assert_eq!(serial.port(Role::Strain), None);

        serial.motion_port = Some("/dev/ttyACM1".to_string());
        assert_eq!(serial.port(Role::Strain), None);
        assert_eq!(serial.port(Role::Motion), Some("/dev/ttyACM1"));
    }

    #[test]
    fn test_config_serialization() {
        let mut config = SystemConfig::default();
        config.simulator.seed = Some(7);
        config.acquisition.timestamp_policy = TimestampPolicy::StrictlyIncreasing;

        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: SystemConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_sections_use_defaults() {
        let config: SystemConfig = toml::from_str("[display]\ncapacity = 42\n").unwrap();
        assert_eq!(config.display.capacity, 42);
        assert_eq!(config.display.refresh_interval_ms, 100);
        assert_eq!(config.serial.settle_delay_ms, 2_000);
    }

    #[test]
    fn test_config_validation() {
        let mut config = SystemConfig::default();
        config.display.capacity = 0;
        config.serial.poll_interval_ms = 5_000;

        let errors = config.validate_consistency().unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}

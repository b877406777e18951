// src/config/constants.rs
//! System-wide configuration constants

/// Device line protocol
pub mod protocol {
    pub const IDENTITY_PROBE: &str = "IDENTITY";
    pub const TARE_COMMAND: &str = "TARE";
    pub const CALIBRATE_COMMAND: &str = "CALIBRATE";

    pub const STRAIN_TAG: &str = "STRAIN";
    pub const MOTION_TAG: &str = "MOTION";
    pub const STRAIN_READY_TOKEN: &str = "STRAIN_ARDUINO_READY";
    pub const MOTION_READY_TOKEN: &str = "MOTION_ARDUINO_READY";

    pub const FIELD_SEPARATOR: char = ',';
    pub const LINE_TERMINATOR: &str = "\n";

    pub const STRAIN_CHANNEL_COUNT: usize = 8;
    pub const MOTION_SENSOR_COUNT: usize = 3;
    pub const AXES_PER_SENSOR: usize = 3;
    pub const MOTION_VALUE_COUNT: usize = MOTION_SENSOR_COUNT * AXES_PER_SENSOR;

    /// Nominal device output rates, recorded in session metadata
    pub const NOMINAL_STRAIN_RATE_HZ: u32 = 10;
    pub const NOMINAL_MOTION_RATE_HZ: u32 = 100;
}

/// Serial link constants
pub mod serial {
    pub const DEFAULT_BAUD_RATE: u32 = 115_200;
    pub const MIN_BAUD_RATE: u32 = 300;
    pub const MAX_BAUD_RATE: u32 = 4_000_000;
    pub const DEFAULT_READ_TIMEOUT_MS: u64 = 1_000;
    /// The microcontrollers reset when the port opens
    pub const DEFAULT_SETTLE_DELAY_MS: u64 = 2_000;
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 20;
    pub const DEFAULT_MAX_LINE_LENGTH: usize = 512;
    pub const MIN_LINE_LENGTH: usize = 32;
    pub const READ_CHUNK_SIZE: usize = 256;
}

/// Reader loop constants
pub mod acquisition {
    pub const DEFAULT_FAULT_THRESHOLD: u32 = 50;
    pub const DEFAULT_STOP_TIMEOUT_MS: u64 = 2_000;
}

/// Live display constants
pub mod display {
    pub const DEFAULT_CAPACITY: usize = 500;
    pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 100;
    /// Initial running extreme, keeps the axis from collapsing to zero
    pub const DEFAULT_EXTREME_FLOOR: f64 = 0.1;
    pub const SERIES_COUNT: usize =
        super::protocol::STRAIN_CHANNEL_COUNT + super::protocol::MOTION_SENSOR_COUNT;
}

/// Simulated load rig constants
pub mod simulation {
    pub const DEFAULT_STRAIN_INTERVAL_MS: u64 = 100;
    pub const DEFAULT_MOTION_INTERVAL_MS: u64 = 10;
    pub const DEFAULT_TICK_MS: u64 = 1;
    pub const DEFAULT_LOAD_STEP_PER_TICK: f64 = 1.0;
    pub const DEFAULT_MANUAL_LOAD_STEP: f64 = 50.0;
    pub const DEFAULT_MAX_LOAD: f64 = 2_000.0;

    pub const STRAIN_GAINS: [f64; 8] = [0.05, 0.045, 0.055, 0.06, 0.04, 0.05, 0.065, 0.047];
    pub const STRAIN_RIPPLES: [f64; 8] = [0.1, 0.08, 0.12, 0.07, 0.09, 0.11, 0.06, 0.13];
    /// Ripple angular frequencies in radians per millisecond
    pub const STRAIN_RIPPLE_FREQS: [f64; 8] =
        [0.001, 0.002, 0.0015, 0.0025, 0.0012, 0.0018, 0.0022, 0.0014];

    /// Degrees of deflection per unit load at the free end
    pub const ANGLE_COEFFICIENT: f64 = 0.01;
    /// Sensor positions from the fixed end towards the free end
    pub const POSITION_WEIGHTS: [f64; 3] = [0.2, 0.6, 1.0];
    pub const PITCH_RIPPLE: f64 = 0.05;
    pub const PITCH_RIPPLE_FREQ: f64 = 0.002;
    pub const ROLL_FRACTION: f64 = 0.1;
    pub const ROLL_FREQ: f64 = 0.0015;
    pub const YAW_FRACTION: f64 = 0.05;
    pub const YAW_FREQ: f64 = 0.001;

    pub const STRAIN_NOISE_BOUND: f64 = 0.01;
    pub const PITCH_NOISE_BOUND: f64 = 0.02;
    pub const LATERAL_NOISE_BOUND: f64 = 0.01;
}

/// Session storage constants
pub mod storage {
    pub const DEFAULT_BASE_DIR: &str = "data";
    pub const STRAIN_FILE: &str = "strain_data.csv";
    pub const MOTION_FILE: &str = "motion_data.csv";
    pub const METADATA_FILE: &str = "metadata.json";
    pub const SUMMARY_FILE: &str = "summary.json";
    pub const TIMESTAMP_COLUMN: &str = "timestamp";
    pub const SESSION_NAME_PREFIX: &str = "test_";
    pub const SESSION_NAME_FORMAT: &str = "%Y%m%d_%H%M%S";
}

/// Configuration file discovery
pub mod paths {
    pub const CONFIG_FILE_NAME: &str = "quickdeck.toml";
    pub const CONFIG_DIR: &str = "config";
    pub const ENV_PREFIX: &str = "QUICKDECK";
    pub const ENV_SEPARATOR: &str = "__";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_layout() {
        assert_eq!(display::SERIES_COUNT, 11);
        assert_eq!(protocol::MOTION_VALUE_COUNT, 9);
    }

    #[test]
    fn test_simulation_tables_match_channel_count() {
        assert_eq!(simulation::STRAIN_GAINS.len(), protocol::STRAIN_CHANNEL_COUNT);
        assert_eq!(simulation::POSITION_WEIGHTS.len(), protocol::MOTION_SENSOR_COUNT);
    }
}

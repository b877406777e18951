//! QuickDeck core: strain and motion acquisition for a deck load-test rig
//!
//! The crate reads two serial-attached microcontrollers (or a load simulator),
//! validates their line frames, records every sample into a per-test session
//! directory and keeps a bounded window of recent values for live display.
//!
//! - Sample sources for serial hardware and the simulator
//! - One reader thread per device with bounded, cooperative shutdown
//! - Durable CSV recording with JSON metadata and summaries
//! - Layered configuration from defaults, TOML files and the environment
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use quickdeck_core::{SystemConfig, TestRig};
//! use std::time::Duration;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut rig = TestRig::simulated(SystemConfig::default())?;
//!     if let Some(sim) = rig.simulator() {
//!         sim.set_target_load(800.0);
//!     }
//!
//!     rig.start_test(None, None)?;
//!     std::thread::sleep(Duration::from_secs(5));
//!     let outcome = rig.stop_test(None)?;
//!
//!     println!("recorded {} strain samples", outcome.summary.strain_samples);
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod acquisition;
pub mod config;
pub mod error;
pub mod hal;
pub mod rig;
pub mod session;
pub mod utils;

// Re-export commonly used types for convenience
pub use acquisition::{
    AcquisitionEngine, DisplayFrame, DisplayRefresher, Ingest, LiveBuffer, SampleSink,
};
pub use config::{ConfigLoader, SystemConfig};
pub use error::{DeckError, DeckResult};
pub use hal::{HardwareSource, Role, Sample, SampleSource, SimulatedSource};
pub use rig::{TestOutcome, TestRig};
pub use session::{SessionCatalog, SessionRecorder, Summary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: "Strain and motion acquisition core for the QuickDeck test rig".to_string(),
        features: vec![
            "Serial and simulated sample sources".to_string(),
            "Per-device reader threads".to_string(),
            "Durable session recording".to_string(),
            "Live display buffer".to_string(),
        ],
    }
}

/// Library version information
#[derive(Debug, Clone)]
pub struct VersionInfo {
    /// Library name
    pub name: String,
    /// Version string
    pub version: String,
    /// Description
    pub description: String,
    /// List of features
    pub features: Vec<String>,
}

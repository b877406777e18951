// src/hal/mod.rs
//! Sample sources: serial hardware and the simulated load rig

pub mod serial;
pub mod simulator;
pub mod traits;
pub mod types;

pub use serial::{enumerate_ports, HardwareSource, HardwareStream, LineReader, SerialTransport};
pub use simulator::{SimulatedSource, SimulatorHandle};
pub use traits::*;
pub use types::*;

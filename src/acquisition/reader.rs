// src/acquisition/reader.rs
//! Per-role reader loop

use crate::acquisition::framing::{FrameHealth, SequenceGate, TimestampPolicy};
use crate::acquisition::sink::Ingest;
use crate::config::SystemConfig;
use crate::error::{AcquisitionError, StreamError};
use crate::hal::{Role, SampleStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Reader loop tuning
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderSettings {
    /// Upper bound on each blocking read, and so on stop latency
    pub poll_interval: Duration,
    pub fault_threshold: u32,
    pub timestamp_policy: TimestampPolicy,
    pub stop_timeout: Duration,
}

impl ReaderSettings {
    pub fn from_config(config: &SystemConfig) -> Self {
        Self {
            poll_interval: config.serial.poll_interval(),
            fault_threshold: config.acquisition.fault_threshold,
            timestamp_policy: config.acquisition.timestamp_policy,
            stop_timeout: config.acquisition.stop_timeout(),
        }
    }
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self::from_config(&SystemConfig::default())
    }
}

/// How one reader ended
#[derive(Debug)]
pub struct ReaderReport {
    pub role: Role,
    pub health: FrameHealth,
    pub delivered: u64,
    pub rejected_timestamps: u64,
    pub outcome: Result<(), AcquisitionError>,
}

impl ReaderReport {
    pub fn is_faulted(&self) -> bool {
        self.outcome.is_err()
    }
}

/// Read until the running flag clears or the stream fails.
///
/// A valid frame is handed to the sinks to completion before the flag is
/// checked again, so a stop never interrupts a durable append.
pub fn run_reader(
    mut stream: Box<dyn SampleStream>,
    ingest: Ingest,
    running: Arc<AtomicBool>,
    settings: ReaderSettings,
) -> ReaderReport {
    let role = stream.role();
    let mut health = FrameHealth::new(settings.fault_threshold);
    let mut gate = SequenceGate::new(settings.timestamp_policy);
    let mut delivered = 0u64;
    info!(%role, "Reader started");

    let outcome = loop {
        if !running.load(Ordering::Acquire) {
            break Ok(());
        }

        match stream.next_sample(settings.poll_interval) {
            Ok(Some(sample)) => {
                health.record_valid();
                if !gate.admit(sample.timestamp()) {
                    debug!(%role, timestamp = sample.timestamp(), "Dropping out-of-sequence sample");
                    continue;
                }
                if let Err(source) = ingest.on_sample(role, &sample) {
                    warn!(%role, error = %source, "Sample delivery failed");
                    break Err(AcquisitionError::Sink { role, source });
                }
                delivered += 1;
                trace!(%role, timestamp = sample.timestamp(), "Sample delivered");
            }
            Ok(None) => {}
            Err(StreamError::Frame(e)) => {
                debug!(%role, error = %e, "Invalid frame");
                if health.record_invalid() {
                    warn!(
                        %role,
                        consecutive = health.consecutive_invalid(),
                        "Too many consecutive invalid frames"
                    );
                    break Err(AcquisitionError::Faulted {
                        role,
                        consecutive: health.consecutive_invalid(),
                    });
                }
            }
            Err(StreamError::Io(source)) => {
                warn!(%role, error = %source, "Link failed");
                break Err(AcquisitionError::Io { role, source });
            }
        }
    };

    info!(
        %role,
        valid = health.valid(),
        invalid = health.invalid(),
        delivered,
        "Reader stopped"
    );
    ReaderReport {
        role,
        health,
        delivered,
        rejected_timestamps: gate.rejected(),
        outcome,
    }
}

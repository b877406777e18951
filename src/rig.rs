// src/rig.rs
//! Test rig: ties a sample source to the recorder and the live display

use crate::acquisition::{AcquisitionEngine, Ingest, LiveBuffer, ReaderSettings, StopReport};
use crate::config::SystemConfig;
use crate::error::{DeckError, DeckResult, SessionError};
use crate::hal::{
    ConnectionState, DeviceCommand, HardwareSource, Role, SampleSource, SimulatedSource,
    SimulatorHandle, SourceKind,
};
use crate::session::{Session, SessionRecorder, Summary};
use crate::utils::time::{Clock, SystemClock};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of a finished test
#[derive(Debug)]
pub struct TestOutcome {
    pub session: Option<Session>,
    pub summary: Summary,
    pub acquisition: StopReport,
}

/// One bench setup: source, recorder and display buffer
pub struct TestRig {
    config: SystemConfig,
    recorder: Arc<SessionRecorder>,
    live: Arc<LiveBuffer>,
    engine: AcquisitionEngine,
    simulator: Option<SimulatorHandle>,
}

impl TestRig {
    /// Rig fed by the source named in `acquisition.source`.
    ///
    /// For hardware every role with a configured port is connected first;
    /// at least one port must be set.
    pub fn from_config(config: SystemConfig) -> DeckResult<Self> {
        match config.acquisition.source {
            SourceKind::Simulated => Self::simulated(config),
            SourceKind::Hardware => {
                config
                    .validate_consistency()
                    .map_err(|errors| DeckError::Configuration(errors.join("; ")))?;

                let ports: Vec<(Role, String)> = Role::ALL
                    .into_iter()
                    .filter_map(|role| config.serial.port(role).map(|port| (role, port.to_string())))
                    .collect();
                if ports.is_empty() {
                    return Err(DeckError::Configuration(
                        "hardware source selected but neither serial.strain_port nor serial.motion_port is set"
                            .to_string(),
                    ));
                }

                let mut source = HardwareSource::new(config.serial.clone());
                for (role, port) in ports {
                    source.connect(role, &port)?;
                }
                Self::hardware(config, source)
            }
        }
    }

    /// Rig fed by the load simulator
    pub fn simulated(config: SystemConfig) -> DeckResult<Self> {
        Self::simulated_with_clock(config, Arc::new(SystemClock))
    }

    pub fn simulated_with_clock(config: SystemConfig, clock: Arc<dyn Clock>) -> DeckResult<Self> {
        let source = SimulatedSource::new(config.simulator.clone());
        let handle = source.handle();
        let mut rig = Self::with_source(config, Box::new(source), clock)?;
        rig.simulator = Some(handle);
        Ok(rig)
    }

    /// Rig fed by already connected serial devices
    pub fn hardware(config: SystemConfig, source: HardwareSource) -> DeckResult<Self> {
        let source = source.with_dedupe(config.acquisition.dedupe_repeated_lines);
        Self::with_source(config, Box::new(source), Arc::new(SystemClock))
    }

    pub fn with_source(
        config: SystemConfig,
        source: Box<dyn SampleSource>,
        clock: Arc<dyn Clock>,
    ) -> DeckResult<Self> {
        config
            .validate_consistency()
            .map_err(|errors| DeckError::Configuration(errors.join("; ")))?;

        let recorder = Arc::new(SessionRecorder::with_clock(&config.storage, clock));
        let live = Arc::new(LiveBuffer::new(
            config.display.capacity,
            config.display.extreme_floor,
        )?);

        // Durable append first, display second
        let ingest = Ingest::new()
            .with_sink(recorder.clone())
            .with_sink(live.clone());
        let engine = AcquisitionEngine::new(source, ingest, ReaderSettings::from_config(&config));

        Ok(Self {
            config,
            recorder,
            live,
            engine,
            simulator: None,
        })
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn recorder(&self) -> &Arc<SessionRecorder> {
        &self.recorder
    }

    pub fn live_buffer(&self) -> &Arc<LiveBuffer> {
        &self.live
    }

    pub fn simulator(&self) -> Option<&SimulatorHandle> {
        self.simulator.as_ref()
    }

    pub fn source_kind(&self) -> SourceKind {
        self.engine.kind()
    }

    pub fn connection_state(&self, role: Role) -> ConnectionState {
        self.engine.role_state(role)
    }

    pub fn is_running(&self) -> bool {
        self.engine.is_running()
    }

    pub fn engine_mut(&mut self) -> &mut AcquisitionEngine {
        &mut self.engine
    }

    /// Open a session, clear the display and start the readers.
    ///
    /// If acquisition cannot start the new session is aborted.
    pub fn start_test(&mut self, name: Option<&str>, metadata: Option<Map<String, Value>>) -> DeckResult<Session> {
        if self.engine.is_running() {
            return Err(SessionError::InvalidState {
                operation: "start test",
                state: self.recorder.state(),
            }
            .into());
        }

        let session = self.recorder.create(name)?;
        if let Some(values) = metadata {
            if let Err(e) = self.recorder.update_metadata(values) {
                self.abort_quietly();
                return Err(e.into());
            }
        }

        self.live.clear();
        match self.engine.start() {
            Ok(roles) => {
                info!(session = %session.name, roles = ?roles, "Test started");
                Ok(session)
            }
            Err(e) => {
                self.abort_quietly();
                Err(e.into())
            }
        }
    }

    /// Stop the readers and finalize the session
    pub fn stop_test(&mut self, extra: Option<Map<String, Value>>) -> DeckResult<TestOutcome> {
        let acquisition = self.engine.stop();
        for fault in acquisition.faults() {
            warn!(error = %fault, "Acquisition fault during test");
        }

        let summary = self.recorder.finalize(extra)?;
        let session = self.recorder.last_finalized();
        info!(
            session = session.as_ref().map(|s| s.name.as_str()).unwrap_or_default(),
            "Test stopped"
        );
        Ok(TestOutcome {
            session,
            summary,
            acquisition,
        })
    }

    /// Zero the strain bridges and recalibrate the motion sensors
    pub fn calibrate(&mut self) -> DeckResult<()> {
        for (role, command) in [
            (Role::Strain, DeviceCommand::Tare),
            (Role::Motion, DeviceCommand::Calibrate),
        ] {
            if self.engine.role_state(role) == ConnectionState::Disconnected {
                warn!(%role, "Skipping calibration of disconnected device");
                continue;
            }
            self.engine.send_command(role, command)?;
            info!(%role, command = command.as_str(), "Calibration command sent");
        }
        Ok(())
    }

    fn abort_quietly(&self) {
        if let Err(e) = self.recorder.abort() {
            warn!(error = %e, "Failed to abort session");
        }
    }
}

// src/acquisition/engine.rs
//! Thread-per-role acquisition engine

use crate::acquisition::reader::{run_reader, ReaderReport, ReaderSettings};
use crate::acquisition::sink::Ingest;
use crate::error::AcquisitionError;
use crate::hal::{ConnectionState, DeviceCommand, Role, SampleSource, SourceKind};
use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, warn};

struct Worker {
    role: Role,
    handle: JoinHandle<()>,
}

struct Run {
    running: Arc<AtomicBool>,
    workers: Vec<Worker>,
    reports: Receiver<ReaderReport>,
    /// Reports already drained while running
    finished: Vec<ReaderReport>,
}

/// Result of stopping the engine
#[derive(Debug, Default)]
pub struct StopReport {
    pub reports: Vec<ReaderReport>,
    /// Roles whose reader did not finish before the deadline
    pub abandoned: Vec<Role>,
}

impl StopReport {
    pub fn report(&self, role: Role) -> Option<&ReaderReport> {
        self.reports.iter().find(|r| r.role == role)
    }

    pub fn faults(&self) -> impl Iterator<Item = &AcquisitionError> {
        self.reports.iter().filter_map(|r| r.outcome.as_ref().err())
    }

    pub fn is_clean(&self) -> bool {
        self.abandoned.is_empty() && self.faults().next().is_none()
    }
}

/// Owns the sample source and one reader thread per connected role
pub struct AcquisitionEngine {
    source: Box<dyn SampleSource>,
    ingest: Ingest,
    settings: ReaderSettings,
    run: Option<Run>,
}

impl AcquisitionEngine {
    pub fn new(source: Box<dyn SampleSource>, ingest: Ingest, settings: ReaderSettings) -> Self {
        Self {
            source,
            ingest,
            settings,
            run: None,
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.source.kind()
    }

    pub fn is_running(&self) -> bool {
        self.run.is_some()
    }

    pub fn settings(&self) -> &ReaderSettings {
        &self.settings
    }

    pub fn source(&self) -> &dyn SampleSource {
        self.source.as_ref()
    }

    pub fn source_mut(&mut self) -> &mut dyn SampleSource {
        self.source.as_mut()
    }

    pub fn role_state(&self, role: Role) -> ConnectionState {
        self.source.connection_state(role)
    }

    /// Spawn a reader for every role the source can serve.
    ///
    /// Fails `NotConnected` when no role is available. If a thread cannot be
    /// spawned the readers already started are stopped again.
    pub fn start(&mut self) -> Result<Vec<Role>, AcquisitionError> {
        if self.run.is_some() {
            return Err(AcquisitionError::AlreadyRunning);
        }

        let roles: Vec<Role> = Role::ALL
            .into_iter()
            .filter(|role| self.source.connection_state(*role) == ConnectionState::Connected)
            .collect();
        if roles.is_empty() {
            return Err(AcquisitionError::NotConnected(Role::Strain));
        }
        debug!(count = roles.len(), "Starting readers");

        let mut streams = Vec::with_capacity(roles.len());
        for role in &roles {
            streams.push(self.source.open_stream(*role)?);
        }

        let running = Arc::new(AtomicBool::new(true));
        let (tx, rx) = channel::unbounded();
        let mut run = Run {
            running: Arc::clone(&running),
            workers: Vec::with_capacity(streams.len()),
            reports: rx,
            finished: Vec::new(),
        };

        for stream in streams {
            let role = stream.role();
            let ingest = self.ingest.clone();
            let running = Arc::clone(&running);
            let settings = self.settings.clone();
            let tx = tx.clone();

            let spawned = thread::Builder::new()
                .name(format!("quickdeck-{role}-reader"))
                .spawn(move || {
                    let report = run_reader(stream, ingest, running, settings);
                    // The engine may already have given up on us
                    let _ = tx.send(report);
                });

            match spawned {
                Ok(handle) => run.workers.push(Worker { role, handle }),
                Err(source) => {
                    error!(%role, error = %source, "Failed to spawn reader");
                    self.run = Some(run);
                    self.stop();
                    return Err(AcquisitionError::Spawn { role, source });
                }
            }
        }

        info!(roles = ?roles, kind = ?self.source.kind(), "Acquisition started");
        self.run = Some(run);
        Ok(roles)
    }

    /// Roles whose reader is still alive
    pub fn active_roles(&mut self) -> Vec<Role> {
        self.drain_reports();
        match &self.run {
            Some(run) => run
                .workers
                .iter()
                .filter(|w| !run.finished.iter().any(|r| r.role == w.role))
                .map(|w| w.role)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Faults reported by readers that have already ended
    pub fn faults(&mut self) -> Vec<(Role, String)> {
        self.drain_reports();
        self.run
            .as_ref()
            .map(|run| {
                run.finished
                    .iter()
                    .filter_map(|r| r.outcome.as_ref().err().map(|e| (r.role, e.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn drain_reports(&mut self) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        while let Ok(report) = run.reports.try_recv() {
            if report.is_faulted() {
                self.source.mark_faulted(report.role);
            }
            run.finished.push(report);
        }
    }

    /// Clear the running flag and wait for every reader, up to the stop
    /// timeout shared by all of them. Stragglers are detached.
    pub fn stop(&mut self) -> StopReport {
        self.drain_reports();
        let Some(mut run) = self.run.take() else {
            return StopReport::default();
        };

        run.running.store(false, Ordering::Release);
        let deadline = Instant::now() + self.settings.stop_timeout;

        let mut reports = std::mem::take(&mut run.finished);
        while reports.len() < run.workers.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match run.reports.recv_timeout(remaining) {
                Ok(report) => {
                    if report.is_faulted() {
                        self.source.mark_faulted(report.role);
                    }
                    reports.push(report);
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let mut abandoned = Vec::new();
        for worker in run.workers {
            if reports.iter().any(|r| r.role == worker.role) {
                if worker.handle.join().is_err() {
                    error!(role = %worker.role, "Reader thread panicked");
                }
            } else {
                warn!(role = %worker.role, "Reader did not stop in time, detaching");
                abandoned.push(worker.role);
            }
        }

        for report in &reports {
            if let Err(e) = &report.outcome {
                warn!(role = %report.role, error = %e, "Reader ended with a fault");
            }
        }
        info!(
            stopped = reports.len(),
            abandoned = abandoned.len(),
            "Acquisition stopped"
        );
        StopReport { reports, abandoned }
    }

    /// Forward a control command to the device serving `role`
    pub fn send_command(&mut self, role: Role, command: DeviceCommand) -> Result<(), AcquisitionError> {
        self.source.send_command(role, command)
    }
}

impl Drop for AcquisitionEngine {
    fn drop(&mut self) {
        if self.run.is_some() {
            self.stop();
        }
    }
}

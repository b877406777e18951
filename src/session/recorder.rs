// src/session/recorder.rs
//! Durable session recorder
//!
//! Lifecycle is `Idle -> Open -> Finalized`, and a new session may be created
//! from either resting state. Every appended row is flushed to the operating
//! system before `append` returns; `sync_on_append` additionally forces it to
//! the disk.

use crate::acquisition::sink::SampleSink;
use crate::config::constants::storage;
use crate::config::StorageSettings;
use crate::error::{SessionError, SinkError, StorageError};
use crate::hal::{PerRole, Role, Sample};
use crate::session::stats::SessionStats;
use crate::session::{validate_name, write_json, ChannelConfig, Session, SessionMetadata, Summary};
use crate::utils::time::{default_session_name, Clock, SystemClock};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Open,
    Finalized,
}

impl fmt::Display for RecorderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RecorderState::Idle => "idle",
            RecorderState::Open => "open",
            RecorderState::Finalized => "finalized",
        };
        f.write_str(label)
    }
}

struct DataFile {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl DataFile {
    fn create(dir: &Path, role: Role) -> Result<Self, StorageError> {
        let path = dir.join(role.data_file());
        let file = File::create(&path).map_err(StorageError::io(&path))?;
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(role.header()).map_err(StorageError::csv(&path))?;
        writer.flush().map_err(StorageError::io(&path))?;
        Ok(Self { path, writer })
    }

    fn append(&mut self, sample: &Sample, sync: bool) -> Result<(), StorageError> {
        let mut record = Vec::with_capacity(sample.values().len() + 1);
        record.push(sample.timestamp().to_string());
        // Shortest round-trip form, so values read back bit-identical
        record.extend(sample.values().iter().map(f64::to_string));

        self.writer.write_record(&record).map_err(StorageError::csv(&self.path))?;
        self.flush(sync)
    }

    fn flush(&mut self, sync: bool) -> Result<(), StorageError> {
        self.writer.flush().map_err(StorageError::io(&self.path))?;
        if sync {
            self.writer.get_ref().sync_data().map_err(StorageError::io(&self.path))?;
        }
        Ok(())
    }
}

struct OpenSession {
    session: Session,
    metadata: SessionMetadata,
    files: PerRole<DataFile>,
    stats: SessionStats,
}

impl OpenSession {
    fn metadata_path(&self) -> PathBuf {
        self.session.directory.join(storage::METADATA_FILE)
    }
}

struct Inner {
    state: RecorderState,
    open: Option<OpenSession>,
    last_finalized: Option<Session>,
}

impl Inner {
    fn open_mut(&mut self, operation: &'static str) -> Result<&mut OpenSession, SessionError> {
        let state = self.state;
        self.open
            .as_mut()
            .ok_or(SessionError::InvalidState { operation, state })
    }
}

/// Owns exclusive write access to the currently open session
pub struct SessionRecorder {
    base_dir: PathBuf,
    sync_on_append: bool,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl SessionRecorder {
    pub fn new(settings: &StorageSettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: &StorageSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            base_dir: settings.base_dir.clone(),
            sync_on_append: settings.sync_on_append,
            clock,
            inner: Mutex::new(Inner {
                state: RecorderState::Idle,
                open: None,
                last_finalized: None,
            }),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn state(&self) -> RecorderState {
        self.inner.lock().state
    }

    /// The open session, if any
    pub fn current(&self) -> Option<Session> {
        self.inner.lock().open.as_ref().map(|open| open.session.clone())
    }

    pub fn last_finalized(&self) -> Option<Session> {
        self.inner.lock().last_finalized.clone()
    }

    /// Create and open a session; the name defaults to `test_YYYYmmdd_HHMMSS`
    pub fn create(&self, name: Option<&str>) -> Result<Session, SessionError> {
        let start_time = self.clock.now();
        let name = match name {
            Some(name) => name.to_string(),
            None => default_session_name(&start_time),
        };
        validate_name(&name)?;

        let directory = self.base_dir.join(&name);
        let mut inner = self.inner.lock();

        if is_non_empty_dir(&directory)? {
            return Err(SessionError::Duplicate { name });
        }
        if inner.state == RecorderState::Open {
            return Err(SessionError::InvalidState {
                operation: "create",
                state: inner.state,
            });
        }

        fs::create_dir_all(&directory).map_err(StorageError::io(&directory))?;
        let files = PerRole::new(
            DataFile::create(&directory, Role::Strain)?,
            DataFile::create(&directory, Role::Motion)?,
        );
        let metadata = SessionMetadata::new(&name, start_time);
        write_json(&directory.join(storage::METADATA_FILE), &metadata)?;

        let session = Session {
            name,
            directory,
            start_time,
            end_time: None,
            channel_config: ChannelConfig::default(),
            summary: None,
        };
        info!(session = %session.name, directory = %session.directory.display(), "Session created");

        inner.open = Some(OpenSession {
            session: session.clone(),
            metadata,
            files,
            stats: SessionStats::default(),
        });
        inner.state = RecorderState::Open;
        Ok(session)
    }

    /// Durably append one row to the sample's data file
    pub fn append(&self, sample: &Sample) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        let open = inner.open_mut("append")?;

        open.files
            .get_mut(sample.role())
            .append(sample, self.sync_on_append)?;
        open.stats.record(sample);
        Ok(())
    }

    /// Merge caller key/values into the metadata document
    pub fn update_metadata(&self, values: Map<String, Value>) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        let open = inner.open_mut("update metadata")?;

        let mut metadata = open.metadata.clone();
        metadata.merge_extra(values);
        write_json(&open.metadata_path(), &metadata)?;
        open.metadata = metadata;
        Ok(())
    }

    /// Close the session, writing its summary. On failure the session stays open.
    pub fn finalize(&self, extra: Option<Map<String, Value>>) -> Result<Summary, SessionError> {
        let mut inner = self.inner.lock();
        let open = inner.open_mut("finalize")?;

        for role in Role::ALL {
            open.files.get_mut(role).flush(self.sync_on_append)?;
        }

        let end_time = self.clock.now();
        let summary = open.stats.summary();

        let mut metadata = open.metadata.clone();
        metadata.end_time = Some(end_time);
        metadata.summary = Some(summary.clone());
        if let Some(extra) = extra {
            metadata.merge_extra(extra);
        }

        let dir = open.session.directory.clone();
        write_json(&dir.join(storage::SUMMARY_FILE), &summary)?;
        write_json(&dir.join(storage::METADATA_FILE), &metadata)?;

        let mut session = open.session.clone();
        session.end_time = Some(end_time);
        session.summary = Some(summary.clone());

        info!(
            session = %session.name,
            strain_samples = summary.strain_samples,
            motion_samples = summary.motion_samples,
            duration_ms = summary.duration_ms,
            "Session finalized"
        );

        inner.open = None;
        inner.last_finalized = Some(session);
        inner.state = RecorderState::Finalized;
        Ok(summary)
    }

    /// Drop the open session without a summary, back to idle
    pub fn abort(&self) -> Result<Session, SessionError> {
        let mut inner = self.inner.lock();
        let state = inner.state;
        let mut open = inner.open.take().ok_or(SessionError::InvalidState {
            operation: "abort",
            state,
        })?;

        for role in Role::ALL {
            if let Err(e) = open.files.get_mut(role).flush(self.sync_on_append) {
                warn!(%role, error = %e, "Flush failed while aborting session");
            }
        }
        inner.state = RecorderState::Idle;
        warn!(session = %open.session.name, "Session aborted");
        Ok(open.session)
    }
}

impl SampleSink for SessionRecorder {
    fn consume(&self, sample: &Sample) -> Result<(), SinkError> {
        self.append(sample).map_err(SinkError::from)
    }
}

fn is_non_empty_dir(dir: &Path) -> Result<bool, StorageError> {
    match fs::read_dir(dir) {
        Ok(mut entries) => Ok(entries.next().is_some()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StorageError::io(dir)(e)),
    }
}

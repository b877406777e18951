// src/session/catalog.rs
//! Browsing and loading recorded sessions

use crate::config::constants::storage;
use crate::error::{SessionError, StorageError};
use crate::hal::{Role, Sample};
use crate::session::{read_json, validate_name, SessionMetadata, Summary};
use chrono::{DateTime, FixedOffset};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Listing entry for one session directory
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub name: String,
    pub directory: PathBuf,
    pub start_time: DateTime<FixedOffset>,
    pub end_time: Option<DateTime<FixedOffset>>,
    pub finalized: bool,
}

/// Everything stored for one session
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionData {
    pub metadata: Option<SessionMetadata>,
    pub summary: Option<Summary>,
    pub strain: Vec<Sample>,
    pub motion: Vec<Sample>,
}

impl SessionData {
    pub fn rows(&self, role: Role) -> &[Sample] {
        match role {
            Role::Strain => &self.strain,
            Role::Motion => &self.motion,
        }
    }
}

/// Read-only view over the storage base directory
#[derive(Debug, Clone)]
pub struct SessionCatalog {
    base_dir: PathBuf,
}

impl SessionCatalog {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Sessions with readable metadata, newest first
    pub fn list(&self) -> Result<Vec<SessionInfo>, StorageError> {
        let entries = match fs::read_dir(&self.base_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&self.base_dir)(e)),
        };

        let mut sessions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(StorageError::io(&self.base_dir))?;
            let directory = entry.path();
            if !directory.is_dir() {
                continue;
            }

            let metadata_path = directory.join(storage::METADATA_FILE);
            if !metadata_path.exists() {
                debug!(directory = %directory.display(), "Skipping directory without metadata");
                continue;
            }
            let metadata: SessionMetadata = match read_json(&metadata_path) {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!(directory = %directory.display(), error = %e, "Skipping unreadable session");
                    continue;
                }
            };

            sessions.push(SessionInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                directory,
                start_time: metadata.start_time,
                end_time: metadata.end_time,
                finalized: metadata.end_time.is_some(),
            });
        }

        sessions.sort_by(|a, b| {
            b.start_time
                .cmp(&a.start_time)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(sessions)
    }

    /// Load metadata, summary and raw rows of a session
    pub fn load(&self, name: &str) -> Result<SessionData, SessionError> {
        validate_name(name)?;
        let directory = self.base_dir.join(name);
        if !directory.is_dir() {
            return Err(SessionError::NotFound {
                name: name.to_string(),
            });
        }

        let metadata = read_optional_json(&directory.join(storage::METADATA_FILE))?;
        let summary = read_optional_json(&directory.join(storage::SUMMARY_FILE))?;
        let strain = read_rows(&directory, Role::Strain)?;
        let motion = read_rows(&directory, Role::Motion)?;

        Ok(SessionData {
            metadata,
            summary,
            strain,
            motion,
        })
    }
}

fn read_optional_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    if path.exists() {
        read_json(path).map(Some)
    } else {
        Ok(None)
    }
}

fn read_rows(directory: &Path, role: Role) -> Result<Vec<Sample>, StorageError> {
    let path = directory.join(role.data_file());
    let file = match File::open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StorageError::io(&path)(e)),
    };

    let malformed = |reason: String| StorageError::Malformed {
        path: path.clone(),
        reason,
    };

    let mut reader = csv::Reader::from_reader(file);
    let headers = reader.headers().map_err(StorageError::csv(&path))?;
    if headers.iter().ne(role.header().iter().map(String::as_str)) {
        return Err(malformed(format!("unexpected header {headers:?}")));
    }

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(StorageError::csv(&path))?;
        let mut fields = record.iter();

        let timestamp = fields
            .next()
            .and_then(|raw| raw.parse::<u64>().ok())
            .ok_or_else(|| malformed(format!("row {}: invalid timestamp", line + 1)))?;
        let values = fields
            .map(|raw| raw.parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| malformed(format!("row {}: {e}", line + 1)))?;

        let sample = Sample::new(role, timestamp, values)
            .map_err(|e| malformed(format!("row {}: {e}", line + 1)))?;
        rows.push(sample);
    }
    Ok(rows)
}

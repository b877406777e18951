// tests/session_roundtrip.rs
//! Recorded sessions read back exactly through the catalog

mod common;

use common::mock_clock;
use quickdeck_core::config::StorageSettings;
use quickdeck_core::hal::{Role, Sample};
use quickdeck_core::session::{RecorderState, SessionCatalog, SessionRecorder};
use quickdeck_core::error::SessionError;
use serde_json::json;
use std::fs;
use tempfile::TempDir;

fn recorder(dir: &TempDir) -> SessionRecorder {
    let settings = StorageSettings {
        base_dir: dir.path().to_path_buf(),
        sync_on_append: true,
    };
    SessionRecorder::with_clock(&settings, mock_clock())
}

fn awkward_values(seed: u64, count: usize) -> Vec<f64> {
    (0..count)
        .map(|i| match (seed as usize + i) % 5 {
            0 => 0.1 + 0.2,
            1 => -1.0 / 3.0,
            2 => 1e-300 * (i as f64 + 1.0),
            3 => 123_456_789.123_456_78,
            _ => f64::EPSILON * seed as f64,
        })
        .collect()
}

#[test]
fn test_rows_round_trip_bit_identical() {
    let dir = TempDir::new().unwrap();
    let recorder = recorder(&dir);
    recorder.create(Some("roundtrip")).unwrap();

    let mut written = Vec::new();
    for ts in 0..40u64 {
        let sample = if ts % 4 == 0 {
            Sample::new(Role::Strain, ts * 25, awkward_values(ts, 8)).unwrap()
        } else {
            Sample::new(Role::Motion, ts * 25, awkward_values(ts, 9)).unwrap()
        };
        recorder.append(&sample).unwrap();
        written.push(sample);
    }
    let summary = recorder.finalize(None).unwrap();
    assert_eq!(summary.strain_samples, 10);
    assert_eq!(summary.motion_samples, 30);

    let data = SessionCatalog::new(dir.path()).load("roundtrip").unwrap();
    let expected_strain: Vec<_> = written.iter().filter(|s| s.role() == Role::Strain).collect();
    let expected_motion: Vec<_> = written.iter().filter(|s| s.role() == Role::Motion).collect();
    assert_eq!(data.strain.len(), expected_strain.len());
    assert_eq!(data.motion.len(), expected_motion.len());

    for (loaded, expected) in data
        .strain
        .iter()
        .chain(&data.motion)
        .zip(expected_strain.into_iter().chain(expected_motion))
    {
        assert_eq!(loaded.timestamp(), expected.timestamp());
        let loaded_bits: Vec<u64> = loaded.values().iter().map(|v| v.to_bits()).collect();
        let expected_bits: Vec<u64> = expected.values().iter().map(|v| v.to_bits()).collect();
        assert_eq!(loaded_bits, expected_bits);
    }

    assert_eq!(data.summary.as_ref(), Some(&summary));
    let metadata = data.metadata.unwrap();
    assert_eq!(metadata.summary.as_ref(), Some(&summary));
    assert!(metadata.end_time.is_some());
}

#[test]
fn test_metadata_extras_survive_finalize() {
    let dir = TempDir::new().unwrap();
    let recorder = recorder(&dir);
    recorder.create(Some("with_meta")).unwrap();
    recorder
        .update_metadata(json!({"operator": "J. Doe", "deck": "B2"}).as_object().unwrap().clone())
        .unwrap();
    recorder
        .finalize(Some(json!({"load_applied": 750.5}).as_object().unwrap().clone()))
        .unwrap();

    let raw: serde_json::Value =
        serde_json::from_slice(&fs::read(dir.path().join("with_meta/metadata.json")).unwrap()).unwrap();
    assert_eq!(raw["operator"], "J. Doe");
    assert_eq!(raw["deck"], "B2");
    assert_eq!(raw["load_applied"], 750.5);
    assert_eq!(raw["test_name"], "with_meta");
    assert_eq!(raw["strain_channels"], 8);
    assert_eq!(raw["motion_sensors"], 3);
    assert_eq!(raw["sample_rate_strain"], 10);
    assert!(raw["summary"].is_object());
}

#[test]
fn test_empty_session_finalizes_cleanly() {
    let dir = TempDir::new().unwrap();
    let recorder = recorder(&dir);
    recorder.create(Some("empty")).unwrap();
    let summary = recorder.finalize(None).unwrap();

    assert_eq!(summary.duration_ms, 0);
    assert!(summary.strain_statistics.is_empty());
    assert_eq!(recorder.state(), RecorderState::Finalized);

    let data = SessionCatalog::new(dir.path()).load("empty").unwrap();
    assert!(data.strain.is_empty());
    assert!(data.motion.is_empty());
    assert_eq!(data.summary, Some(summary));
}

#[test]
fn test_lifecycle_misuse() {
    let dir = TempDir::new().unwrap();
    let recorder = recorder(&dir);
    let sample = Sample::new(Role::Strain, 1, vec![0.0; 8]).unwrap();

    assert!(matches!(recorder.append(&sample), Err(SessionError::InvalidState { .. })));
    assert!(matches!(recorder.finalize(None), Err(SessionError::InvalidState { .. })));

    recorder.create(Some("one")).unwrap();
    assert!(matches!(recorder.create(Some("two")), Err(SessionError::InvalidState { .. })));
    recorder.finalize(None).unwrap();

    // Finalized directory is non-empty, so the name is taken
    assert!(matches!(recorder.create(Some("one")), Err(SessionError::Duplicate { .. })));
    recorder.create(Some("two")).unwrap();
}

#[test]
fn test_catalog_lists_finalized_and_open() {
    let dir = TempDir::new().unwrap();
    let recorder = recorder(&dir);
    recorder.create(Some("done")).unwrap();
    recorder.finalize(None).unwrap();
    recorder.create(Some("running")).unwrap();

    let sessions = SessionCatalog::new(dir.path()).list().unwrap();
    assert_eq!(sessions.len(), 2);
    let done = sessions.iter().find(|s| s.name == "done").unwrap();
    let running = sessions.iter().find(|s| s.name == "running").unwrap();
    assert!(done.finalized);
    assert!(!running.finalized);
}

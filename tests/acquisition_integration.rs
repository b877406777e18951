// tests/acquisition_integration.rs
//! End-to-end acquisition: sources, reader threads, recorder and display

mod common;

use common::{mock_clock, test_config, MockPort};
use quickdeck_core::acquisition::{AcquisitionEngine, Ingest, LiveBuffer, ReaderSettings};
use quickdeck_core::error::{AcquisitionError, ConnectError};
use quickdeck_core::hal::{ConnectionState, HardwareSource, Role, SeriesId};
use quickdeck_core::session::{RecorderState, SessionCatalog};
use quickdeck_core::TestRig;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn wait_until(limit: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    done()
}

fn strain_line(ts: u64) -> String {
    let values: Vec<String> = (1..=8).map(|i| format!("{}", ts as f64 * 0.5 + i as f64)).collect();
    format!("STRAIN,{ts},{}", values.join(","))
}

fn motion_line(ts: u64) -> String {
    let values: Vec<String> = (0..9).map(|i| format!("{}", i as f64 - ts as f64)).collect();
    format!("MOTION,{ts},{}", values.join(","))
}

fn connected_source(config: &quickdeck_core::SystemConfig) -> (HardwareSource, MockPort, MockPort) {
    let strain = MockPort::replying("STRAIN_ARDUINO_READY");
    let motion = MockPort::replying("MOTION_ARDUINO_READY");
    let mut source = HardwareSource::new(config.serial.clone());
    source.attach(Role::Strain, "mock-strain", Box::new(strain.clone())).unwrap();
    source.attach(Role::Motion, "mock-motion", Box::new(motion.clone())).unwrap();
    (source, strain, motion)
}

#[test]
fn test_hardware_lines_reach_recorder_and_display() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let (source, strain, motion) = connected_source(&config);
    let mut rig = TestRig::with_source(config, Box::new(source), mock_clock()).unwrap();

    rig.start_test(Some("hw"), None).unwrap();
    for ts in 0..20 {
        strain.push_line(&strain_line(ts * 100));
    }
    strain.push_line("garbage");
    for ts in 0..50 {
        motion.push_line(&motion_line(ts * 10));
    }

    assert!(wait_until(Duration::from_secs(5), || strain.pending() == 0 && motion.pending() == 0));
    // Last popped chunks still need to be parsed and appended
    assert!(wait_until(Duration::from_secs(5), || {
        rig.live_buffer().len(SeriesId::pitch(2).unwrap()) == 50
            && rig.live_buffer().len(SeriesId::strain(0).unwrap()) == 20
    }));

    let outcome = rig.stop_test(None).unwrap();
    assert!(outcome.acquisition.is_clean(), "{:?}", outcome.acquisition);
    assert_eq!(outcome.summary.strain_samples, 20);
    assert_eq!(outcome.summary.motion_samples, 50);
    assert_eq!(outcome.summary.duration_ms, 1_900);

    let strain_report = outcome.acquisition.report(Role::Strain).unwrap();
    assert_eq!(strain_report.health.valid(), 20);
    assert_eq!(strain_report.health.invalid(), 1);

    let data = SessionCatalog::new(dir.path()).load("hw").unwrap();
    assert_eq!(data.strain.len(), 20);
    assert_eq!(data.motion.len(), 50);
    assert_eq!(data.strain[3].timestamp(), 300);
    assert_eq!(data.strain[3].values()[0], 151.0);

    // Display copy holds the most recent window in arrival order
    let pitch = rig.live_buffer().snapshot(SeriesId::pitch(0).unwrap());
    assert_eq!(pitch.first(), Some(&(0, 0.0)));
    assert_eq!(pitch.last(), Some(&(490, -490.0)));
}

#[test]
fn test_reader_faults_after_too_many_invalid_lines() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let (source, strain, _motion) = connected_source(&config);
    let mut rig = TestRig::with_source(config, Box::new(source), mock_clock()).unwrap();

    rig.start_test(Some("noisy"), None).unwrap();
    strain.push_line(&strain_line(1));
    for _ in 0..51 {
        strain.push_line("STRAIN,not,a,frame");
    }
    strain.push_line(&strain_line(2));

    assert!(wait_until(Duration::from_secs(5), || !rig.engine_mut().faults().is_empty()));
    assert_eq!(rig.engine_mut().active_roles(), vec![Role::Motion]);
    assert_eq!(rig.connection_state(Role::Strain), ConnectionState::Faulted);

    let outcome = rig.stop_test(None).unwrap();
    let report = outcome.acquisition.report(Role::Strain).unwrap();
    assert!(matches!(
        report.outcome,
        Err(AcquisitionError::Faulted { role: Role::Strain, consecutive: 51 })
    ));
    // Line after the fault is never consumed
    assert_eq!(outcome.summary.strain_samples, 1);
    assert_eq!(strain.pending(), 1);
    assert_eq!(rig.recorder().state(), RecorderState::Finalized);
}

#[test]
fn test_fifty_invalid_lines_do_not_fault() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let (source, strain, _motion) = connected_source(&config);
    let mut rig = TestRig::with_source(config, Box::new(source), mock_clock()).unwrap();

    rig.start_test(Some("borderline"), None).unwrap();
    for _ in 0..50 {
        strain.push_line("STRAIN,bad");
    }
    strain.push_line(&strain_line(9));

    assert!(wait_until(Duration::from_secs(5), || {
        rig.live_buffer().len(SeriesId::strain(0).unwrap()) == 1
    }));
    let outcome = rig.stop_test(None).unwrap();
    assert!(outcome.acquisition.is_clean());
    assert_eq!(outcome.summary.strain_samples, 1);
}

#[test]
fn test_identity_probe_outcomes() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let mut source = HardwareSource::new(config.serial.clone());

    let wrong = MockPort::replying("MOTION_ARDUINO_READY");
    let err = source.attach(Role::Strain, "ttyA", Box::new(wrong.clone())).unwrap_err();
    assert!(matches!(err, ConnectError::WrongDevice { .. }));
    assert!(wrong.written().starts_with("IDENTITY\n"));

    let silent = MockPort::default();
    let err = source.attach(Role::Strain, "ttyB", Box::new(silent)).unwrap_err();
    assert!(matches!(err, ConnectError::Timeout { .. }));
    assert_eq!(source.connection(Role::Strain), None);

    let good = MockPort::replying("STRAIN_ARDUINO_READY");
    let connection = source.attach(Role::Strain, "ttyC", Box::new(good)).unwrap();
    assert_eq!(connection.state, ConnectionState::Connected);

    let again = MockPort::replying("STRAIN_ARDUINO_READY");
    let err = source.attach(Role::Strain, "ttyD", Box::new(again)).unwrap_err();
    assert!(matches!(err, ConnectError::AlreadyConnected { .. }));

    assert!(source.disconnect(Role::Strain));
    assert!(!source.disconnect(Role::Strain));
}

#[test]
fn test_calibrate_writes_device_commands() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let (source, strain, motion) = connected_source(&config);
    let mut rig = TestRig::with_source(config, Box::new(source), mock_clock()).unwrap();

    rig.calibrate().unwrap();
    assert!(strain.written().ends_with("TARE\n"));
    assert!(motion.written().ends_with("CALIBRATE\n"));
}

#[test]
fn test_simulated_engine_stops_within_deadline() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let mut rig = TestRig::simulated_with_clock(config, mock_clock()).unwrap();
    rig.simulator().unwrap().hold_load(1_000.0);

    rig.start_test(None, None).unwrap();
    thread::sleep(Duration::from_millis(150));

    let began = Instant::now();
    let outcome = rig.stop_test(None).unwrap();
    assert!(began.elapsed() < Duration::from_millis(1_000));
    assert!(outcome.acquisition.abandoned.is_empty());
    assert!(outcome.summary.strain_samples >= 5);
    assert!(outcome.summary.motion_samples > outcome.summary.strain_samples);
    assert!(outcome.summary.max_angle["sensor3"] > outcome.summary.max_angle["sensor1"]);

    let session = outcome.session.unwrap();
    assert_eq!(session.name, "test_20240912_143000");
}

#[test]
fn test_engine_without_sinks_on_simulator() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let buffer = Arc::new(LiveBuffer::new(16, 0.1).unwrap());
    let source = quickdeck_core::SimulatedSource::new(config.simulator.clone());
    let mut engine = AcquisitionEngine::new(
        Box::new(source),
        Ingest::new().with_sink(buffer.clone()),
        ReaderSettings::from_config(&config),
    );

    engine.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || {
        buffer.len(SeriesId::pitch(0).unwrap()) == 16
    }));
    let report = engine.stop();
    assert!(report.is_clean());
    // Capacity bounds the window
    assert_eq!(buffer.len(SeriesId::pitch(0).unwrap()), 16);
}

// src/hal/simulator.rs
//! Simulated load rig
//!
//! Drives both roles from one shared load model so strain and deflection stay
//! consistent with each other. The load ramps towards an operator-set target;
//! each stream samples the model on its own schedule.

use crate::config::constants::{protocol, simulation};
use crate::config::SimulatorSettings;
use crate::error::{AcquisitionError, StreamError};
use crate::hal::traits::{SampleSource, SampleStream};
use crate::hal::types::{ConnectionState, DeviceCommand, PerRole, Role, Sample, SourceKind};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Multiplicative noise for simulated readings
pub trait NoiseSource: Send {
    /// Uniform draw from `[-bound, bound]`
    fn uniform(&mut self, bound: f64) -> f64;
}

/// Uniform noise from a seedable generator
pub struct UniformNoise {
    rng: StdRng,
}

impl UniformNoise {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }
}

impl NoiseSource for UniformNoise {
    fn uniform(&mut self, bound: f64) -> f64 {
        if bound <= 0.0 {
            return 0.0;
        }
        self.rng.gen_range(-bound..=bound)
    }
}

/// Noise-free readings, for deterministic tests
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroNoise;

impl NoiseSource for ZeroNoise {
    fn uniform(&mut self, _bound: f64) -> f64 {
        0.0
    }
}

/// Load applied to the simulated deck, ramping towards a target
#[derive(Debug, Clone, PartialEq)]
pub struct LoadModel {
    current: f64,
    target: f64,
    step_per_tick: f64,
    manual_step: f64,
    max_load: f64,
    tick: u64,
}

impl LoadModel {
    pub fn new(settings: &SimulatorSettings) -> Self {
        Self {
            current: 0.0,
            target: 0.0,
            step_per_tick: settings.load_step_per_tick,
            manual_step: settings.manual_load_step,
            max_load: settings.max_load,
            tick: 0,
        }
    }

    /// Ramp towards the target for every tick elapsed since the last call
    pub fn advance_to(&mut self, tick: u64) -> f64 {
        let ticks = tick.saturating_sub(self.tick);
        if ticks > 0 {
            self.tick = tick;
            let max_move = self.step_per_tick * ticks as f64;
            let delta = self.target - self.current;
            self.current = if delta.abs() <= max_move {
                self.target
            } else {
                self.current + max_move.copysign(delta)
            };
        }
        self.current
    }

    pub fn set_target(&mut self, load: f64) {
        self.target = self.clamp(load);
    }

    pub fn increase(&mut self) -> f64 {
        self.set_target(self.target + self.manual_step);
        self.target
    }

    pub fn decrease(&mut self) -> f64 {
        self.set_target(self.target - self.manual_step);
        self.target
    }

    /// Jump straight to `load` and stay there
    pub fn hold(&mut self, load: f64) {
        let load = self.clamp(load);
        self.current = load;
        self.target = load;
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    fn clamp(&self, load: f64) -> f64 {
        if load.is_nan() {
            return self.target;
        }
        load.clamp(0.0, self.max_load)
    }
}

/// Strain gauge readings for `load` at `t_ms`
pub fn strain_values(load: f64, t_ms: f64, noise: &mut dyn NoiseSource) -> Vec<f64> {
    (0..protocol::STRAIN_CHANNEL_COUNT)
        .map(|i| {
            let ripple = 1.0
                + simulation::STRAIN_RIPPLES[i] * (t_ms * simulation::STRAIN_RIPPLE_FREQS[i]).sin();
            let value = load * simulation::STRAIN_GAINS[i] * ripple;
            value * (1.0 + noise.uniform(simulation::STRAIN_NOISE_BOUND))
        })
        .collect()
}

/// Pitch/roll/yaw of each motion sensor for `load` at `t_ms`.
/// Deflection grows with distance from the fixed end.
pub fn motion_values(load: f64, t_ms: f64, noise: &mut dyn NoiseSource) -> Vec<f64> {
    let base_angle = load * simulation::ANGLE_COEFFICIENT;
    let mut values = Vec::with_capacity(protocol::MOTION_VALUE_COUNT);

    for weight in simulation::POSITION_WEIGHTS {
        let angle = base_angle * weight;
        let pitch = angle
            * (1.0 + simulation::PITCH_RIPPLE * (t_ms * simulation::PITCH_RIPPLE_FREQ).sin())
            + noise.uniform(simulation::PITCH_NOISE_BOUND) * angle;
        let roll = angle * simulation::ROLL_FRACTION * (t_ms * simulation::ROLL_FREQ).sin()
            + noise.uniform(simulation::LATERAL_NOISE_BOUND) * angle;
        let yaw = angle * simulation::YAW_FRACTION * (t_ms * simulation::YAW_FREQ).sin()
            + noise.uniform(simulation::LATERAL_NOISE_BOUND) * angle;
        values.extend([pitch, roll, yaw]);
    }
    values
}

struct Shared {
    started: Instant,
    tick_ms: u64,
    load: Mutex<LoadModel>,
}

/// Operator controls for a running simulator
#[derive(Clone)]
pub struct SimulatorHandle {
    shared: Arc<Shared>,
}

impl SimulatorHandle {
    pub fn increase_load(&self) -> f64 {
        let target = self.shared.load.lock().increase();
        info!(target_load = target, "Increasing simulated load");
        target
    }

    pub fn decrease_load(&self) -> f64 {
        let target = self.shared.load.lock().decrease();
        info!(target_load = target, "Decreasing simulated load");
        target
    }

    pub fn set_target_load(&self, load: f64) {
        self.shared.load.lock().set_target(load);
    }

    pub fn hold_load(&self, load: f64) {
        self.shared.load.lock().hold(load);
    }

    pub fn current_load(&self) -> f64 {
        self.shared.load.lock().current()
    }

    pub fn target_load(&self) -> f64 {
        self.shared.load.lock().target()
    }
}

/// Simulated strain and motion devices.
///
/// Timestamps are milliseconds since the source was created.
pub struct SimulatedSource {
    settings: SimulatorSettings,
    shared: Arc<Shared>,
    states: PerRole<ConnectionState>,
    streams_opened: u64,
}

impl SimulatedSource {
    pub fn new(settings: SimulatorSettings) -> Self {
        let shared = Arc::new(Shared {
            started: Instant::now(),
            tick_ms: settings.tick_ms.max(1),
            load: Mutex::new(LoadModel::new(&settings)),
        });
        Self {
            settings,
            shared,
            states: PerRole::new(ConnectionState::Connected, ConnectionState::Connected),
            streams_opened: 0,
        }
    }

    pub fn handle(&self) -> SimulatorHandle {
        SimulatorHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    fn interval(&self, role: Role) -> Duration {
        let ms = match role {
            Role::Strain => self.settings.strain_interval_ms,
            Role::Motion => self.settings.motion_interval_ms,
        };
        Duration::from_millis(ms.max(1))
    }

    fn noise(&mut self) -> Box<dyn NoiseSource> {
        // Distinct but reproducible stream per opened reader
        let seed = self.settings.seed.map(|s| s.wrapping_add(self.streams_opened));
        self.streams_opened += 1;
        if self.settings.noise_enabled {
            Box::new(UniformNoise::new(seed))
        } else {
            Box::new(ZeroNoise)
        }
    }
}

impl SampleSource for SimulatedSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Simulated
    }

    fn open_stream(&mut self, role: Role) -> Result<Box<dyn SampleStream>, AcquisitionError> {
        let interval = self.interval(role);
        let noise = self.noise();
        *self.states.get_mut(role) = ConnectionState::Connected;
        debug!(%role, interval_ms = interval.as_millis() as u64, "Opening simulated stream");

        Ok(Box::new(SimulatedStream {
            role,
            shared: Arc::clone(&self.shared),
            interval,
            next_due: self.shared.started.elapsed(),
            noise,
        }))
    }

    fn send_command(&mut self, role: Role, command: DeviceCommand) -> Result<(), AcquisitionError> {
        debug!(%role, command = command.as_str(), "Simulated device ignores command");
        Ok(())
    }

    fn connection_state(&self, role: Role) -> ConnectionState {
        *self.states.get(role)
    }

    fn mark_faulted(&mut self, role: Role) {
        *self.states.get_mut(role) = ConnectionState::Faulted;
    }
}

/// One simulated device, emitting on a fixed interval
pub struct SimulatedStream {
    role: Role,
    shared: Arc<Shared>,
    interval: Duration,
    next_due: Duration,
    noise: Box<dyn NoiseSource>,
}

impl SampleStream for SimulatedStream {
    fn role(&self) -> Role {
        self.role
    }

    fn next_sample(&mut self, timeout: Duration) -> Result<Option<Sample>, StreamError> {
        let elapsed = self.shared.started.elapsed();
        if elapsed < self.next_due {
            let wait = self.next_due - elapsed;
            if wait > timeout {
                std::thread::sleep(timeout);
                return Ok(None);
            }
            std::thread::sleep(wait);
        }

        let now = self.shared.started.elapsed();
        let timestamp = now.as_millis() as u64;
        let load = self
            .shared
            .load
            .lock()
            .advance_to(timestamp / self.shared.tick_ms);

        let t = timestamp as f64;
        let values = match self.role {
            Role::Strain => strain_values(load, t, self.noise.as_mut()),
            Role::Motion => motion_values(load, t, self.noise.as_mut()),
        };

        self.next_due += self.interval;
        if self.next_due < now {
            // Fell behind; resume the cadence from now instead of bursting
            self.next_due = now + self.interval;
        }

        Ok(Some(Sample::new(self.role, timestamp, values)?))
    }
}

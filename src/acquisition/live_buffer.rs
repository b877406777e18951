// src/acquisition/live_buffer.rs
//! Bounded per-series history for live display
//!
//! One lock guards every series, so a frame push and a full-frame snapshot
//! are each atomic with respect to the other. Readers always get copies.

use crate::acquisition::sink::SampleSink;
use crate::error::{DeckError, SinkError};
use crate::hal::{Role, Sample, SeriesId};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Copy of one series at a point in time
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSnapshot {
    pub id: SeriesId,
    pub points: Vec<(u64, f64)>,
    pub extreme: f64,
}

/// Consistent copy of every series
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayFrame {
    pub series: Vec<SeriesSnapshot>,
}

impl DisplayFrame {
    pub fn get(&self, id: SeriesId) -> Option<&SeriesSnapshot> {
        self.series.iter().find(|s| s.id == id)
    }

    /// Shared axis bound for all series of a role
    pub fn group_extreme(&self, role: Role) -> f64 {
        self.series
            .iter()
            .filter(|s| s.id.role() == role)
            .map(|s| s.extreme)
            .fold(0.0, f64::max)
    }

    pub fn is_empty(&self) -> bool {
        self.series.iter().all(|s| s.points.is_empty())
    }
}

struct SeriesSet {
    points: Vec<VecDeque<(u64, f64)>>,
    extremes: Vec<f64>,
}

impl SeriesSet {
    fn push(&mut self, capacity: usize, id: SeriesId, timestamp: u64, value: f64) {
        let queue = &mut self.points[id.index()];
        if queue.len() == capacity {
            queue.pop_front();
        }
        queue.push_back((timestamp, value));

        let extreme = &mut self.extremes[id.index()];
        *extreme = extreme.max(value.abs());
    }
}

/// Fixed-capacity ring of `(timestamp, value)` points per display series
pub struct LiveBuffer {
    capacity: usize,
    floor: f64,
    inner: Mutex<SeriesSet>,
}

impl LiveBuffer {
    pub fn new(capacity: usize, floor: f64) -> Result<Self, DeckError> {
        if capacity == 0 {
            return Err(DeckError::Configuration(
                "live buffer capacity must be greater than zero".to_string(),
            ));
        }
        if !(floor.is_finite() && floor >= 0.0) {
            return Err(DeckError::Configuration(format!(
                "live buffer extreme floor must be a non-negative number, got {floor}"
            )));
        }

        Ok(Self {
            capacity,
            floor,
            inner: Mutex::new(SeriesSet {
                points: (0..SeriesId::COUNT)
                    .map(|_| VecDeque::with_capacity(capacity))
                    .collect(),
                extremes: vec![floor; SeriesId::COUNT],
            }),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn push(&self, id: SeriesId, timestamp: u64, value: f64) {
        self.inner.lock().push(self.capacity, id, timestamp, value);
    }

    /// Push every display series carried by a sample in one critical section.
    /// Motion samples contribute their pitch angles only.
    pub fn push_sample(&self, sample: &Sample) {
        let timestamp = sample.timestamp();
        let mut inner = self.inner.lock();
        match sample.role() {
            Role::Strain => {
                for (id, value) in SeriesId::of_role(Role::Strain).zip(sample.values()) {
                    inner.push(self.capacity, id, timestamp, *value);
                }
            }
            Role::Motion => {
                for (id, value) in SeriesId::of_role(Role::Motion).zip(sample.pitches()) {
                    inner.push(self.capacity, id, timestamp, value);
                }
            }
        }
    }

    pub fn snapshot(&self, id: SeriesId) -> Vec<(u64, f64)> {
        self.inner.lock().points[id.index()].iter().copied().collect()
    }

    /// Largest magnitude seen since the last clear, never below the floor
    pub fn running_extreme(&self, id: SeriesId) -> f64 {
        self.inner.lock().extremes[id.index()]
    }

    pub fn group_extreme(&self, role: Role) -> f64 {
        let inner = self.inner.lock();
        SeriesId::of_role(role)
            .map(|id| inner.extremes[id.index()])
            .fold(self.floor, f64::max)
    }

    pub fn len(&self, id: SeriesId) -> usize {
        self.inner.lock().points[id.index()].len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().points.iter().all(VecDeque::is_empty)
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        for queue in &mut inner.points {
            queue.clear();
        }
        inner.extremes.fill(self.floor);
    }

    /// Copy every series under a single lock
    pub fn frame(&self) -> DisplayFrame {
        let inner = self.inner.lock();
        DisplayFrame {
            series: SeriesId::all()
                .map(|id| SeriesSnapshot {
                    id,
                    points: inner.points[id.index()].iter().copied().collect(),
                    extreme: inner.extremes[id.index()],
                })
                .collect(),
        }
    }
}

impl SampleSink for LiveBuffer {
    fn consume(&self, sample: &Sample) -> Result<(), SinkError> {
        self.push_sample(sample);
        Ok(())
    }
}

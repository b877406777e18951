// src/session/stats.rs
//! Streaming summary statistics for a recording session

use crate::config::constants::protocol;
use crate::hal::{PerRole, Role, Sample};
use crate::session::Summary;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Summary of one recorded column
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelStatistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Population standard deviation
    pub std: f64,
}

/// Welford accumulator
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    min: f64,
    max: f64,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn statistics(&self) -> Option<ChannelStatistics> {
        if self.count == 0 {
            return None;
        }
        let variance = (self.m2 / self.count as f64).max(0.0);
        Some(ChannelStatistics {
            min: self.min,
            max: self.max,
            mean: self.mean,
            std: variance.sqrt(),
        })
    }
}

#[derive(Debug, Clone)]
struct RoleStats {
    columns: Vec<RunningStats>,
    first_timestamp: Option<u64>,
    last_timestamp: Option<u64>,
    samples: u64,
}

impl RoleStats {
    fn new(role: Role) -> Self {
        Self {
            columns: vec![RunningStats::default(); role.value_count()],
            first_timestamp: None,
            last_timestamp: None,
            samples: 0,
        }
    }

    fn record(&mut self, sample: &Sample) {
        for (column, value) in self.columns.iter_mut().zip(sample.values()) {
            column.push(*value);
        }
        self.first_timestamp.get_or_insert(sample.timestamp());
        self.last_timestamp = Some(sample.timestamp());
        self.samples += 1;
    }

    /// Last minus first timestamp, when there are at least two samples
    fn span(&self) -> Option<u64> {
        match (self.samples, self.first_timestamp, self.last_timestamp) {
            (n, Some(first), Some(last)) if n >= 2 => Some(last.saturating_sub(first)),
            _ => None,
        }
    }

    fn statistics(&self, role: Role) -> BTreeMap<String, ChannelStatistics> {
        role.column_names()
            .into_iter()
            .zip(&self.columns)
            .filter_map(|(name, column)| column.statistics().map(|stats| (name, stats)))
            .collect()
    }
}

/// Accumulates everything the session summary needs while samples are appended
#[derive(Debug, Clone)]
pub struct SessionStats {
    roles: PerRole<RoleStats>,
}

impl Default for SessionStats {
    fn default() -> Self {
        Self {
            roles: PerRole::new(RoleStats::new(Role::Strain), RoleStats::new(Role::Motion)),
        }
    }
}

impl SessionStats {
    pub fn record(&mut self, sample: &Sample) {
        self.roles.get_mut(sample.role()).record(sample);
    }

    pub fn samples(&self, role: Role) -> u64 {
        self.roles.get(role).samples
    }

    pub fn summary(&self) -> Summary {
        let strain = self.roles.get(Role::Strain);
        let motion = self.roles.get(Role::Motion);

        let duration_ms = strain.span().or_else(|| motion.span()).unwrap_or(0);

        let max_angle = (0..protocol::MOTION_SENSOR_COUNT)
            .filter_map(|sensor| {
                let pitch = &motion.columns[sensor * protocol::AXES_PER_SENSOR];
                pitch.statistics().map(|s| {
                    (format!("sensor{}", sensor + 1), s.min.abs().max(s.max.abs()))
                })
            })
            .collect();

        Summary {
            strain_statistics: strain.statistics(Role::Strain),
            motion_statistics: motion.statistics(Role::Motion),
            max_angle,
            duration_ms,
            duration_seconds: duration_ms as f64 / 1000.0,
            strain_samples: strain.samples,
            motion_samples: motion.samples,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strain(ts: u64, value: f64) -> Sample {
        Sample::new(Role::Strain, ts, vec![value; 8]).unwrap()
    }

    #[test]
    fn test_running_stats_population_std() {
        let mut stats = RunningStats::default();
        for v in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            stats.push(v);
        }
        let s = stats.statistics().unwrap();
        assert_eq!(s.min, 2.0);
        assert_eq!(s.max, 9.0);
        assert!((s.mean - 5.0).abs() < 1e-12);
        assert!((s.std - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_single_value_has_zero_std() {
        let mut stats = RunningStats::default();
        stats.push(-3.5);
        assert_eq!(stats.statistics().unwrap().std, 0.0);
        assert!(RunningStats::default().statistics().is_none());
    }

    #[test]
    fn test_empty_summary() {
        let summary = SessionStats::default().summary();
        assert!(summary.strain_statistics.is_empty());
        assert!(summary.motion_statistics.is_empty());
        assert!(summary.max_angle.is_empty());
        assert_eq!(summary.duration_ms, 0);
        assert_eq!(summary.duration_seconds, 0.0);
    }

    #[test]
    fn test_duration_prefers_strain() {
        let mut stats = SessionStats::default();
        stats.record(&strain(100, 1.0));
        stats.record(&Sample::new(Role::Motion, 0, vec![0.0; 9]).unwrap());
        stats.record(&Sample::new(Role::Motion, 5_000, vec![0.0; 9]).unwrap());
        // One strain sample: fall back to motion
        assert_eq!(stats.summary().duration_ms, 5_000);

        stats.record(&strain(2_600, 1.0));
        let summary = stats.summary();
        assert_eq!(summary.duration_ms, 2_500);
        assert_eq!(summary.duration_seconds, 2.5);
        assert_eq!(summary.strain_samples, 2);
        assert_eq!(summary.motion_samples, 2);
    }

    #[test]
    fn test_out_of_order_duration_saturates() {
        let mut stats = SessionStats::default();
        stats.record(&strain(500, 1.0));
        stats.record(&strain(100, 1.0));
        assert_eq!(stats.summary().duration_ms, 0);
    }

    #[test]
    fn test_max_angle_uses_pitch_magnitude() {
        let mut stats = SessionStats::default();
        let mut values = vec![0.0; 9];
        values[0] = -4.0;
        values[1] = 100.0; // roll, ignored
        values[6] = 2.0;
        stats.record(&Sample::new(Role::Motion, 1, values).unwrap());
        let mut values = vec![0.0; 9];
        values[0] = 3.0;
        stats.record(&Sample::new(Role::Motion, 2, values).unwrap());

        let summary = stats.summary();
        assert_eq!(summary.max_angle["sensor1"], 4.0);
        assert_eq!(summary.max_angle["sensor2"], 0.0);
        assert_eq!(summary.max_angle["sensor3"], 2.0);
        assert_eq!(summary.motion_statistics.len(), 9);
        assert_eq!(summary.motion_statistics["sensor1_roll"].max, 100.0);
    }
}

// Rackwatch - Rack telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Leak quorum evaluation.
//!
//! A CDU carries four leak sensors reading `0` (dry) or `1` (wet). One wet
//! sensor is not enough to raise the alarm: at least [`LEAK_QUORUM`] must
//! agree. The evaluation produces two exposure families:
//!
//! - **confirmed**: the alarm path, carries the actual readings once quorum
//!   is reached and zeros otherwise;
//! - **keep-watching**: carries the actual readings when exactly one sensor
//!   is wet, so it stays observable without alarming.
//!
//! The two families are never non-zero at the same time.

/// Leak sensor labels, in exposure order.
pub const LEAK_SENSORS: [&str; 4] = ["Sensor_L1", "Sensor_L2", "Sensor_RL1", "Sensor_RL2"];

/// Wet sensors required before a leak is confirmed.
pub const LEAK_QUORUM: usize = 2;

/// Rack label used for the keep-watching family.
pub fn keep_watching_rack(rack_name: &str) -> String {
    format!("keep-watching-{rack_name}")
}

/// The four leak readings of one CDU poll. Absent until observed.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LeakReadings {
    values: [Option<f64>; 4],
}

impl LeakReadings {
    /// Build from values in [`LEAK_SENSORS`] order.
    pub fn from_values(values: [Option<f64>; 4]) -> Self {
        Self { values }
    }

    /// Record `value` if `label` is a leak sensor. Returns whether it was.
    pub fn observe(&mut self, label: &str, value: f64) -> bool {
        match LEAK_SENSORS.iter().position(|s| *s == label) {
            Some(idx) => {
                self.values[idx] = Some(value);
                true
            }
            None => false,
        }
    }

    /// `(label, value)` pairs in exposure order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Option<f64>)> + '_ {
        LEAK_SENSORS.iter().copied().zip(self.values.iter().copied())
    }

    /// Number of sensors reading exactly 1.
    pub fn wet_count(&self) -> usize {
        self.values.iter().filter(|v| **v == Some(1.0)).count()
    }
}

/// Overall leak state of a CDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeakStatus {
    Dry,
    Watch,
    Confirmed,
}

/// Result of a quorum evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct LeakExposure {
    pub status: LeakStatus,
    pub wet_count: usize,
    pub confirmed: Vec<(&'static str, f64)>,
    pub keep_watching: Vec<(&'static str, f64)>,
}

/// Evaluate the leak quorum over one CDU poll.
pub fn evaluate(readings: &LeakReadings) -> LeakExposure {
    let wet_count = readings.wet_count();
    let status = if wet_count >= LEAK_QUORUM {
        LeakStatus::Confirmed
    } else if wet_count == 1 {
        LeakStatus::Watch
    } else {
        LeakStatus::Dry
    };

    let actual: Vec<(&'static str, f64)> = readings
        .iter()
        .map(|(label, value)| (label, value.unwrap_or(0.0)))
        .collect();
    let zeros: Vec<(&'static str, f64)> = LEAK_SENSORS.iter().map(|s| (*s, 0.0)).collect();

    let (confirmed, keep_watching) = match status {
        LeakStatus::Confirmed => (actual, zeros),
        LeakStatus::Watch => (zeros, actual),
        LeakStatus::Dry => (zeros.clone(), zeros),
    };

    LeakExposure {
        status,
        wet_count,
        confirmed,
        keep_watching,
    }
}

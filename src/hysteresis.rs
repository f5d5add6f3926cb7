// Rackwatch - Rack telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Failure hysteresis for polled health signals.
//!
//! A single failed poll against a remote controller is common (timeouts,
//! controller busy) and must not flip a health gauge. The tracker counts
//! consecutive failures per [`SensorKey`] and only reports the sensor as
//! failed once the count reaches the threshold. Recovery is immediate: one
//! successful poll clears the count.
//!
//! State lives for the whole process. The map is a [`DashMap`] so passes
//! polled in parallel can record outcomes for different keys without any
//! coordination.

use dashmap::DashMap;
use std::fmt;

/// Default number of consecutive failures before a sensor is reported failed.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 2;

/// Identity of a polled health signal, stable across cycles.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SensorKey {
    /// Kind of component (`psu`, `chassis`, `endpoint`, ...)
    pub component_type: String,
    /// Source the sensor was polled from (power shelf name, server address)
    pub source_id: String,
    /// Sensor within the source (`PSU_3`, `Chassis_A`, ...)
    pub sensor_id: String,
}

impl SensorKey {
    pub fn new(
        component_type: impl Into<String>,
        source_id: impl Into<String>,
        sensor_id: impl Into<String>,
    ) -> Self {
        Self {
            component_type: component_type.into(),
            source_id: source_id.into(),
            sensor_id: sensor_id.into(),
        }
    }
}

impl fmt::Display for SensorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.component_type, self.source_id, self.sensor_id
        )
    }
}

/// Per-key failure state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureState {
    pub consecutive_failures: u32,
    pub reported_failed: bool,
}

/// Consecutive-failure tracker keyed by [`SensorKey`].
#[derive(Debug)]
pub struct FailureTracker {
    threshold: u32,
    states: DashMap<SensorKey, FailureState>,
}

impl Default for FailureTracker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD)
    }
}

impl FailureTracker {
    /// Create a tracker. A threshold of 0 is treated as 1.
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            states: DashMap::new(),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Record one poll outcome and return whether the sensor is now
    /// reported as failed.
    pub fn record_outcome(&self, key: &SensorKey, succeeded: bool) -> bool {
        let mut state = self.states.entry(key.clone()).or_default();
        if succeeded {
            state.consecutive_failures = 0;
            state.reported_failed = false;
        } else {
            state.consecutive_failures = state.consecutive_failures.saturating_add(1);
            state.reported_failed = state.consecutive_failures >= self.threshold;
        }
        state.reported_failed
    }

    /// Convenience wrapper taking the poll `Result` directly.
    pub fn record_result<T, E>(&self, key: &SensorKey, result: &Result<T, E>) -> bool {
        self.record_outcome(key, result.is_ok())
    }

    /// Current state of a key, if it has ever been recorded.
    pub fn state(&self, key: &SensorKey) -> Option<FailureState> {
        self.states.get(key).map(|s| *s)
    }

    /// Number of keys seen so far.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

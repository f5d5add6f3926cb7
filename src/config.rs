// Rackwatch - Rack telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Configuration types for the cycle engine

use crate::hysteresis::DEFAULT_FAILURE_THRESHOLD;
use crate::rotor::DEFAULT_STALL_SPEED;
use serde::{Deserialize, Serialize};

/// Engine-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Consecutive poll failures before a health signal reports failed (default: 2)
    pub failure_threshold: u32,

    /// Pump/fan speed below which a driven unit is stalled (default: 100)
    pub stall_speed: f64,

    /// Rack identifier recorded in snapshot metadata
    pub rack_id: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            stall_speed: DEFAULT_STALL_SPEED,
            rack_id: String::new(),
        }
    }
}

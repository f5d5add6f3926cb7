// Rackwatch - Rack telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Pump and fan stall detection.
//!
//! A unit is failed when it is commanded to run (non-zero drive) but does
//! not spin up (speed below the stall threshold). Units missing either
//! reading are reported healthy: no data is not evidence of a fault.

use std::collections::{BTreeMap, BTreeSet};

/// Speed below which a driven unit is considered stalled.
pub const DEFAULT_STALL_SPEED: f64 = 100.0;

/// Rotating unit family. Pumps and fans have independent index spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RotorKind {
    Pump,
    Fan,
}

impl RotorKind {
    fn speed_prefix(&self) -> &'static str {
        match self {
            RotorKind::Pump => "RPM_P",
            RotorKind::Fan => "RPM_F",
        }
    }

    fn drive_prefix(&self) -> &'static str {
        match self {
            RotorKind::Pump => "PWM_P",
            RotorKind::Fan => "PWM_F",
        }
    }

    /// Prefix of the unit name (`Pump_1`, `Fan_3`).
    pub fn unit_prefix(&self) -> &'static str {
        match self {
            RotorKind::Pump => "Pump",
            RotorKind::Fan => "Fan",
        }
    }
}

/// Speed and drive readings of one unit family, keyed by unit index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RotorReadings {
    speed: BTreeMap<String, f64>,
    drive: BTreeMap<String, f64>,
}

impl RotorReadings {
    /// Record `value` if `label` is a speed or drive reading of `kind`.
    pub fn observe(&mut self, kind: RotorKind, label: &str, value: f64) -> bool {
        if let Some(idx) = label.strip_prefix(kind.speed_prefix()) {
            self.speed.insert(idx.to_string(), value);
            true
        } else if let Some(idx) = label.strip_prefix(kind.drive_prefix()) {
            self.drive.insert(idx.to_string(), value);
            true
        } else {
            false
        }
    }
}

/// Health verdict for one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct RotorHealth {
    pub index: String,
    pub failed: bool,
}

impl RotorHealth {
    /// Unit name, e.g. `Pump_2`.
    pub fn unit_name(&self, kind: RotorKind) -> String {
        format!("{}_{}", kind.unit_prefix(), self.index)
    }
}

/// Stall rule for a single unit.
pub fn is_stalled(speed: Option<f64>, drive: Option<f64>, stall_speed: f64) -> bool {
    match (speed, drive) {
        (Some(speed), Some(drive)) => speed < stall_speed && drive != 0.0,
        _ => false,
    }
}

/// Evaluate every unit that has at least one reading, ordered by index.
pub fn evaluate(readings: &RotorReadings, stall_speed: f64) -> Vec<RotorHealth> {
    let mut indices: Vec<&String> = readings
        .speed
        .keys()
        .chain(readings.drive.keys())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    indices.sort_by(|a, b| {
        (a.parse::<u64>().ok(), a.as_str()).cmp(&(b.parse::<u64>().ok(), b.as_str()))
    });

    indices
        .into_iter()
        .map(|idx| RotorHealth {
            index: idx.clone(),
            failed: is_stalled(
                readings.speed.get(idx).copied(),
                readings.drive.get(idx).copied(),
                stall_speed,
            ),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stall_rule() {
        assert!(is_stalled(Some(50.0), Some(30.0), DEFAULT_STALL_SPEED));
        assert!(!is_stalled(Some(50.0), Some(0.0), DEFAULT_STALL_SPEED));
        assert!(!is_stalled(None, Some(30.0), DEFAULT_STALL_SPEED));
        assert!(!is_stalled(Some(50.0), None, DEFAULT_STALL_SPEED));
        assert!(!is_stalled(Some(100.0), Some(30.0), DEFAULT_STALL_SPEED));
    }

    #[test]
    fn test_evaluate_pumps() {
        let mut pumps = RotorReadings::default();
        pumps.observe(RotorKind::Pump, "RPM_P1", 50.0);
        pumps.observe(RotorKind::Pump, "PWM_P1", 30.0);
        pumps.observe(RotorKind::Pump, "RPM_P2", 2400.0);
        pumps.observe(RotorKind::Pump, "PWM_P2", 60.0);
        pumps.observe(RotorKind::Pump, "PWM_P3", 40.0);

        let health = evaluate(&pumps, DEFAULT_STALL_SPEED);
        assert_eq!(health.len(), 3);
        assert!(health[0].failed);
        assert!(!health[1].failed);
        assert!(!health[2].failed);
        assert_eq!(health[0].unit_name(RotorKind::Pump), "Pump_1");
    }

    #[test]
    fn test_kinds_do_not_mix() {
        let mut fans = RotorReadings::default();
        assert!(!fans.observe(RotorKind::Fan, "RPM_P1", 50.0));
        assert!(!fans.observe(RotorKind::Fan, "POW_F1", 12.0));
        assert!(fans.observe(RotorKind::Fan, "RPM_F1", 50.0));
        assert_eq!(evaluate(&fans, DEFAULT_STALL_SPEED).len(), 1);
    }

    #[test]
    fn test_numeric_index_order() {
        let mut fans = RotorReadings::default();
        for idx in ["10", "2", "1"] {
            fans.observe(RotorKind::Fan, &format!("RPM_F{idx}"), 1500.0);
        }
        let order: Vec<String> = evaluate(&fans, DEFAULT_STALL_SPEED)
            .into_iter()
            .map(|h| h.index)
            .collect();
        assert_eq!(order, vec!["1", "2", "10"]);
    }
}

// Rackwatch - Rack telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Coolant tank level resolution from three float switches.

/// Highest-threshold switch.
pub const LEVEL_HIGH_SENSOR: &str = "Sensor_LEVH";
/// Mid-threshold switch.
pub const LEVEL_MID_SENSOR: &str = "Sensor_LEVM";
/// Lowest-threshold switch.
pub const LEVEL_LOW_SENSOR: &str = "Sensor_LEVL";

/// Switch readings of one CDU poll. `0` means the level is at or below the
/// switch; any other value means above. Absent readings are never `0`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TankSwitches {
    pub high: Option<f64>,
    pub mid: Option<f64>,
    pub low: Option<f64>,
}

impl TankSwitches {
    /// Record `value` if `label` is a tank switch. Returns whether it was.
    pub fn observe(&mut self, label: &str, value: f64) -> bool {
        let slot = match label {
            LEVEL_HIGH_SENSOR => &mut self.high,
            LEVEL_MID_SENSOR => &mut self.mid,
            LEVEL_LOW_SENSOR => &mut self.low,
            _ => return false,
        };
        *slot = Some(value);
        true
    }
}

/// Resolved tank level. At most one alarm flag is ever raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TankLevel {
    CriticalLow,
    Low,
    Medium,
    /// Above every switch; not separately flagged
    Nominal,
}

impl TankLevel {
    /// Resolve by priority: the lowest switch reading `0` wins.
    pub fn resolve(switches: &TankSwitches) -> Self {
        if switches.low == Some(0.0) {
            TankLevel::CriticalLow
        } else if switches.mid == Some(0.0) {
            TankLevel::Low
        } else if switches.high == Some(0.0) {
            TankLevel::Medium
        } else {
            TankLevel::Nominal
        }
    }

    /// `(flag name, 0|1)` for each of the three flags.
    pub fn flags(&self) -> [(&'static str, f64); 3] {
        let raised = |level: TankLevel| if *self == level { 1.0 } else { 0.0 };
        [
            ("Level_Medium", raised(TankLevel::Medium)),
            ("Level_Low", raised(TankLevel::Low)),
            ("Critical_Low", raised(TankLevel::CriticalLow)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn switches(low: f64, mid: f64, high: f64) -> TankSwitches {
        TankSwitches {
            high: Some(high),
            mid: Some(mid),
            low: Some(low),
        }
    }

    fn raised(level: TankLevel) -> Vec<&'static str> {
        level
            .flags()
            .iter()
            .filter(|(_, v)| *v == 1.0)
            .map(|(name, _)| *name)
            .collect()
    }

    #[test]
    fn test_priority_cascade() {
        assert_eq!(TankLevel::resolve(&switches(0.0, 0.0, 0.0)), TankLevel::CriticalLow);
        assert_eq!(TankLevel::resolve(&switches(1.0, 0.0, 0.0)), TankLevel::Low);
        assert_eq!(TankLevel::resolve(&switches(1.0, 1.0, 0.0)), TankLevel::Medium);
        assert_eq!(TankLevel::resolve(&switches(1.0, 1.0, 1.0)), TankLevel::Nominal);
    }

    #[test]
    fn test_exactly_one_flag() {
        assert_eq!(raised(TankLevel::resolve(&switches(0.0, 0.0, 0.0))), vec!["Critical_Low"]);
        assert_eq!(raised(TankLevel::resolve(&switches(1.0, 0.0, 0.0))), vec!["Level_Low"]);
        assert_eq!(raised(TankLevel::resolve(&switches(1.0, 1.0, 0.0))), vec!["Level_Medium"]);
        assert!(raised(TankLevel::Nominal).is_empty());
    }

    #[test]
    fn test_absent_switches_are_not_zero() {
        let partial = TankSwitches {
            low: None,
            mid: None,
            high: Some(0.0),
        };
        assert_eq!(TankLevel::resolve(&partial), TankLevel::Medium);
        assert_eq!(TankLevel::resolve(&TankSwitches::default()), TankLevel::Nominal);
    }

    #[test]
    fn test_observe() {
        let mut sw = TankSwitches::default();
        assert!(sw.observe("Sensor_LEVL", 0.0));
        assert!(!sw.observe("Sensor_L1", 1.0));
        assert_eq!(sw.low, Some(0.0));
    }

    #[test]
    fn test_resolve_is_pure() {
        let input = switches(1.0, 0.0, 1.0);
        assert_eq!(TankLevel::resolve(&input), TankLevel::resolve(&input));
    }
}

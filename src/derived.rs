// Rackwatch - Rack telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Coolant flow and heat rejection derived from CDU temperatures and the
//! rack's electrical power.
//!
//! None of these quantities can be read from a single source: they need the
//! aggregate power of every power shelf, gathered in the power-shelf pass,
//! and the coolant temperatures gathered in the CDU pass of the same cycle.
//! The power total is only obtainable as a finalized [`PowerTotal`], so the
//! calculator cannot run against a half-summed value.
//!
//! The flow formulas divide by a temperature delta and do not guard against
//! a zero delta. The IEEE result (infinite) is kept and reported as is; a
//! warning is logged so the sensor fault is visible.

use tracing::warn;

/// Water heat factor (W per L/min per degree).
pub const WATER_HEAT_FACTOR: f64 = 69.7833;

/// Electrical-to-thermal conversion efficiency of the power shelves.
pub const PSU_EFFICIENCY: f64 = 0.97;

/// Running sum of power-shelf output, open during the power-shelf pass.
#[derive(Debug, Default)]
pub struct PowerAccumulator {
    watts: f64,
    contributions: usize,
}

impl PowerAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, watts: f64) {
        self.watts += watts;
        self.contributions += 1;
    }

    /// Close the pass. Consumes the accumulator so nothing can be added
    /// after the total has been handed on.
    pub fn finalize(self) -> PowerTotal {
        PowerTotal {
            watts: self.watts,
            contributions: self.contributions,
        }
    }
}

/// Aggregate electrical power of one cycle, final.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerTotal {
    watts: f64,
    contributions: usize,
}

impl PowerTotal {
    pub fn watts(&self) -> f64 {
        self.watts
    }

    /// Number of power-shelf readings summed.
    pub fn contributions(&self) -> usize {
        self.contributions
    }
}

/// CDU temperatures used by the derivations. Absent until observed.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CoolantTemperatures {
    /// `T_WI`
    pub water_in: Option<f64>,
    /// `T_WO`
    pub water_out: Option<f64>,
    /// `T_CR`
    pub coolant_return: Option<f64>,
    /// `T_CCO`
    pub coolant_out: Option<f64>,
    /// `T_CCI`
    pub coolant_in: Option<f64>,
}

impl CoolantTemperatures {
    /// Record `value` if `label` is one of the derivation inputs.
    pub fn observe(&mut self, label: &str, value: f64) -> bool {
        let slot = match label {
            "T_WI" => &mut self.water_in,
            "T_WO" => &mut self.water_out,
            "T_CR" => &mut self.coolant_return,
            "T_CCO" => &mut self.coolant_out,
            "T_CCI" => &mut self.coolant_in,
            _ => return false,
        };
        *slot = Some(value);
        true
    }
}

/// Derived metrics of one CDU. Each is independently optional.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DerivedMetrics {
    /// Water-side flow, L/min
    pub lpm_w: Option<f64>,
    /// Coolant-side flow, L/min
    pub lpm_c: Option<f64>,
    /// Coolant heat rejection, W
    pub heat_cc: Option<f64>,
}

impl DerivedMetrics {
    /// Computed metrics as `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> {
        [
            ("LPM_W", self.lpm_w),
            ("LPM_C", self.lpm_c),
            ("Heat_CC", self.heat_cc),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v)))
    }

    pub fn is_empty(&self) -> bool {
        self.lpm_w.is_none() && self.lpm_c.is_none() && self.heat_cc.is_none()
    }
}

/// Round to two decimals from the exact binary value, so 1.115 (stored as
/// 1.11499...) gives 1.11. Non-finite values pass through.
fn round2(value: f64) -> f64 {
    format!("{value:.2}").parse().unwrap_or(value)
}

fn checked_delta(metric: &str, hot: f64, cold: f64) -> f64 {
    let delta = hot - cold;
    if delta == 0.0 {
        warn!(metric, hot, cold, "Zero temperature delta, flow is unbounded");
    }
    delta
}

/// Compute the derived metrics.
///
/// `power` is `None` when no power-shelf total is available for the cycle;
/// a total of zero watts is treated the same way.
pub fn compute(temps: &CoolantTemperatures, power: Option<&PowerTotal>) -> DerivedMetrics {
    let watts = match power.map(PowerTotal::watts) {
        Some(w) if w != 0.0 => w,
        _ => return DerivedMetrics::default(),
    };

    let mut out = DerivedMetrics::default();

    if let (Some(t_in), Some(t_out)) = (temps.water_in, temps.water_out) {
        let delta = checked_delta("LPM_W", t_out, t_in);
        out.lpm_w = Some(round2((watts / PSU_EFFICIENCY) / WATER_HEAT_FACTOR / delta));
    }

    let mut lpm_c_exact = None;
    if let (Some(t_cr), Some(t_cco)) = (temps.coolant_return, temps.coolant_out) {
        let delta = checked_delta("LPM_C", t_cr, t_cco);
        let lpm_c = watts / WATER_HEAT_FACTOR / delta;
        lpm_c_exact = Some(lpm_c);
        out.lpm_c = Some(round2(lpm_c));
    }

    if let (Some(lpm_c), Some(t_cco), Some(t_cci)) =
        (lpm_c_exact, temps.coolant_out, temps.coolant_in)
    {
        out.heat_cc = Some(round2(lpm_c * (t_cco - t_cci) * WATER_HEAT_FACTOR));
    }

    out
}

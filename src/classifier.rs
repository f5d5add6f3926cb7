// Rackwatch - Rack telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Sensor label classification
//!
//! Maps a raw sensor label to the metric category it is exposed under.
//! Classification is a total function: every label gets a category and
//! nothing here ever fails.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metric category of a sensor label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricCategory {
    Temperature,
    Pump,
    Fan,
    Sensor,
    Unclassified,
}

impl MetricCategory {
    /// Name of the category, as logged per reading.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricCategory::Temperature => "Temperature",
            MetricCategory::Pump => "Pump",
            MetricCategory::Fan => "Fan",
            MetricCategory::Sensor => "Sensor",
            MetricCategory::Unclassified => "Unclassified",
        }
    }
}

/// Server component a table temperature belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThermalComponent {
    Cpu,
    Memory,
    Gpu,
}

/// Server temperature sensors that are exposed, with their component.
const SERVER_TEMPERATURES: &[(&str, ThermalComponent)] = &[
    ("Temp_CPU0", ThermalComponent::Cpu),
    ("Temp_CPU1", ThermalComponent::Cpu),
    ("Temp_CPU0_DIMMG0", ThermalComponent::Memory),
    ("Temp_CPU0_DIMMG1", ThermalComponent::Memory),
    ("Temp_CPU1_DIMMG0", ThermalComponent::Memory),
    ("Temp_CPU1_DIMMG1", ThermalComponent::Memory),
    ("Temp_GPU_1", ThermalComponent::Gpu),
    ("Temp_GPU_2", ThermalComponent::Gpu),
    ("Temp_GPU_3", ThermalComponent::Gpu),
    ("Temp_GPU_4", ThermalComponent::Gpu),
];

const PUMP_PREFIXES: [&str; 3] = ["RPM_P", "POW_P", "PWM_P"];
const FAN_PREFIXES: [&str; 3] = ["RPM_F", "POW_F", "PWM_F"];

/// Look up a label in the server temperature table.
pub fn server_thermal_component(label: &str) -> Option<ThermalComponent> {
    SERVER_TEMPERATURES
        .iter()
        .find(|(name, _)| *name == label)
        .map(|(_, component)| *component)
}

/// Classify a sensor label.
///
/// Rules apply in priority order: the server temperature table, then the
/// `T_`/`Ta` temperature convention, then pump prefixes, then fan prefixes.
/// Anything else is a generic `Sensor`. The empty label is `Unclassified`.
pub fn classify(label: &str) -> MetricCategory {
    if label.is_empty() {
        return MetricCategory::Unclassified;
    }
    if server_thermal_component(label).is_some() {
        return MetricCategory::Temperature;
    }
    if label.starts_with("T_") || label == "Ta" {
        return MetricCategory::Temperature;
    }
    if PUMP_PREFIXES.iter().any(|p| label.starts_with(p)) {
        return MetricCategory::Pump;
    }
    if FAN_PREFIXES.iter().any(|p| label.starts_with(p)) {
        return MetricCategory::Fan;
    }
    MetricCategory::Sensor
}

/// Numeric view of a raw JSON value.
///
/// Integers and floats are numeric, and so are booleans (`true` is 1,
/// `false` is 0). Strings, null, arrays and objects yield `None` ("skipped").
pub fn numeric_value(raw: &Value) -> Option<f64> {
    match raw {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// A labelled value exactly as a source returned it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawReading {
    pub label: String,
    pub value: Value,
}

impl RawReading {
    pub fn new(label: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// A classified reading. `value` is `None` when the raw value was not numeric.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub label: String,
    pub value: Option<f64>,
    pub category: MetricCategory,
}

impl SensorReading {
    /// Classify a raw reading.
    pub fn from_raw(raw: &RawReading) -> Self {
        Self {
            label: raw.label.clone(),
            value: numeric_value(&raw.value),
            category: classify(&raw.label),
        }
    }
}

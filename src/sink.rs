// Rackwatch - Rack telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Metric exposition interface.
//!
//! The engine calls a [`MetricSink`] once per computed value. The sink owns
//! registration, typing and serialization. Label values are positional and
//! follow [`Metric::label_names`].

use std::collections::BTreeMap;
use std::sync::Mutex;

/// Every gauge the engine can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    ServerCpuTemperature,
    ServerMemoryTemperature,
    ServerGpuTemperature,
    ServerPower,
    ServerFanPower,
    ServerCpuPower,
    ServerGpuPower,
    ServerMemPower,
    PsuOutputPower,
    PowershelfPsuFail,
    PowershelfChassisFail,
    CduTemperature,
    CduPump,
    CduFan,
    CduSensor,
    CduTankLevel,
    CduLeakage,
    CduPumpFail,
    CduFanFail,
    CduCalculated,
    SourcePollFailed,
}

const SERVER_TEMPERATURE_LABELS: &[&str] = &["server_name", "sensor_name", "rack_name"];
const SERVER_POWER_LABELS: &[&str] = &["server", "rack_name"];
const SENSOR_RACK_LABELS: &[&str] = &["sensor_name", "rack_name"];
const METRIC_RACK_LABELS: &[&str] = &["metric", "rack_name"];

impl Metric {
    pub const ALL: [Metric; 21] = [
        Metric::ServerCpuTemperature,
        Metric::ServerMemoryTemperature,
        Metric::ServerGpuTemperature,
        Metric::ServerPower,
        Metric::ServerFanPower,
        Metric::ServerCpuPower,
        Metric::ServerGpuPower,
        Metric::ServerMemPower,
        Metric::PsuOutputPower,
        Metric::PowershelfPsuFail,
        Metric::PowershelfChassisFail,
        Metric::CduTemperature,
        Metric::CduPump,
        Metric::CduFan,
        Metric::CduSensor,
        Metric::CduTankLevel,
        Metric::CduLeakage,
        Metric::CduPumpFail,
        Metric::CduFanFail,
        Metric::CduCalculated,
        Metric::SourcePollFailed,
    ];

    /// Exposition name.
    pub fn name(&self) -> &'static str {
        match self {
            Metric::ServerCpuTemperature => "server_cpu_temperature_celsius",
            Metric::ServerMemoryTemperature => "server_memory_temperature_celsius",
            Metric::ServerGpuTemperature => "server_gpu_temperature_celsius",
            Metric::ServerPower => "server_power_watt",
            Metric::ServerFanPower => "server_fan_power_watt",
            Metric::ServerCpuPower => "server_cpu_power_watt",
            Metric::ServerGpuPower => "server_gpu_power_watt",
            Metric::ServerMemPower => "server_mem_power_watt",
            Metric::PsuOutputPower => "psu_output_power_watt",
            Metric::PowershelfPsuFail => "powershelf_psu_fail",
            Metric::PowershelfChassisFail => "powershelf_chassis_fail",
            Metric::CduTemperature => "cdu_temperature_celsius",
            Metric::CduPump => "cdu_pump_metric",
            Metric::CduFan => "cdu_fan_metric",
            Metric::CduSensor => "cdu_sensor_metric",
            Metric::CduTankLevel => "cdu_tank_level",
            Metric::CduLeakage => "cdu_leakage",
            Metric::CduPumpFail => "cdu_pump_fail",
            Metric::CduFanFail => "cdu_fan_fail",
            Metric::CduCalculated => "cdu_calculated_metric",
            Metric::SourcePollFailed => "rackwatch_source_poll_failed",
        }
    }

    /// Help text.
    pub fn help(&self) -> &'static str {
        match self {
            Metric::ServerCpuTemperature => "CPU temperature sensors",
            Metric::ServerMemoryTemperature => "Memory temperature sensors",
            Metric::ServerGpuTemperature => "GPU temperature sensors",
            Metric::ServerPower => "Total power reading",
            Metric::ServerFanPower => "Total fan power reading",
            Metric::ServerCpuPower => "Total CPU power reading",
            Metric::ServerGpuPower => "Total GPU power reading",
            Metric::ServerMemPower => "Total memory power reading",
            Metric::PsuOutputPower => "Output power reading from PSU",
            Metric::PowershelfPsuFail => "PSU health status (0: OK, 1: Not OK)",
            Metric::PowershelfChassisFail => "PSU chassis input health status (0: OK, 1: Not OK)",
            Metric::CduTemperature => "Temperature metrics from CDU",
            Metric::CduPump => "Pump metrics from CDU",
            Metric::CduFan => "Fan metrics from CDU",
            Metric::CduSensor => "Sensor metrics from CDU",
            Metric::CduTankLevel => "Water tank level status from CDU",
            Metric::CduLeakage => "Leakage sensor readings from CDU",
            Metric::CduPumpFail => "CDU pump failure status (1: fail, 0: ok)",
            Metric::CduFanFail => "CDU fan failure status (1: fail, 0: ok)",
            Metric::CduCalculated => "Calculated metrics from CDU",
            Metric::SourcePollFailed => {
                "Source endpoint poll failure after hysteresis (1: failing, 0: ok)"
            }
        }
    }

    /// Label keys, in the order label values are passed.
    pub fn label_names(&self) -> &'static [&'static str] {
        match self {
            Metric::ServerCpuTemperature
            | Metric::ServerMemoryTemperature
            | Metric::ServerGpuTemperature => SERVER_TEMPERATURE_LABELS,
            Metric::ServerPower
            | Metric::ServerFanPower
            | Metric::ServerCpuPower
            | Metric::ServerGpuPower
            | Metric::ServerMemPower => SERVER_POWER_LABELS,
            Metric::PsuOutputPower => &["psu_name", "rack_name"],
            Metric::PowershelfPsuFail
            | Metric::PowershelfChassisFail
            | Metric::CduTankLevel
            | Metric::CduLeakage
            | Metric::CduPumpFail
            | Metric::CduFanFail => SENSOR_RACK_LABELS,
            Metric::CduTemperature
            | Metric::CduPump
            | Metric::CduFan
            | Metric::CduSensor
            | Metric::CduCalculated => METRIC_RACK_LABELS,
            Metric::SourcePollFailed => &["source_type", "source", "endpoint"],
        }
    }
}

/// Receiver of computed metric values.
pub trait MetricSink: Send + Sync {
    /// Publish a value.
    fn set(&self, metric: Metric, labels: &[&str], value: f64);

    /// A value was polled but not numeric. The engine never invents a value;
    /// whether to zero-fill is the sink's policy. Default: leave untouched.
    fn mark_absent(&self, metric: Metric, labels: &[&str]) {
        let _ = (metric, labels);
    }
}

/// In-memory sink keeping the last value per series.
///
/// Absent marks are recorded as `None`.
#[derive(Debug, Default)]
pub struct MemorySink {
    series: Mutex<BTreeMap<(Metric, Vec<String>), Option<f64>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(metric: Metric, labels: &[&str]) -> (Metric, Vec<String>) {
        (metric, labels.iter().map(|l| l.to_string()).collect())
    }

    fn write(&self, metric: Metric, labels: &[&str], value: Option<f64>) {
        if let Ok(mut series) = self.series.lock() {
            series.insert(Self::key(metric, labels), value);
        }
    }

    /// Last value of a series. `Some(None)` means marked absent.
    pub fn get(&self, metric: Metric, labels: &[&str]) -> Option<Option<f64>> {
        self.series
            .lock()
            .ok()
            .and_then(|s| s.get(&Self::key(metric, labels)).copied())
    }

    /// Last numeric value of a series.
    pub fn value(&self, metric: Metric, labels: &[&str]) -> Option<f64> {
        self.get(metric, labels).flatten()
    }

    /// Number of series of `metric`.
    pub fn count(&self, metric: Metric) -> usize {
        self.series
            .lock()
            .map(|s| s.keys().filter(|(m, _)| *m == metric).count())
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.series.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MetricSink for MemorySink {
    fn set(&self, metric: Metric, labels: &[&str], value: f64) {
        self.write(metric, labels, Some(value));
    }

    fn mark_absent(&self, metric: Metric, labels: &[&str]) {
        self.write(metric, labels, None);
    }
}

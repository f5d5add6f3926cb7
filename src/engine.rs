// Rackwatch - Rack telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Per-cycle processing of polled documents.
//!
//! [`CycleEngine`] turns the raw documents of one cycle into metric values
//! (pushed to a [`MetricSink`]) and a [`CycleSnapshot`]. It owns the only
//! state that outlives a cycle, the [`FailureTracker`].
//!
//! # Pass order
//!
//! Servers, then power shelves, then CDUs. The power-shelf pass sums every
//! shelf's output into a [`PowerAccumulator`] which is finalized before the
//! first CDU is processed; the CDU pass only ever sees the final
//! [`PowerTotal`].
//!
//! # Example
//!
//! ```rust
//! use rackwatch::{CduDescriptor, CduPoll, CycleEngine, CycleInput, EngineConfig, MemorySink, Metric};
//! use serde_json::json;
//!
//! let engine = CycleEngine::new(EngineConfig::default());
//! let sink = MemorySink::new();
//!
//! let input = CycleInput {
//!     cdus: vec![CduPoll {
//!         source: CduDescriptor::new("http://cdu.local/api", "R01"),
//!         document: Ok(json!({"responses": [{"RPM_P1": 50, "PWM_P1": 30}]})),
//!     }],
//!     ..Default::default()
//! };
//!
//! let report = engine.process_cycle(&input, &sink);
//! assert_eq!(sink.value(Metric::CduPumpFail, &["Pump_1", "R01"]), Some(1.0));
//! assert!(report.snapshot.cdu.contains_key("R01"));
//! ```

use crate::classifier::{server_thermal_component, MetricCategory, SensorReading, ThermalComponent};
use crate::config::EngineConfig;
use crate::derived::{self, CoolantTemperatures, PowerAccumulator, PowerTotal};
use crate::hysteresis::{FailureTracker, SensorKey};
use crate::leak::{self, LeakReadings};
use crate::payload::{self, SensorValue};
use crate::rotor::{self, RotorKind, RotorReadings};
use crate::sink::{Metric, MetricSink};
use crate::snapshot::{CduEntry, CycleSnapshot, NodeEntry, PowerShelfEntry, SnapshotValue};
use crate::source::{psu_slot_name, CduPoll, CycleInput, PollResult, PowerShelfPoll, ServerPoll};
use crate::tank::{TankLevel, TankSwitches};
use serde_json::Value;
use tracing::{debug, error, warn};

/// Result of one processed cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub snapshot: CycleSnapshot,
    /// Aggregate power handed to the CDU pass
    pub power: PowerTotal,
    /// Endpoints that could not be read this cycle
    pub failed_endpoints: usize,
}

/// Stateful per-cycle processor.
#[derive(Debug)]
pub struct CycleEngine {
    config: EngineConfig,
    tracker: FailureTracker,
    exporter_version: String,
}

impl CycleEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            tracker: FailureTracker::new(config.failure_threshold),
            config,
            exporter_version: crate::VERSION.to_string(),
        }
    }

    /// Version string recorded in snapshot metadata.
    pub fn with_exporter_version(mut self, version: impl Into<String>) -> Self {
        self.exporter_version = version.into();
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tracker(&self) -> &FailureTracker {
        &self.tracker
    }

    /// Process a full cycle in pass order.
    pub fn process_cycle(&self, input: &CycleInput, sink: &dyn MetricSink) -> CycleReport {
        let mut snapshot = CycleSnapshot::new(&self.exporter_version, &self.config.rack_id);
        let failed_endpoints = count_failures(input);

        for poll in &input.servers {
            let entry = self.process_server(poll, sink);
            snapshot
                .nodes
                .insert(poll.source.display_name().to_string(), entry);
        }

        let mut accumulator = PowerAccumulator::new();
        for poll in &input.power_shelves {
            let entry = self.process_power_shelf(poll, &mut accumulator, sink);
            snapshot
                .powershelf
                .insert(poll.source.display_name().to_string(), entry);
        }
        let power = accumulator.finalize();
        debug!(
            watts = power.watts(),
            shelves = power.contributions(),
            "Power total finalized"
        );

        for poll in &input.cdus {
            let entry = self.process_cdu(poll, Some(&power), sink);
            snapshot.cdu.insert(poll.source.rack_name.clone(), entry);
        }

        CycleReport {
            snapshot,
            power,
            failed_endpoints,
        }
    }

    /// Server pass for one BMC.
    pub fn process_server(&self, poll: &ServerPoll, sink: &dyn MetricSink) -> NodeEntry {
        let source = &poll.source;
        let ip = source.address.as_str();
        let rack = source.rack_name.as_str();
        let mut entry = NodeEntry::new(ip, source.display_name());

        self.track_endpoint("server", ip, "Thermal", &poll.thermal, sink);
        match &poll.thermal {
            Ok(doc) => {
                for reading in payload::thermal_readings(doc) {
                    entry.sensors.insert(
                        reading.name.clone(),
                        SnapshotValue::new(reading.value.clone(), Some(reading.unit.as_str())),
                    );

                    let Some(component) = server_thermal_component(&reading.name) else {
                        continue;
                    };
                    let metric = thermal_metric(component);
                    let labels = [ip, reading.name.as_str(), rack];
                    match reading.value.as_f64() {
                        Some(value) => {
                            sink.set(metric, &labels, value);
                            debug!(server = ip, sensor = %reading.name, value, "Temperature");
                        }
                        None => {
                            sink.mark_absent(metric, &labels);
                            debug!(
                                server = ip,
                                sensor = %reading.name,
                                state = %reading.state,
                                "Temperature has no value, skipped"
                            );
                        }
                    }
                }
            }
            Err(e) => error!(server = ip, error = %e, "Thermal API error"),
        }

        for (sensor, result) in &poll.power {
            self.track_endpoint("server", ip, sensor, result, sink);
            let doc = match result {
                Ok(doc) => doc,
                Err(e) => {
                    error!(server = ip, sensor = %sensor, error = %e, "Power sensor API error");
                    continue;
                }
            };

            let reading = payload::sensor_value(doc, "W").unwrap_or(SensorValue {
                value: Value::Null,
                unit: "W".to_string(),
            });
            entry.sensors.insert(
                sensor.clone(),
                SnapshotValue::new(reading.value.clone(), Some(reading.unit.as_str())),
            );

            let Some(metric) = server_power_metric(sensor) else {
                continue;
            };
            match reading.value.as_f64() {
                Some(watts) => {
                    sink.set(metric, &[ip, rack], watts);
                    debug!(server = ip, sensor = %sensor, watts, "Power");
                }
                None => {
                    sink.mark_absent(metric, &[ip, rack]);
                    warn!(server = ip, sensor = %sensor, "Power sensor invalid value, skipped");
                }
            }
        }

        entry
    }

    /// Power-shelf pass for one shelf. Numeric output power is added to
    /// `power`.
    pub fn process_power_shelf(
        &self,
        poll: &PowerShelfPoll,
        power: &mut PowerAccumulator,
        sink: &dyn MetricSink,
    ) -> PowerShelfEntry {
        let name = poll.source.display_name();
        let rack = poll.source.rack_name.as_str();
        let mut entry = PowerShelfEntry::new();

        self.track_endpoint("powershelf", name, "Output_Power", &poll.output_power, sink);
        match &poll.output_power {
            Ok(doc) => match payload::sensor_value(doc, "W") {
                Some(reading) => {
                    entry.insert(
                        "Output_Power".to_string(),
                        SnapshotValue::new(reading.value.clone(), Some(reading.unit.as_str())),
                    );
                    match reading.value.as_f64() {
                        Some(watts) => {
                            sink.set(Metric::PsuOutputPower, &[name, rack], watts);
                            power.add(watts);
                            debug!(shelf = name, watts, "Output power");
                        }
                        None => {
                            sink.mark_absent(Metric::PsuOutputPower, &[name, rack]);
                            warn!(shelf = name, "Output power has no value");
                        }
                    }
                }
                None => warn!(shelf = name, "Output power sensor unavailable"),
            },
            Err(e) => error!(shelf = name, error = %e, "Output power fetch failed"),
        }

        for (slot, result) in &poll.psu_status {
            let sensor = psu_slot_name(*slot);
            let key = SensorKey::new("psu", name, sensor.as_str());
            self.apply_status(
                &key,
                result,
                Metric::PowershelfPsuFail,
                &sensor,
                rack,
                &mut entry,
                sink,
            );
        }

        for (feed, result) in &poll.chassis_status {
            let key = SensorKey::new("chassis", name, feed.label());
            self.apply_status(
                &key,
                result,
                Metric::PowershelfChassisFail,
                feed.label(),
                rack,
                &mut entry,
                sink,
            );
        }

        entry
    }

    /// Health status endpoint with hysteresis. On success the gauge follows
    /// `Status.Health`; a failure is only surfaced once the tracker reports
    /// it, otherwise the previous value stands.
    #[allow(clippy::too_many_arguments)]
    fn apply_status(
        &self,
        key: &SensorKey,
        result: &PollResult,
        metric: Metric,
        sensor: &str,
        rack: &str,
        entry: &mut PowerShelfEntry,
        sink: &dyn MetricSink,
    ) {
        let shelf = key.source_id.as_str();
        match result {
            Ok(doc) => {
                self.tracker.record_outcome(key, true);
                let health = payload::status_health(doc);
                let failed = if health.as_deref() == Some("OK") { 0.0 } else { 1.0 };
                entry.insert(
                    format!("{sensor}_Health"),
                    SnapshotValue::bare(health.clone().map_or(Value::Null, Value::String)),
                );
                sink.set(metric, &[sensor, rack], failed);
                if failed == 0.0 {
                    debug!(shelf, sensor, "Health OK");
                } else {
                    warn!(shelf, sensor, health = ?health, "Health not OK");
                }
            }
            Err(e) => {
                if self.tracker.record_outcome(key, false) {
                    let consecutive = self
                        .tracker
                        .state(key)
                        .map(|s| s.consecutive_failures)
                        .unwrap_or_default();
                    sink.set(metric, &[sensor, rack], 1.0);
                    error!(shelf, sensor, consecutive, error = %e, "Status fetch failed");
                } else {
                    warn!(shelf, sensor, error = %e, "Status fetch failed (will retry)");
                }
            }
        }
    }

    /// CDU pass for one unit.
    ///
    /// `power` is the finalized total of this cycle's power-shelf pass, or
    /// `None` when no total is available; flow and heat are then omitted.
    pub fn process_cdu(
        &self,
        poll: &CduPoll,
        power: Option<&PowerTotal>,
        sink: &dyn MetricSink,
    ) -> CduEntry {
        let rack = poll.source.rack_name.as_str();
        let mut entry = CduEntry::default();

        let readings = poll
            .document
            .as_ref()
            .map_err(Clone::clone)
            .and_then(|doc| payload::cdu_readings(doc).map_err(Into::into));
        let endpoint_result: PollResult = readings.as_ref().map(|_| Value::Null).map_err(Clone::clone);
        self.track_endpoint("cdu", rack, "CDU", &endpoint_result, sink);

        let raw_readings = match readings {
            Ok(r) => r,
            Err(e) => {
                error!(rack, kind = e.kind(), error = %e, "CDU data fetch failed");
                return entry;
            }
        };

        let mut leaks = LeakReadings::default();
        let mut tank = TankSwitches::default();
        let mut temps = CoolantTemperatures::default();
        let mut pumps = RotorReadings::default();
        let mut fans = RotorReadings::default();

        for raw in &raw_readings {
            let reading = SensorReading::from_raw(raw);
            let Some(value) = reading.value else {
                warn!(rack, sensor = %raw.label, "Invalid value, skipped");
                continue;
            };
            let label = reading.label.as_str();

            leaks.observe(label, value);
            tank.observe(label, value);
            temps.observe(label, value);

            let (metric, unit) = match reading.category {
                MetricCategory::Temperature => (Metric::CduTemperature, Some("C")),
                MetricCategory::Pump => {
                    pumps.observe(RotorKind::Pump, label, value);
                    (Metric::CduPump, None)
                }
                MetricCategory::Fan => {
                    fans.observe(RotorKind::Fan, label, value);
                    (Metric::CduFan, None)
                }
                MetricCategory::Sensor | MetricCategory::Unclassified => (Metric::CduSensor, None),
            };
            sink.set(metric, &[label, rack], value);
            entry
                .section_mut(reading.category)
                .insert(label.to_string(), SnapshotValue::new(raw.value.clone(), unit));
            debug!(
                rack,
                sensor = label,
                category = reading.category.as_str(),
                value,
                "CDU reading"
            );
        }

        self.emit_leakage(&leaks, rack, &mut entry, sink);
        self.emit_tank_level(&tank, rack, &mut entry, sink);
        self.emit_rotor_health(RotorKind::Pump, &pumps, rack, &mut entry, sink);
        self.emit_rotor_health(RotorKind::Fan, &fans, rack, &mut entry, sink);

        let metrics = derived::compute(&temps, power);
        for (name, value) in metrics.iter() {
            sink.set(Metric::CduCalculated, &[name, rack], value);
            entry
                .calculated
                .insert(name.to_string(), SnapshotValue::bare(json_number(value)));
            debug!(rack, metric = name, value, "Calculated");
        }

        entry
    }

    fn emit_leakage(
        &self,
        leaks: &LeakReadings,
        rack: &str,
        entry: &mut CduEntry,
        sink: &dyn MetricSink,
    ) {
        let exposure = leak::evaluate(leaks);
        let watch_rack = leak::keep_watching_rack(rack);

        for &(sensor, value) in &exposure.confirmed {
            sink.set(Metric::CduLeakage, &[sensor, rack], value);
        }
        for &(sensor, value) in &exposure.keep_watching {
            sink.set(Metric::CduLeakage, &[sensor, watch_rack.as_str()], value);
        }
        for (sensor, value) in leaks.iter() {
            entry.leakage.insert(
                sensor.to_string(),
                SnapshotValue::bare(value.map_or(Value::Null, json_number)),
            );
        }

        match exposure.status {
            leak::LeakStatus::Confirmed => {
                error!(rack, wet = exposure.wet_count, "Leak confirmed")
            }
            leak::LeakStatus::Watch => warn!(rack, "Single leak sensor wet, watching"),
            leak::LeakStatus::Dry => {}
        }
    }

    fn emit_tank_level(
        &self,
        switches: &TankSwitches,
        rack: &str,
        entry: &mut CduEntry,
        sink: &dyn MetricSink,
    ) {
        let level = TankLevel::resolve(switches);
        for (flag, value) in level.flags() {
            sink.set(Metric::CduTankLevel, &[flag, rack], value);
            entry
                .tank_level
                .insert(flag.to_string(), SnapshotValue::bare(value as u8));
        }
        if level != TankLevel::Nominal {
            warn!(rack, level = ?level, "Tank level low");
        }
    }

    fn emit_rotor_health(
        &self,
        kind: RotorKind,
        readings: &RotorReadings,
        rack: &str,
        entry: &mut CduEntry,
        sink: &dyn MetricSink,
    ) {
        let (metric, section) = match kind {
            RotorKind::Pump => (Metric::CduPumpFail, &mut entry.pump),
            RotorKind::Fan => (Metric::CduFanFail, &mut entry.fan),
        };
        for health in rotor::evaluate(readings, self.config.stall_speed) {
            let unit = health.unit_name(kind);
            let failed = u8::from(health.failed);
            sink.set(metric, &[unit.as_str(), rack], f64::from(failed));
            section.insert(format!("{unit}_Fail"), SnapshotValue::bare(failed));
            if health.failed {
                warn!(rack, unit = %unit, "Driven but not spinning");
            }
        }
    }

    /// Track reachability of a plain endpoint and expose it after hysteresis.
    fn track_endpoint(
        &self,
        source_type: &str,
        source: &str,
        endpoint: &str,
        result: &PollResult,
        sink: &dyn MetricSink,
    ) {
        let key = SensorKey::new("endpoint", format!("{source_type}:{source}"), endpoint);
        let labels = [source_type, source, endpoint];
        let reported_failed = self.tracker.record_result(&key, result);
        if result.is_ok() {
            sink.set(Metric::SourcePollFailed, &labels, 0.0);
        } else if reported_failed {
            sink.set(Metric::SourcePollFailed, &labels, 1.0);
        }
    }
}

fn thermal_metric(component: ThermalComponent) -> Metric {
    match component {
        ThermalComponent::Cpu => Metric::ServerCpuTemperature,
        ThermalComponent::Memory => Metric::ServerMemoryTemperature,
        ThermalComponent::Gpu => Metric::ServerGpuTemperature,
    }
}

fn server_power_metric(sensor: &str) -> Option<Metric> {
    crate::source::SERVER_POWER_SENSORS
        .iter()
        .find(|(name, _)| *name == sensor)
        .map(|(_, metric)| *metric)
}

/// JSON number for a finite value, `null` otherwise (JSON has no infinity).
fn json_number(value: f64) -> Value {
    serde_json::Number::from_f64(value).map_or(Value::Null, Value::Number)
}

fn count_failures(input: &CycleInput) -> usize {
    let servers = input.servers.iter().map(|s| {
        usize::from(s.thermal.is_err()) + s.power.iter().filter(|(_, r)| r.is_err()).count()
    });
    let shelves = input.power_shelves.iter().map(|p| {
        usize::from(p.output_power.is_err())
            + p.psu_status.iter().filter(|(_, r)| r.is_err()).count()
            + p.chassis_status.iter().filter(|(_, r)| r.is_err()).count()
    });
    let cdus = input.cdus.iter().map(|c| usize::from(c.document.is_err()));
    servers.chain(shelves).chain(cdus).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PollFailure;
    use crate::sink::MemorySink;
    use crate::source::{CduDescriptor, SourceDescriptor};
    use serde_json::json;

    fn shelf_poll(status: PollResult) -> PowerShelfPoll {
        PowerShelfPoll {
            source: SourceDescriptor::new("10.0.1.1")
                .with_name("shelf-1")
                .with_rack("R01"),
            output_power: Ok(json!({"Reading": 500.0})),
            psu_status: vec![(1, status)],
            chassis_status: vec![],
        }
    }

    #[test]
    fn test_status_hysteresis_on_gauge() {
        let engine = CycleEngine::new(EngineConfig::default());
        let sink = MemorySink::new();
        let mut acc = PowerAccumulator::new();
        let timeout = || Err(PollFailure::Transport("timed out".into()));

        engine.process_power_shelf(&shelf_poll(Ok(json!({"Status": {"Health": "OK"}}))), &mut acc, &sink);
        assert_eq!(sink.value(Metric::PowershelfPsuFail, &["PSU_1", "R01"]), Some(0.0));

        // First failure is absorbed: the previous value stands
        engine.process_power_shelf(&shelf_poll(timeout()), &mut acc, &sink);
        assert_eq!(sink.value(Metric::PowershelfPsuFail, &["PSU_1", "R01"]), Some(0.0));

        engine.process_power_shelf(&shelf_poll(timeout()), &mut acc, &sink);
        assert_eq!(sink.value(Metric::PowershelfPsuFail, &["PSU_1", "R01"]), Some(1.0));

        // Recovery is immediate
        engine.process_power_shelf(&shelf_poll(Ok(json!({"Status": {"Health": "OK"}}))), &mut acc, &sink);
        assert_eq!(sink.value(Metric::PowershelfPsuFail, &["PSU_1", "R01"]), Some(0.0));
    }

    #[test]
    fn test_missing_health_is_failed() {
        let engine = CycleEngine::new(EngineConfig::default());
        let sink = MemorySink::new();
        let mut acc = PowerAccumulator::new();
        let entry = engine.process_power_shelf(&shelf_poll(Ok(json!({}))), &mut acc, &sink);
        assert_eq!(sink.value(Metric::PowershelfPsuFail, &["PSU_1", "R01"]), Some(1.0));
        assert_eq!(entry["PSU_1_Health"].value, Value::Null);
    }

    #[test]
    fn test_malformed_cdu_drops_contribution() {
        let engine = CycleEngine::new(EngineConfig::default());
        let sink = MemorySink::new();
        let poll = CduPoll {
            source: CduDescriptor::new("http://cdu", "R01"),
            document: Ok(json!(["not", "an", "object"])),
        };
        let entry = engine.process_cdu(&poll, None, &sink);
        assert_eq!(entry, CduEntry::default());
        assert_eq!(sink.count(Metric::CduLeakage), 0);
    }

    #[test]
    fn test_endpoint_gauge_after_two_failures() {
        let engine = CycleEngine::new(EngineConfig::default());
        let sink = MemorySink::new();
        let poll = CduPoll {
            source: CduDescriptor::new("http://cdu", "R01"),
            document: Err(PollFailure::HttpStatus(500)),
        };
        let labels = ["cdu", "R01", "CDU"];
        engine.process_cdu(&poll, None, &sink);
        assert_eq!(sink.get(Metric::SourcePollFailed, &labels), None);
        engine.process_cdu(&poll, None, &sink);
        assert_eq!(sink.value(Metric::SourcePollFailed, &labels), Some(1.0));

        let recovered = CduPoll {
            document: Ok(json!({"responses": []})),
            ..poll
        };
        engine.process_cdu(&recovered, None, &sink);
        assert_eq!(sink.value(Metric::SourcePollFailed, &labels), Some(0.0));
        let key = SensorKey::new("endpoint", "cdu:R01", "CDU");
        assert_eq!(engine.tracker().state(&key).unwrap().consecutive_failures, 0);
    }

    #[test]
    fn test_json_number_non_finite() {
        assert_eq!(json_number(1.5), json!(1.5));
        assert_eq!(json_number(f64::INFINITY), Value::Null);
    }
}

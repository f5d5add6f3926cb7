// Rackwatch Exporter - Prometheus metrics definitions
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Prometheus metrics for rack telemetry.
//!
//! Every engine [`Metric`] is registered as a `GaugeVec` with its own label
//! keys. [`PrometheusSink`] routes engine output to them. A handful of
//! exporter-level metrics describe the poll loop itself.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_gauge, register_gauge_vec, Counter, Encoder, Gauge, GaugeVec,
    TextEncoder,
};
use rackwatch::{Metric, MetricSink};
use std::collections::HashMap;
use tracing::{error, warn};

lazy_static! {
    // ============================================================
    // Source metrics (one GaugeVec per engine metric)
    // ============================================================

    static ref SOURCE_GAUGES: HashMap<Metric, GaugeVec> = Metric::ALL
        .iter()
        .map(|metric| {
            let gauge = register_gauge_vec!(metric.name(), metric.help(), metric.label_names())
                .unwrap();
            (*metric, gauge)
        })
        .collect();

    // ============================================================
    // Exporter Metrics
    // ============================================================

    /// Completed poll cycles.
    pub static ref CYCLES_TOTAL: Counter = register_counter!(
        "rackwatch_exporter_cycles_total",
        "Total poll cycles completed by the exporter"
    ).unwrap();

    /// Wall time of the last cycle.
    pub static ref CYCLE_DURATION_SECONDS: Gauge = register_gauge!(
        "rackwatch_exporter_cycle_duration_seconds",
        "Duration of the last poll cycle in seconds"
    ).unwrap();

    /// Endpoints that could not be read in the last cycle.
    pub static ref FAILED_ENDPOINTS: Gauge = register_gauge!(
        "rackwatch_exporter_failed_endpoints",
        "Endpoints that failed in the last poll cycle"
    ).unwrap();

    /// Aggregate power-shelf output used for the flow derivations.
    pub static ref AGGREGATE_POWER_WATTS: Gauge = register_gauge!(
        "rackwatch_aggregate_power_watt",
        "Sum of power-shelf output power in the last cycle"
    ).unwrap();

    /// Whether the last snapshot write succeeded (1) or failed (0).
    pub static ref SNAPSHOT_WRITE_OK: Gauge = register_gauge!(
        "rackwatch_exporter_snapshot_write_ok",
        "Last sensor snapshot write status (1=ok, 0=failed)"
    ).unwrap();
}

/// Register every source gauge up front so `/metrics` lists them from the
/// first scrape.
pub fn register_all() {
    lazy_static::initialize(&SOURCE_GAUGES);
}

/// [`MetricSink`] writing to the default Prometheus registry.
///
/// Non-numeric readings are exposed as `0`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrometheusSink;

impl PrometheusSink {
    pub fn new() -> Self {
        register_all();
        Self
    }
}

impl MetricSink for PrometheusSink {
    fn set(&self, metric: Metric, labels: &[&str], value: f64) {
        let Some(vec) = SOURCE_GAUGES.get(&metric) else {
            return;
        };
        match vec.get_metric_with_label_values(labels) {
            Ok(gauge) => gauge.set(value),
            Err(e) => warn!(metric = metric.name(), error = %e, "Label mismatch, value dropped"),
        }
    }

    fn mark_absent(&self, metric: Metric, labels: &[&str]) {
        self.set(metric, labels, 0.0);
    }
}

/// Record the outcome of one cycle.
pub fn record_cycle(duration_secs: f64, failed_endpoints: usize, power_watts: f64) {
    CYCLES_TOTAL.inc();
    CYCLE_DURATION_SECONDS.set(duration_secs);
    FAILED_ENDPOINTS.set(failed_endpoints as f64);
    AGGREGATE_POWER_WATTS.set(power_watts);
}

/// Record whether the snapshot of the last cycle was persisted.
pub fn record_snapshot_write(ok: bool) {
    SNAPSHOT_WRITE_OK.set(if ok { 1.0 } else { 0.0 });
}

/// Encode all metrics to Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_metric_registered() {
        register_all();
        assert_eq!(SOURCE_GAUGES.len(), Metric::ALL.len());
    }

    #[test]
    fn test_sink_sets_gauge() {
        let sink = PrometheusSink::new();
        sink.set(Metric::CduCalculated, &["LPM_W", "R-test"], 2.95);

        let value = SOURCE_GAUGES[&Metric::CduCalculated]
            .with_label_values(&["LPM_W", "R-test"])
            .get();
        assert_eq!(value, 2.95);
    }

    #[test]
    fn test_mark_absent_zero_fills() {
        let sink = PrometheusSink::new();
        let labels = ["10.9.9.9", "Temp_GPU_1", "R-absent"];
        sink.set(Metric::ServerGpuTemperature, &labels, 71.0);
        sink.mark_absent(Metric::ServerGpuTemperature, &labels);

        let value = SOURCE_GAUGES[&Metric::ServerGpuTemperature]
            .with_label_values(&labels)
            .get();
        assert_eq!(value, 0.0);
    }

    #[test]
    fn test_label_mismatch_does_not_panic() {
        let sink = PrometheusSink::new();
        sink.set(Metric::CduLeakage, &["only-one"], 1.0);
    }

    #[test]
    fn test_encode_metrics() {
        let sink = PrometheusSink::new();
        sink.set(Metric::PowershelfPsuFail, &["PSU_1", "R-encode"], 0.0);
        record_cycle(1.25, 0, 1000.0);

        let output = encode_metrics();
        assert!(output.contains("powershelf_psu_fail"));
        assert!(output.contains("rackwatch_exporter_cycle_duration_seconds"));
        assert!(output.contains("rackwatch_aggregate_power_watt"));
    }
}

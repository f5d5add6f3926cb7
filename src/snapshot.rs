// Rackwatch - Rack telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Per-cycle snapshot of every reading, for persistence.
//!
//! The tree mirrors what was polled, not what was exposed: non-numeric
//! values are kept verbatim and health strings are kept as strings.
//! Key order follows polling order.

use crate::classifier::MetricCategory;
use crate::error::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// One recorded value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotValue {
    pub value: Value,
    pub unit: Option<String>,
}

impl SnapshotValue {
    pub fn new(value: impl Into<Value>, unit: Option<&str>) -> Self {
        Self {
            value: value.into(),
            unit: unit.map(str::to_string),
        }
    }

    /// A unitless value.
    pub fn bare(value: impl Into<Value>) -> Self {
        Self::new(value, None)
    }
}

pub type SnapshotSection = IndexMap<String, SnapshotValue>;

/// One server (BMC).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEntry {
    pub bmc_ip: String,
    pub name: String,
    pub sensors: SnapshotSection,
}

impl NodeEntry {
    pub fn new(bmc_ip: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            bmc_ip: bmc_ip.into(),
            name: name.into(),
            sensors: SnapshotSection::new(),
        }
    }
}

/// One power shelf: `Output_Power`, `PSU_<i>_Health`, `Chassis_<x>_Health`.
pub type PowerShelfEntry = SnapshotSection;

/// One CDU, split by metric category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CduEntry {
    #[serde(rename = "Temperature")]
    pub temperature: SnapshotSection,
    #[serde(rename = "Pump")]
    pub pump: SnapshotSection,
    #[serde(rename = "Fan")]
    pub fan: SnapshotSection,
    #[serde(rename = "Sensor")]
    pub sensor: SnapshotSection,
    #[serde(rename = "TankLevel")]
    pub tank_level: SnapshotSection,
    #[serde(rename = "Leakage")]
    pub leakage: SnapshotSection,
    #[serde(rename = "Calculated")]
    pub calculated: SnapshotSection,
}

impl CduEntry {
    /// Section a classified reading is recorded under.
    pub fn section_mut(&mut self, category: MetricCategory) -> &mut SnapshotSection {
        match category {
            MetricCategory::Temperature => &mut self.temperature,
            MetricCategory::Pump => &mut self.pump,
            MetricCategory::Fan => &mut self.fan,
            MetricCategory::Sensor | MetricCategory::Unclassified => &mut self.sensor,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub exporter_version: String,
    pub rack_id: String,
}

/// Everything polled in one cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleSnapshot {
    pub nodes: IndexMap<String, NodeEntry>,
    #[serde(rename = "Powershelf")]
    pub powershelf: IndexMap<String, PowerShelfEntry>,
    #[serde(rename = "CDU")]
    pub cdu: IndexMap<String, CduEntry>,
    pub meta: SnapshotMeta,
}

impl CycleSnapshot {
    pub fn new(exporter_version: impl Into<String>, rack_id: impl Into<String>) -> Self {
        Self {
            meta: SnapshotMeta {
                exporter_version: exporter_version.into(),
                rack_id: rack_id.into(),
            },
            ..Default::default()
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Persistence target for cycle snapshots.
pub trait SnapshotSink: Send + Sync {
    fn write(&self, snapshot: &CycleSnapshot) -> Result<()>;
}

/// Writes the latest snapshot to a JSON file, replacing it atomically.
#[derive(Debug, Clone)]
pub struct JsonFileSnapshotSink {
    path: PathBuf,
}

impl JsonFileSnapshotSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SnapshotSink for JsonFileSnapshotSink {
    fn write(&self, snapshot: &CycleSnapshot) -> Result<()> {
        let json = snapshot.to_json_pretty()?;
        let tmp = self.temp_path();
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(json.as_bytes())?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Persist a snapshot, logging instead of failing.
///
/// Returns whether the write succeeded. Callers must not let the result
/// affect metric exposure.
pub fn write_best_effort(sink: &dyn SnapshotSink, snapshot: &CycleSnapshot) -> bool {
    match sink.write(snapshot) {
        Ok(()) => {
            debug!("Sensor snapshot written");
            true
        }
        Err(e) => {
            error!(error = %e, "Failed to write sensor snapshot");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn sample() -> CycleSnapshot {
        let mut snapshot = CycleSnapshot::new("0.3.0", "R01");
        let mut node = NodeEntry::new("10.0.0.11", "node-1");
        node.sensors
            .insert("Temp_CPU0".into(), SnapshotValue::new(54, Some("C")));
        snapshot.nodes.insert("node-1".into(), node);

        let mut shelf = PowerShelfEntry::new();
        shelf.insert("PSU_1_Health".into(), SnapshotValue::bare("OK"));
        snapshot.powershelf.insert("shelf-1".into(), shelf);

        let mut cdu = CduEntry::default();
        cdu.section_mut(MetricCategory::Pump)
            .insert("RPM_P1".into(), SnapshotValue::bare(2400));
        snapshot.cdu.insert("R01".into(), cdu);
        snapshot
    }

    #[test]
    fn test_serialized_shape() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["nodes"]["node-1"]["bmc_ip"], json!("10.0.0.11"));
        assert_eq!(
            value["nodes"]["node-1"]["sensors"]["Temp_CPU0"],
            json!({"value": 54, "unit": "C"})
        );
        assert_eq!(
            value["Powershelf"]["shelf-1"]["PSU_1_Health"],
            json!({"value": "OK", "unit": null})
        );
        assert_eq!(value["CDU"]["R01"]["Pump"]["RPM_P1"]["value"], json!(2400));
        assert_eq!(value["CDU"]["R01"]["Leakage"], json!({}));
        assert_eq!(value["meta"]["rack_id"], json!("R01"));
    }

    #[test]
    fn test_top_level_key_order() {
        let json = sample().to_json_pretty().unwrap();
        let nodes = json.find("\"nodes\"").unwrap();
        let shelf = json.find("\"Powershelf\"").unwrap();
        let cdu = json.find("\"CDU\"").unwrap();
        let meta = json.find("\"meta\"").unwrap();
        assert!(nodes < shelf && shelf < cdu && cdu < meta);
    }

    #[test]
    fn test_file_sink_roundtrip() {
        let dir = tempdir().unwrap();
        let sink = JsonFileSnapshotSink::new(dir.path().join("sensors_snapshot.json"));
        let snapshot = sample();

        sink.write(&snapshot).unwrap();
        let text = fs::read_to_string(sink.path()).unwrap();
        let parsed: CycleSnapshot = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, snapshot);
        assert!(!sink.temp_path().exists());
    }

    #[test]
    fn test_best_effort_reports_failure() {
        let dir = tempdir().unwrap();
        let sink = JsonFileSnapshotSink::new(dir.path().join("missing").join("snap.json"));
        assert!(!write_best_effort(&sink, &sample()));
    }
}

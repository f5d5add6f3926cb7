// Rackwatch - Rack telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Normalization of raw source documents.
//!
//! Pollers hand over JSON documents untouched. This module pulls the
//! readings out of them: Redfish `Thermal` collections, single Redfish
//! `Sensor` resources, Redfish status blocks, and the CDU `responses` list.

use crate::classifier::RawReading;
use crate::error::{RackwatchError, Result};
use serde_json::Value;

/// One entry of a Redfish `Thermal.Temperatures` array.
#[derive(Debug, Clone, PartialEq)]
pub struct ThermalReading {
    pub name: String,
    pub value: Value,
    pub state: String,
    pub unit: String,
}

/// Extract the temperature entries of a Redfish `Thermal` document.
///
/// Entries that are not objects are ignored. Missing fields get the
/// Redfish-conventional defaults.
pub fn thermal_readings(doc: &Value) -> Vec<ThermalReading> {
    let Some(items) = doc.get("Temperatures").and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .filter(|item| item.is_object())
        .map(|item| ThermalReading {
            name: str_field(item, "Name").unwrap_or("Unknown").to_string(),
            value: item.get("ReadingCelsius").cloned().unwrap_or(Value::Null),
            state: item
                .get("Status")
                .and_then(|s| str_field(s, "State"))
                .unwrap_or("Unknown")
                .to_string(),
            unit: str_field(item, "ReadingUnits").unwrap_or("C").to_string(),
        })
        .collect()
}

/// Reading of a single Redfish `Sensor` resource.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorValue {
    pub value: Value,
    pub unit: String,
}

/// Extract `Reading`/`ReadingUnits` from a Redfish `Sensor` document.
///
/// Returns `None` when the document has no `Reading` key at all (sensor not
/// available), as opposed to a present-but-null reading.
pub fn sensor_value(doc: &Value, default_unit: &str) -> Option<SensorValue> {
    let value = doc.get("Reading")?.clone();
    Some(SensorValue {
        value,
        unit: str_field(doc, "ReadingUnits")
            .unwrap_or(default_unit)
            .to_string(),
    })
}

/// `Status.Health` of a Redfish resource.
pub fn status_health(doc: &Value) -> Option<String> {
    doc.get("Status")
        .and_then(|s| str_field(s, "Health"))
        .map(str::to_string)
}

/// Flatten a CDU document into raw readings, in document order.
///
/// The document must be an object. Its `responses` array (missing means
/// empty) holds objects whose key/value pairs are the readings; entries
/// that are not objects are ignored.
pub fn cdu_readings(doc: &Value) -> Result<Vec<RawReading>> {
    let Some(root) = doc.as_object() else {
        return Err(RackwatchError::MalformedPayload(format!(
            "expected a JSON object, got {}",
            json_type(doc)
        )));
    };

    let entries = match root.get("responses") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(entries)) => entries,
        Some(other) => {
            return Err(RackwatchError::MalformedPayload(format!(
                "`responses` must be an array, got {}",
                json_type(other)
            )))
        }
    };

    Ok(entries
        .iter()
        .filter_map(Value::as_object)
        .flat_map(|entry| {
            entry
                .iter()
                .map(|(label, value)| RawReading::new(label.clone(), value.clone()))
        })
        .collect())
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_thermal_readings() {
        let doc = json!({
            "Temperatures": [
                {"Name": "Temp_CPU0", "ReadingCelsius": 54, "Status": {"State": "Enabled"}},
                {"Name": "Temp_GPU_1", "ReadingCelsius": null, "Status": {"State": "Absent"}},
                "garbage",
                {"ReadingCelsius": 30.5, "ReadingUnits": "Cel"}
            ]
        });
        let readings = thermal_readings(&doc);
        assert_eq!(readings.len(), 3);
        assert_eq!(readings[0].name, "Temp_CPU0");
        assert_eq!(readings[0].value, json!(54));
        assert_eq!(readings[0].unit, "C");
        assert_eq!(readings[1].state, "Absent");
        assert_eq!(readings[2].name, "Unknown");
        assert_eq!(readings[2].state, "Unknown");
        assert_eq!(readings[2].unit, "Cel");
    }

    #[test]
    fn test_thermal_without_temperatures() {
        assert!(thermal_readings(&json!({"Fans": []})).is_empty());
    }

    #[test]
    fn test_sensor_value() {
        let v = sensor_value(&json!({"Reading": 1234.5}), "W").unwrap();
        assert_eq!(v.value, json!(1234.5));
        assert_eq!(v.unit, "W");

        let v = sensor_value(&json!({"Reading": null, "ReadingUnits": "kW"}), "W").unwrap();
        assert_eq!(v.value, Value::Null);
        assert_eq!(v.unit, "kW");

        assert!(sensor_value(&json!({"Status": {}}), "W").is_none());
    }

    #[test]
    fn test_status_health() {
        assert_eq!(
            status_health(&json!({"Status": {"Health": "OK"}})),
            Some("OK".to_string())
        );
        assert_eq!(status_health(&json!({"Status": {"State": "Enabled"}})), None);
        assert_eq!(status_health(&json!({})), None);
    }

    #[test]
    fn test_cdu_readings_order() {
        let doc = json!({
            "responses": [
                {"T_WI": 20, "T_WO": 25},
                42,
                {"RPM_P1": 2400, "Sensor_L1": 0}
            ]
        });
        let labels: Vec<String> = cdu_readings(&doc)
            .unwrap()
            .into_iter()
            .map(|r| r.label)
            .collect();
        assert_eq!(labels, vec!["T_WI", "T_WO", "RPM_P1", "Sensor_L1"]);
    }

    #[test]
    fn test_cdu_missing_responses_is_empty() {
        assert!(cdu_readings(&json!({"status": "ok"})).unwrap().is_empty());
    }

    #[test]
    fn test_cdu_malformed() {
        assert!(matches!(
            cdu_readings(&json!([1, 2, 3])),
            Err(RackwatchError::MalformedPayload(_))
        ));
        assert!(matches!(
            cdu_readings(&json!({"responses": "nope"})),
            Err(RackwatchError::MalformedPayload(_))
        ));
    }
}

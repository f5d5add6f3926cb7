// Rackwatch - Rack telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Source descriptors and the raw per-cycle poll results handed to the
//! engine.
//!
//! The engine never performs I/O. A poller fetches each endpoint and hands
//! over the JSON document, or the [`PollFailure`] explaining why there is
//! none.

use crate::error::PollFailure;
use crate::sink::Metric;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of fetching one endpoint.
pub type PollResult = std::result::Result<Value, PollFailure>;

fn default_rack_name() -> String {
    "unknown".to_string()
}

/// A Redfish source: server BMC or power-shelf controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Host or IP of the controller
    #[serde(alias = "ip_address")]
    pub address: String,
    /// Display name, defaults to the address
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_rack_name")]
    pub rack_name: String,
}

impl SourceDescriptor {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
            rack_name: default_rack_name(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_rack(mut self, rack_name: impl Into<String>) -> Self {
        self.rack_name = rack_name.into();
        self
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.address)
    }
}

/// A coolant distribution unit endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CduDescriptor {
    /// Full URL of the CDU JSON endpoint. Units without one are skipped.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_rack_name")]
    pub rack_name: String,
}

impl CduDescriptor {
    pub fn new(url: impl Into<String>, rack_name: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            rack_name: rack_name.into(),
        }
    }
}

/// Aggregate power sensors read from every BMC, with their gauge.
pub const SERVER_POWER_SENSORS: [(&str, Metric); 5] = [
    ("Pwr_Node_Total", Metric::ServerPower),
    ("Pwr_Fan_Total", Metric::ServerFanPower),
    ("Pwr_CPU_Total", Metric::ServerCpuPower),
    ("Pwr_GPU_Total", Metric::ServerGpuPower),
    ("Pwr_Mem_Total", Metric::ServerMemPower),
];

/// Power supply slots of a power shelf.
pub const PSU_SLOTS: std::ops::RangeInclusive<u8> = 1..=12;

/// Sensor id of a PSU slot (`PSU_3`).
pub fn psu_slot_name(slot: u8) -> String {
    format!("PSU_{slot}")
}

/// AC input feed of a power shelf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChassisFeed {
    A,
    B,
}

impl ChassisFeed {
    pub const ALL: [ChassisFeed; 2] = [ChassisFeed::A, ChassisFeed::B];

    /// Exposed sensor name.
    pub fn label(&self) -> &'static str {
        match self {
            ChassisFeed::A => "Chassis_A",
            ChassisFeed::B => "Chassis_B",
        }
    }

    /// Redfish sensor resource carrying the feed status.
    pub fn sensor_resource(&self) -> &'static str {
        match self {
            ChassisFeed::A => "chassis_A_input_Voltage",
            ChassisFeed::B => "chassis_B_input_Voltage",
        }
    }
}

/// Everything fetched from one BMC in a cycle.
#[derive(Debug, Clone)]
pub struct ServerPoll {
    pub source: SourceDescriptor,
    /// `Chassis/Self/Thermal`
    pub thermal: PollResult,
    /// One entry per [`SERVER_POWER_SENSORS`] name
    pub power: Vec<(String, PollResult)>,
}

/// Everything fetched from one power shelf in a cycle.
#[derive(Debug, Clone)]
pub struct PowerShelfPoll {
    pub source: SourceDescriptor,
    /// `chassis_output_power` sensor
    pub output_power: PollResult,
    /// One entry per PSU slot
    pub psu_status: Vec<(u8, PollResult)>,
    pub chassis_status: Vec<(ChassisFeed, PollResult)>,
}

/// The document fetched from one CDU in a cycle.
#[derive(Debug, Clone)]
pub struct CduPoll {
    pub source: CduDescriptor,
    pub document: PollResult,
}

/// Raw input of one poll cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleInput {
    pub servers: Vec<ServerPoll>,
    pub power_shelves: Vec<PowerShelfPoll>,
    pub cdus: Vec<CduPoll>,
}

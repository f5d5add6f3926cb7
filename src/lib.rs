// Rackwatch - Rack telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Rackwatch - Sensor classification & derived-metric engine
//!
//! The engine behind a rack telemetry exporter. It takes the raw documents
//! polled from server BMCs, power shelves and coolant distribution units
//! (CDUs), and turns them into a canonical set of gauges plus a snapshot of
//! everything that was read.
//!
//! ## Key Features
//!
//! - **Label classification**: CDU labels sorted into temperature, pump,
//!   fan and generic sensor metrics
//! - **Failure hysteresis**: a single failed poll never flips a health gauge
//! - **Leak quorum**: two wet sensors confirm a leak, one is only watched
//! - **Tank level**: three float switches resolved to a single level flag
//! - **Stall detection**: pumps and fans driven but not spinning
//! - **Derived metrics**: coolant flow and heat rejection from CDU
//!   temperatures and the rack's aggregate power
//!
//! ## Quick Start
//!
//! ```rust
//! use rackwatch::{classify, MetricCategory, FailureTracker, SensorKey};
//!
//! assert_eq!(classify("T_WI"), MetricCategory::Temperature);
//! assert_eq!(classify("RPM_P3"), MetricCategory::Pump);
//!
//! let tracker = FailureTracker::default();
//! let key = SensorKey::new("psu", "shelf-1", "PSU_1");
//! assert!(!tracker.record_outcome(&key, false)); // absorbed
//! assert!(tracker.record_outcome(&key, false)); // reported
//! ```
//!
//! ## Modules
//!
//! - [`classifier`]: Label classification
//! - [`hysteresis`]: Consecutive-failure tracking
//! - [`leak`], [`tank`], [`rotor`]: CDU state rules
//! - [`derived`]: Flow and heat calculations
//! - [`payload`]: Redfish and CDU document normalization
//! - [`engine`]: Per-cycle processing
//! - [`sink`], [`snapshot`]: Outputs

// Modules
pub mod classifier;
pub mod config;
pub mod derived;
pub mod engine;
pub mod error;
pub mod hysteresis;
pub mod leak;
pub mod payload;
pub mod rotor;
pub mod sink;
pub mod snapshot;
pub mod source;
pub mod tank;

// Re-exports for convenient access
pub use classifier::{classify, MetricCategory, RawReading, SensorReading, ThermalComponent};
pub use config::EngineConfig;
pub use derived::{CoolantTemperatures, DerivedMetrics, PowerAccumulator, PowerTotal};
pub use engine::{CycleEngine, CycleReport};
pub use error::{PollFailure, RackwatchError, Result};
pub use hysteresis::{FailureState, FailureTracker, SensorKey};
pub use leak::{LeakExposure, LeakReadings, LeakStatus};
pub use rotor::{RotorHealth, RotorKind, RotorReadings};
pub use sink::{MemorySink, Metric, MetricSink};
pub use snapshot::{CduEntry, CycleSnapshot, JsonFileSnapshotSink, NodeEntry, SnapshotSink};
pub use source::{
    ChassisFeed, CduDescriptor, CduPoll, CycleInput, PollResult, PowerShelfPoll, ServerPoll,
    SourceDescriptor,
};
pub use tank::{TankLevel, TankSwitches};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}

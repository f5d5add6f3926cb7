// Rackwatch - Rack telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for Rackwatch
//!
//! Two families live here. [`PollFailure`] describes why a single endpoint
//! could not be read during a cycle; it is data, consumed by the failure
//! tracker and never propagated as a process fault. [`RackwatchError`] covers
//! the few fallible library operations (snapshot persistence, payload shape).

use thiserror::Error;

/// Result type alias for Rackwatch operations
pub type Result<T> = std::result::Result<T, RackwatchError>;

/// Main error type for Rackwatch operations
#[derive(Error, Debug)]
pub enum RackwatchError {
    /// Snapshot could not be written
    #[error("Snapshot I/O error: {0}")]
    SnapshotIo(#[from] std::io::Error),

    /// Snapshot could not be serialized
    #[error("Snapshot serialization error: {0}")]
    SnapshotEncode(#[from] serde_json::Error),

    /// A source returned a document of an unexpected shape
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
}

/// Why one endpoint could not be read in the current cycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PollFailure {
    /// Connection, DNS, TLS or timeout failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Endpoint answered with a non-success status
    #[error("HTTP status {0}")]
    HttpStatus(u16),

    /// Body was not valid JSON
    #[error("parse error: {0}")]
    Parse(String),

    /// Local file (fixture) could not be read
    #[error("I/O error: {0}")]
    Io(String),

    /// Document parsed but has the wrong shape
    #[error("malformed payload: {0}")]
    Malformed(String),
}

impl PollFailure {
    /// Short machine-friendly tag, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            PollFailure::Transport(_) => "transport",
            PollFailure::HttpStatus(_) => "http_status",
            PollFailure::Parse(_) => "parse",
            PollFailure::Io(_) => "io",
            PollFailure::Malformed(_) => "malformed",
        }
    }
}

impl From<RackwatchError> for PollFailure {
    fn from(err: RackwatchError) -> Self {
        match err {
            RackwatchError::MalformedPayload(msg) => PollFailure::Malformed(msg),
            other => PollFailure::Io(other.to_string()),
        }
    }
}

//! Data structures shared between the sampler and the reporting surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single instantaneous voltage observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Voltage on the sampled channel
    pub voltage: f64,
    /// Wall-clock time of the poll
    pub timestamp: DateTime<Utc>,
}

/// Average of all readings taken during one wall-clock second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Mean voltage over the bucket
    pub average_voltage: f64,
    /// Time the bucket was committed
    pub timestamp: DateTime<Utc>,
}

/// Current value as reported over the API.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub voltage: f64,
    pub weight: f64,
    /// `None` until the sampler has produced its first reading
    pub timestamp: Option<DateTime<Utc>>,
}

/// History entry with its weight under the calibration at report time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub voltage: f64,
    pub weight: f64,
    pub timestamp: DateTime<Utc>,
}

/// Sampler diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerStatus {
    /// Whether a sampler task currently owns the device gateway
    pub running: bool,
    /// Whether a device connection is open
    pub device_connected: bool,
    /// Whether the last successful poll used the mock voltage
    pub degraded: bool,
    /// Read failures since the last success or reinitialization
    pub consecutive_failures: u32,
    /// Successful polls, live or mock
    pub total_reads: u64,
    /// Failed polls
    pub total_failures: u64,
    /// Close-and-reopen cycles triggered by repeated failures
    pub reinitializations: u64,
    /// Entries currently retained
    pub history_len: usize,
    /// Retention limit of the history buffer
    pub history_capacity: usize,
    /// Timestamp of the newest history entry
    pub last_commit: Option<DateTime<Utc>>,
}

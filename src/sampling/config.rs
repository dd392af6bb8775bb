//! Sampler configuration.

use crate::error::{Result, ScaleError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the background sampler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Delay between polls after a successful read
    pub period: Duration,
    /// Delay before the next poll after a failed read
    pub failure_backoff: Duration,
    /// Consecutive failures that trigger a device reinitialization
    pub failure_threshold: u32,
    /// Voltage reported while no device is connected
    pub mock_voltage: f64,
    /// Analog input channel to sample
    pub channel: u8,
    /// Maximum number of retained history entries
    pub history_capacity: usize,
    /// While degraded, retry opening the device this often
    pub reconnect_interval: Option<Duration>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(crate::DEFAULT_INTERVAL_MS),
            failure_backoff: Duration::from_millis(500),
            failure_threshold: 3,
            mock_voltage: crate::DEFAULT_MOCK_VOLTAGE,
            channel: crate::DEFAULT_CHANNEL,
            history_capacity: crate::DEFAULT_HISTORY_CAPACITY,
            reconnect_interval: None,
        }
    }
}

impl SamplerConfig {
    /// Set the poll period.
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Set the delay used after a failed read.
    pub fn with_failure_backoff(mut self, backoff: Duration) -> Self {
        self.failure_backoff = backoff;
        self
    }

    /// Set the reinitialization threshold.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set the degraded-mode voltage.
    pub fn with_mock_voltage(mut self, voltage: f64) -> Self {
        self.mock_voltage = voltage;
        self
    }

    /// Set the analog input channel.
    pub fn with_channel(mut self, channel: u8) -> Self {
        self.channel = channel;
        self
    }

    /// Set the history retention limit.
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Set the degraded-mode reconnect interval.
    pub fn with_reconnect_interval(mut self, interval: Option<Duration>) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Check that the configuration can drive a sampler.
    pub fn validate(&self) -> Result<()> {
        if self.period.is_zero() {
            return Err(ScaleError::config_error("poll period must be non-zero"));
        }
        if self.failure_threshold == 0 {
            return Err(ScaleError::config_error("failure threshold must be at least 1"));
        }
        if self.history_capacity == 0 {
            return Err(ScaleError::config_error("history capacity must be at least 1"));
        }
        if !self.mock_voltage.is_finite() {
            return Err(ScaleError::config_error("mock voltage must be finite"));
        }
        if matches!(self.reconnect_interval, Some(d) if d.is_zero()) {
            return Err(ScaleError::config_error("reconnect interval must be non-zero"));
        }
        Ok(())
    }
}

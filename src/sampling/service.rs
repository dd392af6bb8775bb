//! Shared state between the sampler and the HTTP handlers.
//!
//! [`ScaleService`] is constructed once at startup and shared behind an
//! `Arc`. Each logical cell has its own lock so reporting reads never wait on
//! an unrelated writer:
//!
//! - current reading: `RwLock<Option<Reading>>`
//! - history: [`HistoryBuffer`] (internal `RwLock`)
//! - calibration: [`CalibrationState`] (internal `RwLock`)
//! - diagnostics: atomics

use crate::error::{Result, ScaleError};
use crate::sampling::{
    calibration::{Calibration, CalibrationState},
    config::SamplerConfig,
    data::{HistoryEntry, HistoryPoint, Measurement, Reading, SamplerStatus},
    history::HistoryBuffer,
};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use tracing::info;

#[derive(Debug, Default)]
struct SamplerStats {
    running: AtomicBool,
    connected: AtomicBool,
    degraded: AtomicBool,
    consecutive_failures: AtomicU32,
    total_reads: AtomicU64,
    total_failures: AtomicU64,
    reinitializations: AtomicU64,
}

/// Service object owning all cross-task state.
#[derive(Debug)]
pub struct ScaleService {
    current: RwLock<Option<Reading>>,
    history: HistoryBuffer,
    calibration: CalibrationState,
    stats: SamplerStats,
    mock_voltage: f64,
}

impl ScaleService {
    /// Create the service with empty history and the given calibration.
    pub fn new(config: &SamplerConfig, calibration: Calibration) -> Self {
        Self {
            current: RwLock::new(None),
            history: HistoryBuffer::new(config.history_capacity),
            calibration: CalibrationState::new(calibration),
            stats: SamplerStats::default(),
            mock_voltage: config.mock_voltage,
        }
    }

    // -- sampler side --------------------------------------------------

    /// Overwrite the current reading.
    pub fn record_reading(&self, reading: Reading) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(reading);
    }

    /// Append a committed bucket average to the history.
    pub fn commit(&self, entry: HistoryEntry) -> bool {
        self.history.push(entry)
    }

    /// Mark a sampler as owning the device. Fails if one already does.
    pub(crate) fn claim_sampler(&self) -> Result<()> {
        self.stats
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| ScaleError::invalid_state("a sampler is already running"))
    }

    pub(crate) fn release_sampler(&self) {
        self.stats.running.store(false, Ordering::Release);
        self.stats.connected.store(false, Ordering::Relaxed);
    }

    pub(crate) fn note_success(&self, degraded: bool) {
        self.stats.degraded.store(degraded, Ordering::Relaxed);
        self.stats.consecutive_failures.store(0, Ordering::Relaxed);
        self.stats.total_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_failure(&self, consecutive: u32) {
        self.stats
            .consecutive_failures
            .store(consecutive, Ordering::Relaxed);
        self.stats.total_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_reinitialized(&self) {
        self.stats.reinitializations.fetch_add(1, Ordering::Relaxed);
        self.stats.consecutive_failures.store(0, Ordering::Relaxed);
    }

    pub(crate) fn note_connected(&self, connected: bool) {
        self.stats.connected.store(connected, Ordering::Relaxed);
    }

    // -- reporting side ------------------------------------------------

    /// Latest reading, if the sampler has produced one.
    pub fn current_reading(&self) -> Option<Reading> {
        *self.current.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current value with its weight.
    ///
    /// Before the first poll the mock voltage is reported with no timestamp.
    pub fn current_measurement(&self) -> Measurement {
        let calibration = self.calibration.get();
        let (voltage, timestamp) = match self.current_reading() {
            Some(reading) => (reading.voltage, Some(reading.timestamp)),
            None => (self.mock_voltage, None),
        };
        Measurement {
            voltage,
            weight: calibration.weight(voltage),
            timestamp,
        }
    }

    /// Raw history entries, oldest first.
    pub fn history_entries(&self) -> Vec<HistoryEntry> {
        self.history.snapshot()
    }

    /// History with weights under the current calibration, oldest first.
    pub fn history(&self) -> Vec<HistoryPoint> {
        let calibration = self.calibration.get();
        self.history
            .snapshot()
            .into_iter()
            .map(|entry| HistoryPoint {
                voltage: entry.average_voltage,
                weight: calibration.weight(entry.average_voltage),
                timestamp: entry.timestamp,
            })
            .collect()
    }

    pub fn calibration(&self) -> Calibration {
        self.calibration.get()
    }

    pub fn compute_weight(&self, voltage: f64) -> f64 {
        self.calibration.compute_weight(voltage)
    }

    /// Set the tare voltage, defaulting to the current reading.
    pub fn tare(&self, voltage: Option<f64>) -> Result<f64> {
        let voltage = match voltage {
            Some(v) => v,
            None => {
                self.current_reading()
                    .ok_or_else(|| {
                        ScaleError::invalid_state("no reading available to tare against")
                    })?
                    .voltage
            }
        };
        self.calibration.set_tare(voltage)
    }

    /// Set the scale factor.
    pub fn set_scale(&self, factor: f64) -> Result<f64> {
        self.calibration.set_scale(factor)
    }

    /// Empty the history. Calibration is untouched.
    pub fn clear_history(&self) -> usize {
        let removed = self.history.clear();
        info!("History cleared ({} entries removed)", removed);
        removed
    }

    /// Sampler diagnostics.
    pub fn status(&self) -> SamplerStatus {
        SamplerStatus {
            running: self.stats.running.load(Ordering::Acquire),
            device_connected: self.stats.connected.load(Ordering::Relaxed),
            degraded: self.stats.degraded.load(Ordering::Relaxed),
            consecutive_failures: self.stats.consecutive_failures.load(Ordering::Relaxed),
            total_reads: self.stats.total_reads.load(Ordering::Relaxed),
            total_failures: self.stats.total_failures.load(Ordering::Relaxed),
            reinitializations: self.stats.reinitializations.load(Ordering::Relaxed),
            history_len: self.history.len(),
            history_capacity: self.history.capacity(),
            last_commit: self.history.latest().map(|e| e.timestamp),
        }
    }
}

impl Default for ScaleService {
    fn default() -> Self {
        Self::new(&SamplerConfig::default(), Calibration::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn reading(v: f64) -> Reading {
        Reading {
            voltage: v,
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn test_measurement_before_first_reading() {
        let service = ScaleService::default();
        let m = service.current_measurement();
        assert_eq!(m.voltage, 2.5);
        assert_eq!(m.timestamp, None);
        assert_eq!(m.weight, 2.5 * 24.5);
    }

    #[test]
    fn test_tare_without_reading_is_invalid_state() {
        let service = ScaleService::default();
        let err = service.tare(None).unwrap_err();
        assert!(matches!(err, ScaleError::InvalidState(_)));
        assert_eq!(service.calibration(), Calibration::default());
    }

    #[test]
    fn test_tare_defaults_to_current_reading() {
        let service = ScaleService::default();
        service.record_reading(reading(1.75));
        assert_eq!(service.tare(None).unwrap(), 1.75);
        assert_eq!(service.current_measurement().weight, 0.0);
    }

    #[test]
    fn test_single_sampler_claim() {
        let service = ScaleService::default();
        service.claim_sampler().unwrap();
        assert!(service.claim_sampler().is_err());
        service.release_sampler();
        assert!(service.claim_sampler().is_ok());
    }
}

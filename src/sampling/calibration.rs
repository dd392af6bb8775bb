//! Linear voltage-to-weight calibration.

use crate::error::{Result, ScaleError};
use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};
use tracing::info;

/// Tare offset and scale factor.
///
/// `weight = (voltage - tare_voltage) * scale_factor`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Zero-load baseline voltage
    pub tare_voltage: f64,
    /// Weight units per volt
    pub scale_factor: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            tare_voltage: 0.0,
            scale_factor: crate::DEFAULT_SCALE_FACTOR,
        }
    }
}

impl Calibration {
    /// Create a calibration, rejecting non-finite values.
    pub fn new(tare_voltage: f64, scale_factor: f64) -> Result<Self> {
        Ok(Self {
            tare_voltage: finite("tare_voltage", tare_voltage)?,
            scale_factor: finite("scale", scale_factor)?,
        })
    }

    /// Convert a voltage to weight.
    #[inline]
    pub fn weight(&self, voltage: f64) -> f64 {
        (voltage - self.tare_voltage) * self.scale_factor
    }
}

/// Shared, mutable calibration read by every reporting path.
#[derive(Debug, Default)]
pub struct CalibrationState {
    inner: RwLock<Calibration>,
}

impl CalibrationState {
    pub fn new(calibration: Calibration) -> Self {
        Self {
            inner: RwLock::new(calibration),
        }
    }

    /// Current calibration.
    pub fn get(&self) -> Calibration {
        *self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the tare voltage.
    pub fn set_tare(&self, voltage: f64) -> Result<f64> {
        let voltage = finite("tare_voltage", voltage)?;
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .tare_voltage = voltage;
        info!("Tare set to {:.6} V", voltage);
        Ok(voltage)
    }

    /// Set the scale factor.
    pub fn set_scale(&self, factor: f64) -> Result<f64> {
        let factor = finite("scale", factor)?;
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .scale_factor = factor;
        info!("Scale factor set to {}", factor);
        Ok(factor)
    }

    /// Convert a voltage to weight with the current calibration.
    pub fn compute_weight(&self, voltage: f64) -> f64 {
        self.get().weight(voltage)
    }
}

fn finite(field: &str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ScaleError::invalid_input(format!(
            "{} must be a finite number, got {}",
            field, value
        )))
    }
}

/// Parse a user-supplied number for `field`.
pub fn parse_float(field: &str, raw: &str) -> Result<f64> {
    let value = raw.trim().parse::<f64>().map_err(|_| {
        ScaleError::invalid_input(format!("{} must be a number, got {:?}", field, raw))
    })?;
    finite(field, value)
}

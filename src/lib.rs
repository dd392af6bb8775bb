//! # LabJack Scale - analog load-cell sampler
//!
//! Polls one analog input of a LabJack-style acquisition device, converts the
//! voltage into a calibrated weight and keeps a rolling history of per-second
//! averages. Current value, history and calibration controls are served over
//! an HTTP API under `/api/labjack`.
//!
//! ## Features
//!
//! - **Background sampling**: 5 Hz polling folded into 1 Hz history entries
//! - **Degraded mode**: a fixed mock voltage when no device is connected
//! - **Self-healing**: repeated read failures close and reopen the device
//! - **Calibration**: tare and scale adjustable at runtime
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use labjack_scale::{
//!     start_web_server, AnchoredClock, Calibration, DeviceGateway, NoHardwareDriver,
//!     Sampler, SamplerConfig, ScaleService, WebConfig,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SamplerConfig::default();
//!     let service = Arc::new(ScaleService::new(&config, Calibration::default()));
//!     let gateway = DeviceGateway::new(Box::new(NoHardwareDriver::new()), config.channel);
//!     let sampler = Sampler::new(gateway, service.clone(), config)?
//!         .spawn(Arc::new(AnchoredClock::default()));
//!
//!     start_web_server(WebConfig::default(), service, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//!     sampler.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod device;
pub mod error;
pub mod sampling;
pub mod web;

// Re-export public API
pub use device::{
    AnalogConnection, AnalogDriver, DeviceError, DeviceGateway, DeviceHandle, NoHardwareDriver,
    SimulatedDriver,
};
pub use error::{Result, ScaleError};
pub use sampling::{
    AnchoredClock, Calibration, CalibrationState, Clock, HistoryBuffer, HistoryEntry,
    HistoryPoint, Measurement, Reading, Sampler, SamplerConfig, SamplerHandle, SamplerStatus,
    ScaleService, SystemClock,
};
pub use web::{create_app, start_web_server, WebConfig};

/// The default polling interval in milliseconds
pub const DEFAULT_INTERVAL_MS: u64 = 200;

/// The default web server port for development instances
pub const DEFAULT_DEV_PORT: u16 = 5001;

/// The default web server port for production instances
pub const DEFAULT_PROD_PORT: u16 = 5000;

/// Number of per-second averages retained
pub const DEFAULT_HISTORY_CAPACITY: usize = 3000;

/// Voltage reported while no device is connected
pub const DEFAULT_MOCK_VOLTAGE: f64 = 2.5;

/// Weight units per volt before any calibration
pub const DEFAULT_SCALE_FACTOR: f64 = 24.5;

/// Analog input sampled by default (AIN1)
pub const DEFAULT_CHANNEL: u8 = 1;

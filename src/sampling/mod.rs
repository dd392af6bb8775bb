//! Sampling core: per-second aggregation, history and calibration.
//!
//! The [`Sampler`] polls the device gateway in the background and publishes
//! into a [`ScaleService`], which the HTTP handlers read concurrently.

pub mod bucket;
pub mod calibration;
pub mod clock;
pub mod config;
pub mod data;
pub mod history;
pub mod sampler;
pub mod service;

// Re-export commonly used items
pub use calibration::{Calibration, CalibrationState};
pub use clock::{AnchoredClock, Clock, SystemClock};
pub use config::SamplerConfig;
pub use data::{HistoryEntry, HistoryPoint, Measurement, Reading, SamplerStatus};
pub use history::HistoryBuffer;
pub use sampler::{Sampler, SamplerHandle};
pub use service::ScaleService;

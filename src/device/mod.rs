//! Device gateway for the analog voltage sensor.
//!
//! The vendor driver is reached only through the [`AnalogDriver`] and
//! [`AnalogConnection`] traits. [`DeviceGateway`] owns the single open
//! connection and implements the open/reopen policy; the sampler never
//! touches a connection directly.

pub mod driver;
pub mod gateway;
pub mod simulated;

// Re-export commonly used items
pub use driver::{AnalogConnection, AnalogDriver, DeviceError, DeviceHandle};
pub use gateway::DeviceGateway;
pub use simulated::{NoHardwareDriver, SimulatedDriver};

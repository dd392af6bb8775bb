//! Driver seam and the scoped device handle.

use std::fmt;
use tracing::{debug, warn};

/// Faults reported by the device layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    /// No connection is open. The sampler substitutes the mock voltage.
    #[error("no device connection is open")]
    Unavailable,

    /// Transport or driver fault while talking to an open device
    #[error("communication fault: {0}")]
    Communication(String),

    /// Another process holds the device
    #[error("device is already claimed by another process")]
    AlreadyClaimed,

    /// The driver could not establish a connection
    #[error("failed to open device: {0}")]
    Open(String),
}

impl DeviceError {
    /// Create a new communication error
    pub fn communication(msg: impl Into<String>) -> Self {
        Self::Communication(msg.into())
    }

    /// Create a new open error
    pub fn open(msg: impl Into<String>) -> Self {
        Self::Open(msg.into())
    }

    /// Whether the fault is the expected "no device" case served by the mock value.
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Unavailable)
    }
}

/// An open connection to the acquisition hardware.
pub trait AnalogConnection: Send {
    /// Configure `channel` as an analog input.
    fn configure_analog(&mut self, channel: u8) -> Result<(), DeviceError>;

    /// Load the factory calibration constants used to convert raw counts.
    fn load_calibration(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    /// Hardware serial number, when the driver exposes one.
    fn serial_number(&self) -> Option<u32> {
        None
    }

    /// Read the instantaneous voltage on `channel`.
    fn read_voltage(&mut self, channel: u8) -> Result<f64, DeviceError>;

    /// Release the connection.
    fn close(&mut self) -> Result<(), DeviceError>;
}

/// Factory for connections to the acquisition hardware.
pub trait AnalogDriver: Send {
    /// Short driver name for logs.
    fn name(&self) -> &str;

    /// Acquire exclusive ownership of the device.
    fn open(&mut self) -> Result<Box<dyn AnalogConnection>, DeviceError>;

    /// Free a device left claimed by a stale owner so a retry of [`open`](Self::open)
    /// can succeed. Drivers that cannot do this report `AlreadyClaimed`.
    fn force_release(&mut self) -> Result<(), DeviceError> {
        Err(DeviceError::AlreadyClaimed)
    }
}

/// Scoped owner of an open connection.
///
/// The connection is closed exactly once, either by [`close`](Self::close)
/// or when the handle is dropped. Close errors are logged and swallowed.
pub struct DeviceHandle {
    connection: Option<Box<dyn AnalogConnection>>,
    channel: u8,
    serial_number: Option<u32>,
}

impl DeviceHandle {
    pub(crate) fn new(connection: Box<dyn AnalogConnection>, channel: u8) -> Self {
        let serial_number = connection.serial_number();
        Self {
            connection: Some(connection),
            channel,
            serial_number,
        }
    }

    /// Channel this handle reads.
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Serial number reported when the device was opened.
    pub fn serial_number(&self) -> Option<u32> {
        self.serial_number
    }

    /// Configure the channel for analog input and load calibration constants.
    pub(crate) fn configure(&mut self) -> Result<(), DeviceError> {
        let connection = self.connection.as_mut().ok_or(DeviceError::Unavailable)?;
        connection.configure_analog(self.channel)?;
        connection.load_calibration()
    }

    /// Read the configured channel.
    pub fn read_voltage(&mut self) -> Result<f64, DeviceError> {
        match self.connection.as_mut() {
            Some(connection) => connection.read_voltage(self.channel),
            None => Err(DeviceError::Unavailable),
        }
    }

    /// Release the connection now.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            match connection.close() {
                Ok(()) => debug!(channel = self.channel, "Device connection released"),
                Err(e) => warn!("Ignoring error while closing device: {}", e),
            }
        }
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("channel", &self.channel)
            .field("serial_number", &self.serial_number)
            .field("open", &self.connection.is_some())
            .finish()
    }
}

//! Ownership and reopen policy for the single device connection.

use super::driver::{AnalogDriver, DeviceError, DeviceHandle};
use tracing::{error, info, warn};

/// Owns the driver and at most one open [`DeviceHandle`].
///
/// The gateway performs no retries on its own beyond the one forced-release
/// recovery for a claimed device. Escalation after repeated read failures is
/// the sampler's job.
pub struct DeviceGateway {
    driver: Box<dyn AnalogDriver>,
    handle: Option<DeviceHandle>,
    channel: u8,
}

impl DeviceGateway {
    /// Create a gateway for `channel`. No connection is attempted yet.
    pub fn new(driver: Box<dyn AnalogDriver>, channel: u8) -> Self {
        Self {
            driver,
            handle: None,
            channel,
        }
    }

    /// Whether a connection is currently held.
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Channel read by this gateway.
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Name of the underlying driver.
    pub fn driver_name(&self) -> &str {
        self.driver.name()
    }

    /// Open (or reopen) the device.
    ///
    /// Any existing handle is closed first. On failure the gateway is left
    /// without a handle and the error is returned for logging.
    pub fn open(&mut self) -> Result<(), DeviceError> {
        self.close();

        let result = match self.connect() {
            Err(DeviceError::AlreadyClaimed) => {
                warn!("Device is claimed by another owner, forcing release and retrying");
                self.driver
                    .force_release()
                    .and_then(|()| self.connect())
            }
            other => other,
        };

        match result {
            Ok(handle) => {
                info!(
                    driver = self.driver.name(),
                    channel = self.channel,
                    serial = ?handle.serial_number(),
                    "Device opened, AIN{} configured for analog input",
                    self.channel
                );
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                error!(driver = self.driver.name(), "Error connecting to device: {}", e);
                Err(e)
            }
        }
    }

    fn connect(&mut self) -> Result<DeviceHandle, DeviceError> {
        let connection = self.driver.open()?;
        // Wrap before configuring so a failed setup still releases the device.
        let mut handle = DeviceHandle::new(connection, self.channel);
        handle.configure()?;
        Ok(handle)
    }

    /// Read the instantaneous voltage.
    ///
    /// Returns [`DeviceError::Unavailable`] when no handle is open. A
    /// non-finite value from the driver is reported as a communication fault.
    pub fn read(&mut self) -> Result<f64, DeviceError> {
        let handle = self.handle.as_mut().ok_or(DeviceError::Unavailable)?;
        let voltage = handle.read_voltage()?;
        if voltage.is_finite() {
            Ok(voltage)
        } else {
            Err(DeviceError::communication(format!(
                "driver returned non-finite voltage {}",
                voltage
            )))
        }
    }

    /// Release the device. Best-effort; never fails.
    pub fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.close();
            info!(channel = self.channel, "Device closed");
        }
    }

    /// Close and reopen the device.
    pub fn reinitialize(&mut self) -> Result<(), DeviceError> {
        self.close();
        self.open()
    }
}

impl Drop for DeviceGateway {
    fn drop(&mut self) {
        self.close();
    }
}

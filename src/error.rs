//! Error handling for the LabJack scale crate.

use crate::device::DeviceError;

/// A specialized `Result` type for scale operations.
pub type Result<T> = std::result::Result<T, ScaleError>;

/// The main error type for scale operations.
///
/// Device faults are normally absorbed by the sampler and never reach an HTTP
/// caller; only the validation variants are expected at the API boundary.
#[derive(Debug, thiserror::Error)]
pub enum ScaleError {
    /// Caller supplied a malformed or non-finite value
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation is not possible in the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Hardware gateway error
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Web server error
    #[error("Web server error: {0}")]
    WebServer(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ScaleError {
    /// Create a new invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create a new web server error
    pub fn web_server_error(msg: impl Into<String>) -> Self {
        Self::WebServer(msg.into())
    }

    /// Create a new configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the error was caused by the caller rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }
}

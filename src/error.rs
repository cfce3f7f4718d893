//! Error types for the hrs-watchdog crate.

use std::time::Duration;
use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// The supervisor was configured with invalid settings.
    #[error("Invalid configuration: {reason}")]
    Configuration {
        /// Description of what is wrong with the configuration.
        reason: String,
    },

    /// The scan ended without seeing the target peripheral.
    #[error("Peripheral not found: {address}")]
    PeripheralNotFound {
        /// The address that was searched for.
        address: String,
    },

    /// The target peripheral was not seen before the scan deadline.
    #[error("Scan for {address} timed out after {timeout:?}")]
    ScanTimeout {
        /// The address that was searched for.
        address: String,
        /// How long the scan ran.
        timeout: Duration,
    },

    /// Failed to establish a connection to the peripheral.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// Description of why the connection failed.
        reason: String,
    },

    /// Operation requires a connection but the peripheral is not connected.
    #[error("Peripheral not connected")]
    NotConnected,

    /// Service not found on the device.
    #[error("Service not found: {uuid}")]
    ServiceNotFound {
        /// The UUID of the service that was not found.
        uuid: String,
    },

    /// Characteristic not found on the device.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID of the characteristic that was not found.
        uuid: String,
    },

    /// Every setup attempt in the retry budget failed.
    #[error("Giving up after {attempts} setup attempts: {reason}")]
    ReconnectFailed {
        /// Number of attempts made.
        attempts: u32,
        /// The error reported by the last attempt.
        reason: String,
    },

    /// The operation was interrupted by a shutdown request.
    #[error("Operation cancelled")]
    Cancelled,

    /// Reading or writing the event log failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a setup attempt that failed with this error should be retried.
    ///
    /// Link-level failures (connect errors, a peripheral that is out of range,
    /// transient stack errors) are retried. Environment and discovery errors
    /// mean the wrong radio or the wrong device and are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Bluetooth(_)
                | Self::ConnectionFailed { .. }
                | Self::PeripheralNotFound { .. }
                | Self::ScanTimeout { .. }
                | Self::NotConnected
        )
    }

    /// Process exit status for this error when it terminates the binary.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration { .. } => 2,
            Self::BluetoothUnavailable => 3,
            Self::ServiceNotFound { .. } | Self::CharacteristicNotFound { .. } => 4,
            Self::ReconnectFailed { .. }
            | Self::ConnectionFailed { .. }
            | Self::PeripheralNotFound { .. }
            | Self::ScanTimeout { .. }
            | Self::NotConnected => 5,
            Self::Io(_) => 6,
            Self::Cancelled => 0,
            Self::Bluetooth(_) | Self::Internal(_) => 1,
        }
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

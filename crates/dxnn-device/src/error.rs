//! Error types for device operations

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for device operations
pub type Result<T> = std::result::Result<T, DeviceError>;

/// Errors that can occur during device access
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Device node not present at the expected path
    #[error("Device not found: {path}")]
    NotFound {
        /// Path that was checked
        path: PathBuf,
    },

    /// No NPU devices detected on the system
    #[error("No NPU devices detected")]
    NoDevicesFound,

    /// Device index out of range
    #[error("Device index {index} out of range (have {count} devices)")]
    InvalidIndex {
        /// Requested index
        index: usize,
        /// Number of available devices
        count: usize,
    },

    /// I/O error during device communication
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },

    /// Data transfer failed
    #[error("Transfer failed: {reason}")]
    TransferFailed {
        /// Reason for failure
        reason: String,
    },

    /// Telemetry query failed
    #[error("Failed to query device status: {reason}")]
    StatusQuery {
        /// Reason for failure
        reason: String,
    },
}

impl DeviceError {
    /// Create a device not found error
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create a transfer failed error
    pub fn transfer_failed(reason: impl Into<String>) -> Self {
        Self::TransferFailed {
            reason: reason.into(),
        }
    }

    /// Create a status query error
    pub fn status_query(reason: impl Into<String>) -> Self {
        Self::StatusQuery {
            reason: reason.into(),
        }
    }
}

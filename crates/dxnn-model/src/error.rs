//! Error types for model loading

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for model operations
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors that can occur while loading a `.dxnn` container
#[derive(Debug, Error)]
pub enum ModelError {
    /// File not found or not readable
    #[error("Model file not found: {path}")]
    FileNotFound {
        /// Path that was attempted
        path: PathBuf,
    },

    /// Missing or wrong magic bytes
    #[error("Invalid .dxnn header: expected magic bytes \"DXNN\"")]
    InvalidHeader,

    /// File-format version outside the supported window
    #[error("Unsupported .dxnn file-format version: v{version} (supported: v{min}..=v{max})")]
    UnsupportedVersion {
        /// Version read from the file
        version: u32,
        /// Lowest supported version
        min: u32,
        /// Highest supported version
        max: u32,
    },

    /// Container parsing failed
    #[error("Failed to parse model: {reason}")]
    Parse {
        /// Reason for failure
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },
}

impl ModelError {
    /// Create a parse error
    pub fn parse(reason: impl Into<String>) -> Self {
        Self::Parse {
            reason: reason.into(),
        }
    }
}

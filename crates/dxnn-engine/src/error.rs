//! Error types for inference engine operations

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur during inference dispatch
#[derive(Debug, Error)]
pub enum EngineError {
    /// Submitted input does not match the model's declared input size
    #[error("Invalid input: got {actual} bytes, model expects {expected}")]
    InvalidInput {
        /// Size the model declares
        expected: usize,
        /// Size that was submitted
        actual: usize,
    },

    /// Model file missing or malformed
    #[error("Model load failed: {source}")]
    ModelLoad {
        /// Underlying loader error
        #[from]
        source: dxnn_model::ModelError,
    },

    /// Operation on a handle that has been closed
    #[error("Engine is closed")]
    EngineClosed,

    /// Wait on a job id that does not exist or was already consumed
    #[error("Unknown job id {id} (never issued, or already consumed)")]
    UnknownJob {
        /// The offending id
        id: u64,
    },

    /// Buffer pool invariant violated.
    ///
    /// Backpressure blocks submitters before the pool can run dry, so this
    /// is a fatal internal condition, not an overload signal.
    #[error("Buffer pool exhausted: {reason}")]
    MemoryAllocation {
        /// Reason for failure
        reason: String,
    },

    /// A device-level stall exceeded its bound
    #[error("Operation timeout after {duration_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds
        duration_ms: u64,
    },

    /// A job reached FAILED; reported through `wait` or the callback
    #[error("Inference failed: {reason}")]
    InferenceFailed {
        /// Reason for failure
        reason: String,
    },

    /// Error from the device layer
    #[error("Device error: {source}")]
    Device {
        /// Underlying device error
        #[from]
        source: dxnn_device::DeviceError,
    },
}

impl EngineError {
    /// Create a memory allocation error
    pub fn memory_allocation(reason: impl Into<String>) -> Self {
        Self::MemoryAllocation {
            reason: reason.into(),
        }
    }

    /// Create an inference failure error
    pub fn inference_failed(reason: impl Into<String>) -> Self {
        Self::InferenceFailed {
            reason: reason.into(),
        }
    }
}

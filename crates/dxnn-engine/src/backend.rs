//! Compute backend boundary
//!
//! The kernels that actually execute a compiled model live outside this
//! tree (device firmware, or the software stand-in). This trait is the
//! whole contract the dispatch core has with them: a sized input goes in,
//! a sized output comes back, synchronously, on whichever worker thread
//! made the call.

use crate::error::Result;
use crate::options::BackendSelection;
use dxnn_model::Model;
use std::fmt::Debug;
use std::sync::Arc;

/// One inference execution boundary
///
/// Implementations must be callable from multiple worker threads at once;
/// a backend that serializes hardware access internally still satisfies
/// the contract.
pub trait ComputeBackend: Debug + Send + Sync {
    /// Backend identity for logs and diagnostics
    fn backend_type(&self) -> BackendType;

    /// Number of NPU cores this backend can execute on; the engine runs
    /// one worker slot per core unless configured otherwise.
    fn core_count(&self) -> usize;

    /// Execute one inference.
    ///
    /// `input` is exactly the model's input size, `output` exactly its
    /// output size; the engine validates both before dispatch.
    ///
    /// # Errors
    ///
    /// Returns an error if execution fails; the owning job transitions to
    /// FAILED and the error is reported through its delivery path.
    fn infer(&self, input: &[u8], output: &mut [u8]) -> Result<()>;
}

/// Backend identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// NPU device via the character-device interface
    Device,

    /// Pure CPU stand-in, no hardware required
    Software,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Device => write!(f, "Device"),
            Self::Software => write!(f, "Software"),
        }
    }
}

/// Select a backend for a loaded model.
///
/// `Auto` prefers the device and falls back to software when no device
/// can be opened.
///
/// # Errors
///
/// Returns an error when a forced `Device` selection cannot open one.
pub fn select_backend(
    selection: BackendSelection,
    model: &Model,
) -> Result<Arc<dyn ComputeBackend>> {
    use crate::backends::{DeviceBackend, SoftwareBackend};

    match selection {
        BackendSelection::Auto => match DeviceBackend::open(model) {
            Ok(backend) => {
                tracing::info!("Using device backend for '{}'", model.name());
                Ok(Arc::new(backend))
            }
            Err(e) => {
                tracing::info!("No NPU device available ({e}); using software backend");
                Ok(Arc::new(SoftwareBackend::new(model)))
            }
        },

        BackendSelection::Device => {
            DeviceBackend::open(model).map(|b| Arc::new(b) as Arc<dyn ComputeBackend>)
        }

        BackendSelection::Software => Ok(Arc::new(SoftwareBackend::new(model))),
    }
}

//! NPU device backend
//!
//! Executes through the character-device interface: write the input,
//! read back the sized output. The driver schedules the transfer onto a
//! core; which core serviced it is not visible at this layer.

use crate::backend::{BackendType, ComputeBackend};
use crate::error::Result;
use dxnn_device::{DeviceManager, DxnnDevice};
use dxnn_model::Model;
use std::sync::Mutex;

/// Backend bound to one opened NPU device
pub struct DeviceBackend {
    device: Mutex<DxnnDevice>,
    cores: usize,
}

impl DeviceBackend {
    /// Discover and open the first available device for a model.
    ///
    /// # Errors
    ///
    /// Returns an error when no device is present or the node cannot be
    /// opened.
    pub fn open(model: &Model) -> Result<Self> {
        let manager = DeviceManager::discover()?;
        let device = manager.open_first()?;
        let cores = device.info().status().npu_cores.max(1) as usize;

        tracing::info!(
            "Device backend for '{}' on device {} ({cores} cores)",
            model.name(),
            device.index()
        );

        Ok(Self {
            device: Mutex::new(device),
            cores,
        })
    }
}

impl ComputeBackend for DeviceBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Device
    }

    fn core_count(&self) -> usize {
        self.cores
    }

    fn infer(&self, input: &[u8], output: &mut [u8]) -> Result<()> {
        // One transfer pair at a time; the driver interleaves across cores
        // behind the node.
        let mut device = self.device.lock().expect("device lock poisoned");
        device.write(input)?;
        device.read(output)?;
        Ok(())
    }
}

impl std::fmt::Debug for DeviceBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBackend")
            .field("cores", &self.cores)
            .finish_non_exhaustive()
    }
}

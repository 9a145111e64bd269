//! Runtime device discovery
//!
//! Discovers NPU devices by scanning `/dev/dxrt*` and the matching sysfs
//! attribute directories. No compiled-in device lists; what the scan finds
//! is what the process can use.

use crate::device::DxnnDevice;
use crate::error::{DeviceError, Result};
use crate::status::DeviceStatus;
use std::path::PathBuf;

/// Upper bound on the device node scan
const MAX_DEVICE_NODES: usize = 16;

/// Information about a discovered device
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Device index (0, 1, 2, ...)
    pub index: usize,

    /// Device node path (`/dev/dxrt0`, ...)
    pub path: PathBuf,

    /// Telemetry snapshot taken at discovery time
    pub status: DeviceStatus,
}

impl DeviceInfo {
    /// Device index
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Device node path
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Telemetry snapshot from discovery time; use
    /// [`DeviceStatus::query`] for a fresh reading.
    pub const fn status(&self) -> &DeviceStatus {
        &self.status
    }
}

/// Device manager for runtime discovery and access
#[derive(Debug)]
pub struct DeviceManager {
    devices: Vec<DeviceInfo>,
}

impl DeviceManager {
    /// Discover all NPU devices on the system
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::NoDevicesFound` if no device nodes are present.
    pub fn discover() -> Result<Self> {
        tracing::debug!("Scanning for NPU devices...");

        let mut devices = Vec::new();
        for index in 0..MAX_DEVICE_NODES {
            let path = PathBuf::from(format!("/dev/dxrt{index}"));
            if !path.exists() {
                continue;
            }

            let status = DeviceStatus::query(index);
            tracing::info!(
                "Device {}: {} ({} cores, {} MHz)",
                index,
                path.display(),
                status.npu_cores,
                status.clock_mhz
            );

            devices.push(DeviceInfo {
                index,
                path,
                status,
            });
        }

        if devices.is_empty() {
            tracing::debug!("No NPU device nodes under /dev");
            return Err(DeviceError::NoDevicesFound);
        }

        tracing::info!("Discovered {} NPU device(s)", devices.len());
        Ok(Self { devices })
    }

    /// Number of discovered devices
    pub const fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// All discovered devices
    pub fn devices(&self) -> &[DeviceInfo] {
        &self.devices
    }

    /// Device info by index
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::InvalidIndex` if no device has this index.
    pub fn device(&self, index: usize) -> Result<&DeviceInfo> {
        self.devices
            .iter()
            .find(|d| d.index == index)
            .ok_or(DeviceError::InvalidIndex {
                index,
                count: self.devices.len(),
            })
    }

    /// Open a device by index
    ///
    /// # Errors
    ///
    /// Returns an error if the index is invalid or the node cannot be opened.
    pub fn open(&self, index: usize) -> Result<DxnnDevice> {
        let info = self.device(index)?;
        DxnnDevice::open(info)
    }

    /// Open the first available device
    ///
    /// # Errors
    ///
    /// Returns an error if no devices are available or the node cannot be
    /// opened.
    pub fn open_first(&self) -> Result<DxnnDevice> {
        let info = self.devices.first().ok_or(DeviceError::NoDevicesFound)?;
        DxnnDevice::open(info)
    }
}

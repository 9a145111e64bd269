//! Opened device handle

use rustix::fs::OFlags;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use crate::discovery::DeviceInfo;
use crate::error::{DeviceError, Result};

/// An open connection to one NPU device
///
/// Transfers go through the character device: a write queues input for the
/// loaded kernel program, a read blocks-polls for the produced output. The
/// scheduler owns which core services the transfer.
#[derive(Debug)]
pub struct DxnnDevice {
    info: DeviceInfo,
    file: File,
}

impl DxnnDevice {
    /// Open a device node
    ///
    /// # Errors
    ///
    /// Returns an error if the node is missing or cannot be opened.
    pub fn open(info: &DeviceInfo) -> Result<Self> {
        tracing::debug!("Opening device {}: {}", info.index, info.path.display());

        let file = Self::open_node(&info.path)?;

        tracing::info!("Opened device {}: {}", info.index, info.path.display());
        Ok(Self {
            info: info.clone(),
            file,
        })
    }

    fn open_node(path: &Path) -> Result<File> {
        if !path.exists() {
            return Err(DeviceError::not_found(path));
        }

        // OFlags::NONBLOCK.bits() is a small positive value, safe as i32
        #[allow(clippy::cast_possible_wrap)]
        let nonblock_flag = OFlags::NONBLOCK.bits() as i32;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(nonblock_flag)
            .open(path)?;
        Ok(file)
    }

    /// Device index
    pub const fn index(&self) -> usize {
        self.info.index
    }

    /// Device information recorded at discovery
    pub const fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Write input data to the device
    ///
    /// # Errors
    ///
    /// Returns an error if the transfer fails or is short.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        let written = self.file.write(data)?;
        if written != data.len() {
            return Err(DeviceError::transfer_failed(format!(
                "input transfer incomplete: {written} of {} bytes",
                data.len()
            )));
        }
        Ok(written)
    }

    /// Read output data from the device
    ///
    /// # Errors
    ///
    /// Returns an error if the transfer fails or is short.
    pub fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let read = self.file.read(buffer)?;
        if read != buffer.len() {
            return Err(DeviceError::transfer_failed(format!(
                "output transfer incomplete: {read} of {} bytes",
                buffer.len()
            )));
        }
        Ok(read)
    }
}

impl Drop for DxnnDevice {
    fn drop(&mut self) {
        tracing::info!(
            "Closing device {}: {}",
            self.info.index,
            self.info.path.display()
        );
    }
}

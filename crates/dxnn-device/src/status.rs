//! Device telemetry snapshot
//!
//! Telemetry is collected by the driver and exported through sysfs; this
//! module only reads it. Values are queried, never mutated.

use std::path::{Path, PathBuf};

/// Sysfs root under which per-device attribute directories live
pub(crate) const SYSFS_ROOT: &str = "/sys/class/dxrt";

/// Operational snapshot of one NPU device
///
/// Mirrors what the firmware reports: per-device core count, operating
/// voltage, clock frequency, die temperature, and whether dynamic
/// voltage/frequency scaling is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStatus {
    /// Number of NPU cores on the device
    pub npu_cores: u32,

    /// Operating voltage in millivolts
    pub voltage_mv: u32,

    /// Current clock frequency in megahertz
    pub clock_mhz: u32,

    /// Die temperature in degrees Celsius
    pub temperature_c: i32,

    /// Whether DVFS is enabled
    pub dvfs_enabled: bool,
}

impl Default for DeviceStatus {
    fn default() -> Self {
        // Nominal M1 operating point, used when sysfs attributes are absent
        Self {
            npu_cores: 3,
            voltage_mv: 825,
            clock_mhz: 800,
            temperature_c: 45,
            dvfs_enabled: false,
        }
    }
}

impl DeviceStatus {
    /// Read the telemetry snapshot for a device index.
    ///
    /// Missing or malformed attributes degrade to the nominal defaults
    /// with a warning; a partially populated sysfs tree is normal on
    /// older driver versions.
    pub fn query(index: usize) -> Self {
        let dir = PathBuf::from(format!("{SYSFS_ROOT}/dxrt{index}"));
        Self::query_dir(&dir)
    }

    pub(crate) fn query_dir(dir: &Path) -> Self {
        let defaults = Self::default();

        if !dir.exists() {
            tracing::warn!(
                "No sysfs attributes at {}; reporting nominal status",
                dir.display()
            );
            return defaults;
        }

        Self {
            npu_cores: read_attr(dir, "core_num").unwrap_or(defaults.npu_cores),
            voltage_mv: read_attr(dir, "voltage").unwrap_or(defaults.voltage_mv),
            clock_mhz: read_attr(dir, "clock").unwrap_or(defaults.clock_mhz),
            temperature_c: read_attr(dir, "temperature").unwrap_or(defaults.temperature_c),
            dvfs_enabled: read_attr::<u8>(dir, "dvfs").map(|v| v != 0).unwrap_or(false),
        }
    }

    /// One-line status in the firmware's reporting format.
    pub fn summary(&self, npu: usize) -> String {
        format!(
            "NPU {npu}: voltage {} mV, clock {} MHz, temperature {}'C",
            self.voltage_mv, self.clock_mhz, self.temperature_c
        )
    }
}

fn read_attr<T: std::str::FromStr>(dir: &Path, name: &str) -> Option<T> {
    let path = dir.join(name);
    let content = std::fs::read_to_string(&path).ok()?;
    match content.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Malformed sysfs attribute {}", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sysfs_reports_nominal_status() {
        let status = DeviceStatus::query_dir(Path::new("/nonexistent/dxrt99"));
        assert_eq!(status, DeviceStatus::default());
    }

    #[test]
    fn summary_format() {
        let status = DeviceStatus::default();
        assert_eq!(
            status.summary(0),
            "NPU 0: voltage 825 mV, clock 800 MHz, temperature 45'C"
        );
    }

    #[test]
    fn attrs_override_defaults() {
        let dir = std::env::temp_dir().join(format!("dxnn-status-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("clock"), "1000\n").unwrap();
        std::fs::write(dir.join("temperature"), "52").unwrap();
        std::fs::write(dir.join("dvfs"), "not-a-number").unwrap();

        let status = DeviceStatus::query_dir(&dir);
        assert_eq!(status.clock_mhz, 1000);
        assert_eq!(status.temperature_c, 52);
        assert!(!status.dvfs_enabled); // malformed attr falls back
        assert_eq!(status.voltage_mv, DeviceStatus::default().voltage_mv);

        std::fs::remove_dir_all(&dir).ok();
    }
}

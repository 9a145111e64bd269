//! Device access layer for DXNN NPUs.
//!
//! Three concerns live here, all below the inference engine:
//!
//! - **Discovery**: scan `/dev/dxrt*`, expose [`DeviceManager`] /
//!   [`DeviceInfo`], open nodes as [`DxnnDevice`] handles.
//! - **Telemetry**: [`DeviceStatus`] snapshots (core count, voltage, clock,
//!   temperature, DVFS), read from sysfs, queried and never mutated.
//! - **Runtime events**: [`RuntimeEventDispatcher`], the process-wide
//!   notification bus for device anomalies (recovery, timeout, throttling,
//!   memory pressure).
//!
//! Kernel execution, firmware protocol, and register programming are the
//! driver's business; this crate stops at the character-device and sysfs
//! boundary.

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)]

mod device;
mod discovery;
mod error;
mod events;
mod status;

pub use device::DxnnDevice;
pub use discovery::{DeviceInfo, DeviceManager};
pub use error::{DeviceError, Result};
pub use events::{EventCode, EventHandler, EventKind, EventLevel, RuntimeEvent, RuntimeEventDispatcher};
pub use status::DeviceStatus;

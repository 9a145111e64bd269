//! Backend implementations

mod device;
mod software;

pub use device::DeviceBackend;
pub use software::SoftwareBackend;

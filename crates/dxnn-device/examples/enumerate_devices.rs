//! Enumerate all NPU devices on the system
//!
//! This example demonstrates runtime device discovery.

use dxnn_device::{DeviceManager, Result};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("dxnn_device=debug")
        .init();

    let manager = DeviceManager::discover()?;

    println!("Found {} device(s):\n", manager.device_count());

    for device in manager.devices() {
        let status = device.status();

        println!("Device {}:", device.index());
        println!("   Path:   {}", device.path().display());
        println!("   Cores:  {}", status.npu_cores);
        println!("   {}", status.summary(device.index()));
        println!(
            "   DVFS:   {}",
            if status.dvfs_enabled { "enabled" } else { "disabled" }
        );
        println!();
    }

    Ok(())
}

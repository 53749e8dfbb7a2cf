//! Example: Scanning for GlucoPatch Devices
//!
//! This example scans for BLE devices whose name starts with `ESP32`, the
//! prefix the patch firmware advertises by default.
//!
//! Run with: `cargo run --example scan_devices`

use glucopatch_core::{BleTransport, ScanOptions, Transport, scan};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    println!("Scanning for GlucoPatch devices...");
    println!();

    let transport = BleTransport::new();
    transport.check_capability().await?;

    let options = ScanOptions::default().duration_secs(10);
    let devices = scan(&transport, &options).await?;

    if devices.is_empty() {
        println!("No device matching {} found.", options.filter);
        println!();
        println!("Make sure:");
        println!("  - The patch is powered on and advertising");
        println!("  - Bluetooth is enabled on this computer");
        println!("  - The patch is within range");
    } else {
        println!("Found {} device(s):", devices.len());
        println!();

        for device in &devices {
            let rssi = device
                .rssi
                .map(|r| format!("{} dBm", r))
                .unwrap_or_else(|| "N/A".to_string());

            println!("  {}", device.display_name());
            println!("    Identifier: {}", device.id);
            println!("    RSSI: {}", rssi);
            println!(
                "    Advertises reading service: {}",
                device.advertises(options.service)
            );
            println!();
        }
    }

    Ok(())
}

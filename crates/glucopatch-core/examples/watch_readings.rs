//! Example: Watching Live Readings
//!
//! This example connects to the first GlucoPatch in range and prints every
//! reading it sends until the link drops or Ctrl+C is pressed.
//!
//! Run with: `cargo run --example watch_readings`
//! Without hardware: `cargo run --example watch_readings -- --demo`

use std::sync::Arc;
use std::time::Duration;

use glucopatch_core::{
    BleTransport, ConnectionState, FirstMatch, MockTransport, Session, SessionConfig,
    SessionEvent, Transport,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    if std::env::args().any(|a| a == "--demo") {
        run(Arc::new(MockTransport::demo(Duration::from_secs(1)))).await
    } else {
        run(Arc::new(BleTransport::new())).await
    }
}

async fn run<T: Transport>(transport: Arc<T>) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::new(transport, SessionConfig::default());
    let mut events = session.subscribe();

    let device = session.connect(&FirstMatch).await?;
    println!("Connected to {} ({})", device.display_name(), device.id);
    println!();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(SessionEvent::ReadingAppended { reading }) => {
                    println!(
                        "{}  glucose {:>6.1} mg/dL  temperature {:>5.2} °C",
                        reading.timestamp, reading.glucose_mg_dl, reading.temperature_c
                    );
                }
                Ok(SessionEvent::DecodeFailed { error, .. }) => eprintln!("skipped frame: {error}"),
                Ok(SessionEvent::StateChanged { state: ConnectionState::Disconnected }) => break,
                Ok(_) => {}
                Err(_) => break,
            }
        }
    }

    session.disconnect().await?;
    println!();
    println!("Received {} reading(s).", session.store().len());
    Ok(())
}

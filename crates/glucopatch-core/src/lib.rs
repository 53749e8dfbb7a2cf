//! Core BLE library for GlucoPatch glucose/temperature sensor patches.
//!
//! This crate connects to a patch over Bluetooth Low Energy, subscribes to
//! its reading characteristic and turns each notification into a
//! [`Reading`](glucopatch_types::Reading).
//!
//! # Features
//!
//! - **Transport seam**: [`Transport`] trait with a btleplug implementation
//!   ([`BleTransport`]) and an in-memory one ([`MockTransport`])
//! - **Discovery**: name-prefix or accept-all filtering, pluggable device choice
//! - **Connection**: per-step timeouts, one ordered notification subscription
//! - **Session**: connection state machine, reading store and diagnostic log
//! - **Recording**: the decode, store and log path, also usable without a
//!   transport through [`Recorder`]
//! - **Charts**: axis scaling and projection for glucose and temperature plots
//!
//! # Platform Differences
//!
//! Device identification varies by platform:
//!
//! - **macOS**: devices are identified by a UUID assigned by CoreBluetooth.
//!   It is stable for a given patch on a given Mac, but differs between Macs.
//! - **Linux/Windows**: devices are identified by their Bluetooth MAC address
//!   (e.g., `AA:BB:CC:DD:EE:FF`).
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use glucopatch_core::{BleTransport, FirstMatch, Session, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Session::new(Arc::new(BleTransport::new()), SessionConfig::default());
//!     let mut events = session.subscribe();
//!
//!     let device = session.connect(&FirstMatch).await?;
//!     println!("Connected to {}", device.display_name());
//!
//!     while let Ok(event) = events.recv().await {
//!         println!("{event:?}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod ble;
pub mod chart;
pub mod connection;
pub mod discovery;
pub mod error;
pub mod events;
pub mod log;
pub mod mock;
pub mod recorder;
pub mod session;
pub mod store;
pub mod transport;

// Re-export from glucopatch-types
pub use glucopatch_types::uuids;
pub use glucopatch_types::{DecodeError, LogEntry, LogLevel, Reading, decode};

// Core exports
pub use ble::{BleLink, BleTransport};
pub use chart::{AxisFloors, ChartModel, ChartPair, ChartShape, Metric, axis_max};
pub use connection::{ConnectionConfig, ConnectionHandle, Subscription, connect_gatt};
pub use discovery::{ByIdentifier, DeviceChooser, FirstMatch, ScanOptions, discover, scan};
pub use error::{CapabilityReason, ConnectStep, DiscoveryError, Error, Result};
pub use events::{EventDispatcher, EventReceiver, EventSender, SessionEvent};
pub use log::DiagnosticLog;
pub use mock::{DemoSignal, MockStep, MockTransport, MockTransportBuilder};
pub use recorder::Recorder;
pub use session::{ConnectionState, Session, SessionConfig};
pub use store::ReadingStore;
pub use transport::{
    DiscoveredDevice, DisconnectReason, DiscoveryFilter, GattTarget, LinkEvent, Transport,
};

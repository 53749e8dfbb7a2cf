//! Bluetooth UUIDs for GlucoPatch sensor patches.
//!
//! The patch firmware exposes a single custom primary service with one
//! notify characteristic carrying JSON readings.

use uuid::{Uuid, uuid};

/// GlucoPatch primary service UUID.
pub const GLUCOPATCH_SERVICE: Uuid = uuid!("4fafc201-1fb5-459e-8fcc-c5c9c331914b");

/// Reading characteristic (notify). Each notification is one JSON frame.
pub const READING_CHARACTERISTIC: Uuid = uuid!("beb5483e-36e1-4688-b7f5-ea07361b26a8");

/// Advertised name prefix of the stock ESP32 firmware.
pub const DEFAULT_NAME_PREFIX: &str = "ESP32";

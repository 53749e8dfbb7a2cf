//! User-friendly error message formatting.
//!
//! Turns connect failures into a short headline plus, where there is one,
//! a suggestion the user can act on from the dashboard.

use glucopatch_core::{CapabilityReason, DiscoveryError, Error};

/// Convert a connect error to a short message and an optional suggestion.
pub fn format_error_with_guidance(error: &Error) -> (String, Option<String>) {
    match error {
        Error::ConnectFailed { step, source } => {
            let (message, suggestion) = format_error_with_guidance(source);
            (format!("{step}: {message}"), suggestion)
        }

        Error::CapabilityUnavailable(CapabilityReason::PoweredOff) => (
            "Bluetooth is off".to_string(),
            Some("Turn Bluetooth on, then press c to connect.".to_string()),
        ),
        Error::CapabilityUnavailable(_) => (
            "Bluetooth unavailable".to_string(),
            Some("Check that a Bluetooth adapter is present and enabled.".to_string()),
        ),

        Error::Discovery(DiscoveryError::Cancelled) => {
            ("Device selection cancelled".to_string(), None)
        }
        Error::Discovery(DiscoveryError::NoMatchingDevice { .. }) => (
            "No patch found".to_string(),
            Some(
                "Make sure the patch is powered on and in range, or widen the filter in the config file."
                    .to_string(),
            ),
        ),
        Error::Discovery(DiscoveryError::NotFound { identifier }) => (
            format!("Device '{identifier}' not found"),
            Some("Check the device name, or run `glucopatch scan` to list patches.".to_string()),
        ),
        Error::Discovery(DiscoveryError::ScanFailed(reason)) => {
            guidance_for_message(reason).unwrap_or_else(|| {
                (
                    "Scan failed".to_string(),
                    Some("Try disabling and re-enabling Bluetooth.".to_string()),
                )
            })
        }

        Error::ServiceNotFound(_) | Error::CharacteristicNotFound { .. } => (
            "Patch does not offer the reading characteristic".to_string(),
            Some("Check service_uuid and characteristic_uuid in the config file.".to_string()),
        ),

        Error::Timeout { .. } => (
            "Connection timed out".to_string(),
            Some(
                "Move closer to the patch or raise connect_timeout_secs in the config file."
                    .to_string(),
            ),
        ),

        Error::DeviceUnavailable(_) => (
            "Patch went out of range".to_string(),
            Some("Move closer to the patch and press c to connect.".to_string()),
        ),

        Error::Busy(state) => (
            format!("Session is already {}", state.to_string().to_lowercase()),
            Some("Press d to disconnect first.".to_string()),
        ),

        Error::Bluetooth(_) => {
            let text = error.to_string();
            guidance_for_message(&text).unwrap_or((text, None))
        }

        other => (other.to_string(), None),
    }
}

/// Guidance for platform Bluetooth errors, which only arrive as text.
fn guidance_for_message(message: &str) -> Option<(String, Option<String>)> {
    let lower = message.to_lowercase();

    if lower.contains("permission") || lower.contains("access denied") {
        return Some((
            "Bluetooth permission denied".to_string(),
            Some("Grant this terminal Bluetooth access in the system privacy settings.".to_string()),
        ));
    }

    if lower.contains("already connected") {
        return Some((
            "Patch busy".to_string(),
            Some("The patch may be connected to another app. Close it and try again.".to_string()),
        ));
    }

    if lower.contains("rejected") || lower.contains("pairing") {
        return Some((
            "Connection rejected".to_string(),
            Some("Remove the patch from Bluetooth settings and reconnect.".to_string()),
        ));
    }

    if lower.contains("out of range") {
        return Some((
            "Patch out of range".to_string(),
            Some("Move closer to the patch.".to_string()),
        ));
    }

    None
}

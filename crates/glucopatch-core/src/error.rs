//! Error types for glucopatch-core.
//!
//! This module defines the errors that can occur while bringing up a link to
//! a GlucoPatch sensor and consuming its notifications.
//!
//! # Error taxonomy
//!
//! | Error | Meaning | Recovery |
//! |-------|---------|----------|
//! | [`Error::CapabilityUnavailable`] | No usable Bluetooth adapter | Fatal for the session |
//! | [`Error::Discovery`] | Chooser cancelled or nothing matched | User may retry |
//! | [`Error::ConnectFailed`] | A GATT bring-up step failed | User may retry |
//! | [`Error::Busy`] | Connect requested while not disconnected | Wait or disconnect first |
//!
//! Frames that fail to decode are not errors either: they surface as
//! [`DecodeError`](glucopatch_types::DecodeError) from the ingest path, are
//! logged and dropped, and the stream continues.
//!
//! Unsolicited disconnects are not errors; they arrive as
//! [`LinkEvent::Disconnected`](crate::transport::LinkEvent::Disconnected).
//!
//! Nothing in this crate retries automatically. Every reconnect is initiated
//! by the caller.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::session::ConnectionState;

/// Errors that can occur when talking to a GlucoPatch sensor.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// The platform has no usable Bluetooth adapter.
    #[error("Bluetooth unavailable: {0}")]
    CapabilityUnavailable(CapabilityReason),

    /// Device discovery did not produce a device.
    #[error("Discovery failed: {0}")]
    Discovery(DiscoveryError),

    /// One step of the GATT bring-up failed.
    #[error("{step} failed: {source}")]
    ConnectFailed {
        /// The step that failed.
        step: ConnectStep,
        /// The underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// The primary service is not present on the peripheral.
    #[error("Service {0} not found")]
    ServiceNotFound(Uuid),

    /// The characteristic is not present in the service.
    #[error("Characteristic {characteristic} not found in service {service}")]
    CharacteristicNotFound {
        /// The service that was searched.
        service: Uuid,
        /// The characteristic that was not found.
        characteristic: Uuid,
    },

    /// The peripheral handle is no longer known to the adapter.
    #[error("Device '{0}' is no longer available")]
    DeviceUnavailable(String),

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// A connection handle already has its one notification subscription.
    #[error("Notifications are already subscribed on this connection")]
    AlreadySubscribed,

    /// Operation attempted while not connected.
    #[error("Not connected to device")]
    NotConnected,

    /// A connect was requested while a session was not disconnected.
    #[error("Session is busy ({0})")]
    Busy(ConnectionState),
}

/// Why the Bluetooth capability check failed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CapabilityReason {
    /// No adapter is present.
    NoAdapter,
    /// Every adapter is powered off.
    PoweredOff,
    /// The platform Bluetooth stack could not be opened.
    Unsupported(String),
}

impl std::fmt::Display for CapabilityReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoAdapter => write!(f, "no Bluetooth adapter found"),
            Self::PoweredOff => write!(f, "Bluetooth adapter is powered off"),
            Self::Unsupported(msg) => write!(f, "Bluetooth not supported: {}", msg),
        }
    }
}

/// Why device discovery did not yield a device.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DiscoveryError {
    /// The user dismissed the device chooser.
    Cancelled,
    /// The scan finished without a device matching the filter.
    NoMatchingDevice {
        /// Description of the filter that was applied.
        filter: String,
    },
    /// The requested device was not among the scan results.
    NotFound {
        /// Name or identifier that was requested.
        identifier: String,
    },
    /// The scan itself failed.
    ScanFailed(String),
}

impl std::fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "device selection cancelled"),
            Self::NoMatchingDevice { filter } => {
                write!(f, "no device matching {} found", filter)
            }
            Self::NotFound { identifier } => write!(f, "device '{}' not found", identifier),
            Self::ScanFailed(msg) => write!(f, "scan failed: {}", msg),
        }
    }
}

/// The steps of bringing up a notification link, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectStep {
    CapabilityCheck,
    DeviceDiscovery,
    GattConnect,
    ServiceLookup,
    CharacteristicLookup,
    NotificationEnable,
}

impl ConnectStep {
    /// All steps in execution order.
    pub const ALL: [ConnectStep; 6] = [
        ConnectStep::CapabilityCheck,
        ConnectStep::DeviceDiscovery,
        ConnectStep::GattConnect,
        ConnectStep::ServiceLookup,
        ConnectStep::CharacteristicLookup,
        ConnectStep::NotificationEnable,
    ];
}

impl std::fmt::Display for ConnectStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::CapabilityCheck => "Capability check",
            Self::DeviceDiscovery => "Device discovery",
            Self::GattConnect => "GATT connect",
            Self::ServiceLookup => "Service lookup",
            Self::CharacteristicLookup => "Characteristic lookup",
            Self::NotificationEnable => "Notification enable",
        };
        f.write_str(label)
    }
}

impl Error {
    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Wrap an error as the failure of a bring-up step.
    ///
    /// Errors that already name a step are returned unchanged.
    pub fn connect_failed(step: ConnectStep, source: Error) -> Self {
        match source {
            already @ Self::ConnectFailed { .. } => already,
            other => Self::ConnectFailed {
                step,
                source: Box::new(other),
            },
        }
    }

    /// Create a discovery error for a cancelled chooser.
    pub fn cancelled() -> Self {
        Self::Discovery(DiscoveryError::Cancelled)
    }

    /// The bring-up step this error belongs to, if any.
    pub fn step(&self) -> Option<ConnectStep> {
        match self {
            Self::CapabilityUnavailable(_) => Some(ConnectStep::CapabilityCheck),
            Self::Discovery(_) => Some(ConnectStep::DeviceDiscovery),
            Self::ConnectFailed { step, .. } => Some(*step),
            _ => None,
        }
    }
}

/// Result type alias using glucopatch-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

//! Transport abstraction over the platform BLE stack.
//!
//! [`Transport`] breaks the bring-up of a notification link into the same
//! fine-grained steps the session logs, so that every step can succeed or
//! fail observably. [`BleTransport`](crate::ble::BleTransport) implements it
//! on top of btleplug and [`MockTransport`](crate::mock::MockTransport)
//! implements it in memory for tests and demo mode.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use glucopatch_types::uuids::{DEFAULT_NAME_PREFIX, GLUCOPATCH_SERVICE, READING_CHARACTERISTIC};

/// Which advertised devices a scan should report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryFilter {
    /// Devices whose advertised name starts with the prefix.
    NamePrefix(String),
    /// Every device in range.
    AcceptAll,
}

impl DiscoveryFilter {
    /// Filter on an advertised name prefix.
    pub fn name_prefix(prefix: impl Into<String>) -> Self {
        Self::NamePrefix(prefix.into())
    }

    /// Whether a device with this advertised name passes the filter.
    ///
    /// Devices without a name only pass [`DiscoveryFilter::AcceptAll`].
    pub fn matches(&self, name: Option<&str>) -> bool {
        match self {
            Self::AcceptAll => true,
            Self::NamePrefix(prefix) => name.is_some_and(|n| n.starts_with(prefix.as_str())),
        }
    }
}

impl Default for DiscoveryFilter {
    fn default() -> Self {
        Self::NamePrefix(DEFAULT_NAME_PREFIX.to_string())
    }
}

impl fmt::Display for DiscoveryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NamePrefix(prefix) => write!(f, "name prefix '{}'", prefix),
            Self::AcceptAll => write!(f, "any name"),
        }
    }
}

/// The GATT service and characteristic carrying reading notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GattTarget {
    pub service: Uuid,
    pub characteristic: Uuid,
}

impl Default for GattTarget {
    fn default() -> Self {
        Self {
            service: GLUCOPATCH_SERVICE,
            characteristic: READING_CHARACTERISTIC,
        }
    }
}

/// A device reported by a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    /// Connection identifier (MAC address, or the CoreBluetooth UUID on macOS).
    pub id: String,
    /// Advertised local name.
    pub name: Option<String>,
    /// Signal strength at scan time.
    pub rssi: Option<i16>,
    /// Service UUIDs included in the advertisement.
    #[serde(default)]
    pub services: Vec<Uuid>,
}

impl DiscoveredDevice {
    /// Create a device record with just an identifier and name.
    pub fn new(id: impl Into<String>, name: Option<&str>) -> Self {
        Self {
            id: id.into(),
            name: name.map(str::to_string),
            rssi: None,
            services: Vec::new(),
        }
    }

    /// Set the RSSI.
    #[must_use]
    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = Some(rssi);
        self
    }

    /// Name for display, falling back to the identifier.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Whether the advertisement included the given service.
    pub fn advertises(&self, service: Uuid) -> bool {
        self.services.contains(&service)
    }
}

/// Why a link went down without being asked to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum DisconnectReason {
    /// The adapter reported the peripheral disconnected.
    PeripheralDisconnected,
    /// The notification stream ended.
    NotificationsClosed,
    /// BLE error reported by the stack.
    BleError(String),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeripheralDisconnected => write!(f, "peripheral disconnected"),
            Self::NotificationsClosed => write!(f, "notification stream closed"),
            Self::BleError(msg) => write!(f, "BLE error: {}", msg),
        }
    }
}

/// An event on an established notification link.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// One notification payload.
    Frame(Bytes),
    /// The link went down. Always the last event of a subscription.
    Disconnected(DisconnectReason),
}

/// Stream of raw link events produced by [`Transport::enable_notifications`].
pub type LinkEventStream = BoxStream<'static, LinkEvent>;

/// The platform operations needed to bring up a reading subscription.
///
/// Steps are called in order: [`check_capability`](Transport::check_capability),
/// [`scan`](Transport::scan), [`open_link`](Transport::open_link),
/// [`resolve_service`](Transport::resolve_service),
/// [`resolve_characteristic`](Transport::resolve_characteristic),
/// [`enable_notifications`](Transport::enable_notifications). Timeouts are
/// applied by the caller.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// An open GATT link.
    type Link: Send + Sync + 'static;
    /// A resolved characteristic.
    type Characteristic: Clone + Send + Sync + 'static;

    /// Verify a Bluetooth adapter is present and powered.
    async fn check_capability(&self) -> Result<()>;

    /// Scan for `duration` and return the devices passing `filter`.
    ///
    /// `service` is the service the caller intends to use; implementations
    /// may use it to annotate results but must not require it to be
    /// advertised.
    async fn scan(
        &self,
        filter: &DiscoveryFilter,
        service: Uuid,
        duration: Duration,
    ) -> Result<Vec<DiscoveredDevice>>;

    /// Open the GATT link to a discovered device.
    async fn open_link(&self, device: &DiscoveredDevice) -> Result<Self::Link>;

    /// Resolve the primary service on an open link.
    async fn resolve_service(&self, link: &Self::Link, service: Uuid) -> Result<()>;

    /// Resolve a characteristic inside an already resolved service.
    async fn resolve_characteristic(
        &self,
        link: &Self::Link,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Self::Characteristic>;

    /// Enable notifications and return the stream of link events.
    ///
    /// The stream yields [`LinkEvent::Frame`] per notification and ends after
    /// a [`LinkEvent::Disconnected`] (or simply ends) when the link drops.
    async fn enable_notifications(
        &self,
        link: &Self::Link,
        characteristic: &Self::Characteristic,
    ) -> Result<LinkEventStream>;

    /// Close the link. Closing an already closed link is not an error.
    async fn close_link(&self, link: &Self::Link) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_is_esp32_prefix() {
        let filter = DiscoveryFilter::default();
        assert_eq!(filter, DiscoveryFilter::NamePrefix("ESP32".to_string()));
        assert!(filter.matches(Some("ESP32-GlucoPatch")));
        assert!(!filter.matches(Some("esp32-lowercase")));
        assert!(!filter.matches(Some("Polar H10 1234")));
        assert!(!filter.matches(None));
    }

    #[test]
    fn test_accept_all_filter() {
        let filter = DiscoveryFilter::AcceptAll;
        assert!(filter.matches(Some("anything")));
        assert!(filter.matches(None));
        assert_eq!(filter.to_string(), "any name");
    }

    #[test]
    fn test_filter_serialization() {
        let json = serde_json::to_string(&DiscoveryFilter::name_prefix("GP")).unwrap();
        assert_eq!(json, r#"{"name_prefix":"GP"}"#);
        let json = serde_json::to_string(&DiscoveryFilter::AcceptAll).unwrap();
        assert_eq!(json, r#""accept_all""#);
    }

    #[test]
    fn test_default_gatt_target() {
        let target = GattTarget::default();
        assert_eq!(target.service, GLUCOPATCH_SERVICE);
        assert_eq!(target.characteristic, READING_CHARACTERISTIC);
    }

    #[test]
    fn test_discovered_device_display_name() {
        let named = DiscoveredDevice::new("AA:BB", Some("ESP32-1"));
        assert_eq!(named.display_name(), "ESP32-1");

        let anonymous = DiscoveredDevice::new("AA:BB", None).with_rssi(-60);
        assert_eq!(anonymous.display_name(), "AA:BB");
        assert_eq!(anonymous.rssi, Some(-60));
        assert!(!anonymous.advertises(GLUCOPATCH_SERVICE));
    }

    #[test]
    fn test_discovered_device_serializes_services() {
        let mut device = DiscoveredDevice::new("AA:BB", Some("ESP32-1")).with_rssi(-70);
        device.services.push(GLUCOPATCH_SERVICE);

        let json = serde_json::to_value(&device).unwrap();
        assert_eq!(
            json["services"][0],
            "4fafc201-1fb5-459e-8fcc-c5c9c331914b"
        );

        let back: DiscoveredDevice = serde_json::from_value(json).unwrap();
        assert_eq!(back, device);
        assert!(back.advertises(GLUCOPATCH_SERVICE));
    }

    #[test]
    fn test_disconnect_reason_display() {
        assert_eq!(
            DisconnectReason::PeripheralDisconnected.to_string(),
            "peripheral disconnected"
        );
        assert!(
            DisconnectReason::BleError("boom".into())
                .to_string()
                .contains("boom")
        );
    }
}

//! btleplug-backed [`Transport`].
//!
//! Device identification follows the platform: the Bluetooth MAC address on
//! Linux and Windows, the CoreBluetooth peripheral UUID on macOS (where the
//! advertised address reads as all zeros).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CentralState, Characteristic, Manager as _, Peripheral as _, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use bytes::Bytes;
use futures::{StreamExt, future, stream};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{CapabilityReason, Error, Result};
use crate::transport::{
    DiscoveredDevice, DisconnectReason, DiscoveryFilter, LinkEvent, LinkEventStream, Transport,
};

/// An open link to a BLE peripheral.
#[derive(Debug, Clone)]
pub struct BleLink {
    peripheral: Peripheral,
    identifier: String,
}

impl BleLink {
    /// Connection identifier of the peripheral.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

/// BLE transport using the first powered Bluetooth adapter.
///
/// The adapter is selected lazily by [`Transport::check_capability`] and
/// reused for every later operation.
#[derive(Default)]
pub struct BleTransport {
    adapter: Mutex<Option<Adapter>>,
    /// Peripherals seen by the last scan, keyed by connection identifier.
    known: Mutex<HashMap<String, Peripheral>>,
}

impl std::fmt::Debug for BleTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleTransport").finish_non_exhaustive()
    }
}

impl BleTransport {
    /// Create a transport. No Bluetooth resources are touched until first use.
    pub fn new() -> Self {
        Self::default()
    }

    async fn adapter(&self) -> Result<Adapter> {
        let mut slot = self.adapter.lock().await;
        if let Some(adapter) = slot.as_ref() {
            return Ok(adapter.clone());
        }
        let adapter = select_adapter().await?;
        *slot = Some(adapter.clone());
        Ok(adapter)
    }

    async fn peripheral_for(&self, device: &DiscoveredDevice) -> Result<Peripheral> {
        if let Some(peripheral) = self.known.lock().await.get(&device.id) {
            return Ok(peripheral.clone());
        }

        // Not from our own scan (e.g. a remembered identifier): ask the adapter.
        let adapter = self.adapter().await?;
        for peripheral in adapter.peripherals().await? {
            let address = peripheral
                .properties()
                .await?
                .map(|p| p.address.to_string())
                .unwrap_or_default();
            if device_identifier(&address, &peripheral.id()) == device.id {
                return Ok(peripheral);
            }
        }
        Err(Error::DeviceUnavailable(device.id.clone()))
    }
}

/// Pick the first adapter that is not powered off.
async fn select_adapter() -> Result<Adapter> {
    let manager = Manager::new()
        .await
        .map_err(|e| Error::CapabilityUnavailable(CapabilityReason::Unsupported(e.to_string())))?;
    let adapters = manager.adapters().await?;
    if adapters.is_empty() {
        return Err(Error::CapabilityUnavailable(CapabilityReason::NoAdapter));
    }

    for adapter in adapters {
        match adapter.adapter_state().await {
            Ok(CentralState::PoweredOff) => {
                debug!("Skipping powered-off adapter");
            }
            Ok(state) => {
                debug!(?state, "Using adapter");
                return Ok(adapter);
            }
            Err(e) => {
                // Some backends cannot report state; treat the adapter as usable.
                debug!(error = %e, "Adapter state unknown, using it");
                return Ok(adapter);
            }
        }
    }
    Err(Error::CapabilityUnavailable(CapabilityReason::PoweredOff))
}

fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// The address where it is meaningful, else the platform peripheral ID.
fn device_identifier(address: &str, id: &PeripheralId) -> String {
    if address.is_empty() || address == "00:00:00:00:00:00" {
        format_peripheral_id(id)
    } else {
        address.to_string()
    }
}

#[async_trait]
impl Transport for BleTransport {
    type Link = BleLink;
    type Characteristic = Characteristic;

    #[tracing::instrument(level = "debug", skip(self))]
    async fn check_capability(&self) -> Result<()> {
        self.adapter().await.map(|_| ())
    }

    #[tracing::instrument(level = "info", skip_all, fields(filter = %filter, duration_secs = duration.as_secs()))]
    async fn scan(
        &self,
        filter: &DiscoveryFilter,
        service: Uuid,
        duration: Duration,
    ) -> Result<Vec<DiscoveredDevice>> {
        let adapter = self.adapter().await?;
        info!("Starting BLE scan for {} seconds...", duration.as_secs());

        // The patch does not necessarily advertise its service, so scan unfiltered.
        adapter.start_scan(ScanFilter::default()).await?;
        sleep(duration).await;
        adapter.stop_scan().await?;

        let mut discovered = Vec::new();
        let mut known = self.known.lock().await;
        for peripheral in adapter.peripherals().await? {
            let properties = match peripheral.properties().await {
                Ok(Some(p)) => p,
                Ok(None) => continue,
                Err(e) => {
                    debug!("Error reading peripheral properties: {}", e);
                    continue;
                }
            };
            if !filter.matches(properties.local_name.as_deref()) {
                continue;
            }

            let id = device_identifier(&properties.address.to_string(), &peripheral.id());
            let device = DiscoveredDevice {
                id: id.clone(),
                name: properties.local_name.clone(),
                rssi: properties.rssi,
                services: properties.services.clone(),
            };
            if device.advertises(service) {
                debug!(device = %device.display_name(), "Advertises the reading service");
            }
            known.insert(id, peripheral);
            discovered.push(device);
        }

        info!("Scan complete. Found {} device(s)", discovered.len());
        Ok(discovered)
    }

    #[tracing::instrument(level = "info", skip_all, fields(device = %device.display_name()))]
    async fn open_link(&self, device: &DiscoveredDevice) -> Result<BleLink> {
        let peripheral = self.peripheral_for(device).await?;
        if !peripheral.is_connected().await.unwrap_or(false) {
            peripheral.connect().await?;
        }
        info!("Connected!");
        Ok(BleLink {
            peripheral,
            identifier: device.id.clone(),
        })
    }

    #[tracing::instrument(level = "info", skip(self, link), fields(device = %link.identifier))]
    async fn resolve_service(&self, link: &BleLink, service: Uuid) -> Result<()> {
        info!("Discovering services...");
        link.peripheral.discover_services().await?;

        let services = link.peripheral.services();
        debug!("Found {} services", services.len());
        if services.iter().any(|s| s.uuid == service) {
            Ok(())
        } else {
            Err(Error::ServiceNotFound(service))
        }
    }

    #[tracing::instrument(level = "info", skip(self, link), fields(device = %link.identifier))]
    async fn resolve_characteristic(
        &self,
        link: &BleLink,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Characteristic> {
        link.peripheral
            .services()
            .into_iter()
            .filter(|s| s.uuid == service)
            .flat_map(|s| s.characteristics)
            .find(|c| c.uuid == characteristic)
            .ok_or(Error::CharacteristicNotFound {
                service,
                characteristic,
            })
    }

    #[tracing::instrument(level = "info", skip_all, fields(device = %link.identifier, characteristic = %characteristic.uuid))]
    async fn enable_notifications(
        &self,
        link: &BleLink,
        characteristic: &Characteristic,
    ) -> Result<LinkEventStream> {
        let adapter = self.adapter().await?;

        // Open both streams before enabling so no early notification is missed.
        let notifications = link.peripheral.notifications().await?;
        let central_events = adapter.events().await?;
        link.peripheral.subscribe(characteristic).await?;

        let char_uuid = characteristic.uuid;
        let frames = notifications
            .filter_map(move |n| {
                future::ready((n.uuid == char_uuid).then(|| LinkEvent::Frame(Bytes::from(n.value))))
            })
            .chain(stream::once(future::ready(LinkEvent::Disconnected(
                DisconnectReason::NotificationsClosed,
            ))));

        let peripheral_id = link.peripheral.id();
        let disconnects = central_events.filter_map(move |event| {
            future::ready(match event {
                CentralEvent::DeviceDisconnected(id) if id == peripheral_id => {
                    Some(LinkEvent::Disconnected(DisconnectReason::PeripheralDisconnected))
                }
                _ => None,
            })
        });

        Ok(stream::select(frames, disconnects).boxed())
    }

    #[tracing::instrument(level = "info", skip_all, fields(device = %link.identifier))]
    async fn close_link(&self, link: &BleLink) -> Result<()> {
        match link.peripheral.is_connected().await {
            Ok(false) => {
                debug!("Link already down");
                Ok(())
            }
            _ => {
                info!("Disconnecting from device...");
                if let Err(e) = link.peripheral.disconnect().await {
                    warn!("Disconnect failed: {}", e);
                    return Err(e.into());
                }
                Ok(())
            }
        }
    }
}

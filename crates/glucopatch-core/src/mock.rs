//! Mock transport implementation for testing and demo mode.
//!
//! This module provides an in-memory [`Transport`] that can be used for unit
//! testing without requiring actual BLE hardware, and that powers the
//! `--demo` mode of the command-line tools.
//!
//! # Features
//!
//! - **Failure injection**: Make any transport step fail with a message
//! - **Latency simulation**: Add artificial delays to every step
//! - **Frame injection**: Push raw notification payloads into the active link
//! - **Disconnect simulation**: End the active link with a reason
//! - **Synthetic feed**: Emit plausible glucose/temperature frames on a timer

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::channel::mpsc::{UnboundedSender, unbounded};
use rand::Rng;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::debug;
use uuid::Uuid;

use crate::error::{CapabilityReason, Error, Result};
use crate::transport::{
    DiscoveredDevice, DisconnectReason, DiscoveryFilter, GattTarget, LinkEvent, LinkEventStream,
    Transport,
};

/// Transport operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockStep {
    Capability,
    Scan,
    OpenLink,
    ResolveService,
    ResolveCharacteristic,
    EnableNotifications,
    CloseLink,
}

/// An open link on a [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockLink {
    /// Identifier of the device the link is open to.
    pub device_id: String,
    /// Sequence number of the link on this transport (1-based).
    pub sequence: u32,
}

/// A mock BLE transport for testing.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use glucopatch_core::{connect_gatt, ConnectionConfig, GattTarget, MockTransport};
///
/// #[tokio::main]
/// async fn main() {
///     let transport = Arc::new(MockTransport::new());
///     let device = transport.devices()[0].clone();
///     let handle = connect_gatt(transport.clone(), device, GattTarget::default(), ConnectionConfig::default())
///         .await
///         .unwrap();
///
///     let mut subscription = handle.subscribe().await.unwrap();
///     transport.push_frame(&br#"{"glucose_mg_dL": 100, "temperature_C": 36.6}"#[..]);
///     assert!(subscription.recv().await.is_some());
///     handle.close().await.unwrap();
/// }
/// ```
pub struct MockTransport {
    devices: Vec<DiscoveredDevice>,
    offered: GattTarget,
    available: AtomicBool,
    failures: Mutex<HashMap<MockStep, String>>,
    /// Simulated latency per step in milliseconds (0 = no delay).
    step_latency_ms: AtomicU64,
    feed: Mutex<Option<UnboundedSender<LinkEvent>>>,
    demo_interval: Option<Duration>,
    drop_on_enable: Option<DisconnectReason>,
    open_links: AtomicU32,
    close_calls: AtomicU32,
    scan_calls: AtomicU32,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("devices", &self.devices.len())
            .field("available", &self.available.load(Ordering::Relaxed))
            .field("demo_interval", &self.demo_interval)
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create a mock with one GlucoPatch-like device in range.
    pub fn new() -> Self {
        MockTransportBuilder::new().build()
    }

    /// Create a mock that emits synthetic readings once notifications are on.
    pub fn demo(interval: Duration) -> Self {
        MockTransportBuilder::new()
            .device(
                DiscoveredDevice::new("DEMO-000001", Some("ESP32-GlucoPatch (demo)")).with_rssi(-48),
            )
            .demo_feed(interval)
            .build()
    }

    /// Create a new builder.
    pub fn builder() -> MockTransportBuilder {
        MockTransportBuilder::new()
    }

    /// Devices the mock reports in range.
    pub fn devices(&self) -> Vec<DiscoveredDevice> {
        self.devices.clone()
    }

    /// Set whether the capability check succeeds.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Make a step fail with the given message until cleared.
    pub fn fail_at(&self, step: MockStep, message: &str) {
        lock(&self.failures).insert(step, message.to_string());
    }

    /// Clear all injected failures.
    pub fn clear_failures(&self) {
        lock(&self.failures).clear();
    }

    /// Set simulated latency applied before every step.
    pub fn set_step_latency(&self, latency: Duration) {
        self.step_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Push a raw frame into the active notification link.
    ///
    /// Returns `false` if notifications are not enabled.
    pub fn push_frame(&self, frame: impl Into<Bytes>) -> bool {
        let feed = lock(&self.feed);
        match feed.as_ref() {
            Some(tx) => tx.unbounded_send(LinkEvent::Frame(frame.into())).is_ok(),
            None => false,
        }
    }

    /// End the active notification link with the given reason.
    ///
    /// Returns `false` if notifications are not enabled.
    pub fn simulate_disconnect(&self, reason: DisconnectReason) -> bool {
        match lock(&self.feed).take() {
            Some(tx) => tx.unbounded_send(LinkEvent::Disconnected(reason)).is_ok(),
            None => false,
        }
    }

    /// Whether a notification link is currently active.
    pub fn notifications_active(&self) -> bool {
        lock(&self.feed).is_some()
    }

    /// Number of links opened so far.
    pub fn open_link_count(&self) -> u32 {
        self.open_links.load(Ordering::SeqCst)
    }

    /// Number of `close_link` calls so far.
    pub fn close_link_count(&self) -> u32 {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Number of scans so far.
    pub fn scan_count(&self) -> u32 {
        self.scan_calls.load(Ordering::SeqCst)
    }

    async fn enter(&self, step: MockStep) -> Result<()> {
        let latency = self.step_latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if let Some(message) = lock(&self.failures).get(&step) {
            return Err(Error::Bluetooth(btleplug::Error::Other(
                message.clone().into(),
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Link = MockLink;
    type Characteristic = Uuid;

    async fn check_capability(&self) -> Result<()> {
        self.enter(MockStep::Capability).await?;
        if !self.available.load(Ordering::SeqCst) {
            return Err(Error::CapabilityUnavailable(CapabilityReason::NoAdapter));
        }
        Ok(())
    }

    async fn scan(
        &self,
        filter: &DiscoveryFilter,
        _service: Uuid,
        _duration: Duration,
    ) -> Result<Vec<DiscoveredDevice>> {
        self.scan_calls.fetch_add(1, Ordering::SeqCst);
        self.enter(MockStep::Scan).await?;
        Ok(self.devices
            .iter()
            .filter(|d| filter.matches(d.name.as_deref()))
            .cloned()
            .collect())
    }

    async fn open_link(&self, device: &DiscoveredDevice) -> Result<MockLink> {
        self.enter(MockStep::OpenLink).await?;
        if !self.devices.iter().any(|d| d.id == device.id) {
            return Err(Error::DeviceUnavailable(device.id.clone()));
        }
        let sequence = self.open_links.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(device = %device.id, sequence, "Mock link opened");
        Ok(MockLink {
            device_id: device.id.clone(),
            sequence,
        })
    }

    async fn resolve_service(&self, _link: &MockLink, service: Uuid) -> Result<()> {
        self.enter(MockStep::ResolveService).await?;
        if service != self.offered.service {
            return Err(Error::ServiceNotFound(service));
        }
        Ok(())
    }

    async fn resolve_characteristic(
        &self,
        _link: &MockLink,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Uuid> {
        self.enter(MockStep::ResolveCharacteristic).await?;
        if characteristic != self.offered.characteristic {
            return Err(Error::CharacteristicNotFound {
                service,
                characteristic,
            });
        }
        Ok(characteristic)
    }

    async fn enable_notifications(
        &self,
        _link: &MockLink,
        _characteristic: &Uuid,
    ) -> Result<LinkEventStream> {
        self.enter(MockStep::EnableNotifications).await?;

        let (tx, rx) = unbounded();
        if let Some(reason) = &self.drop_on_enable {
            // The sender goes away with this scope, so the stream ends too.
            let _ = tx.unbounded_send(LinkEvent::Disconnected(reason.clone()));
            return Ok(rx.boxed());
        }
        if let Some(interval) = self.demo_interval {
            spawn_demo_feed(tx.clone(), interval);
        }
        *lock(&self.feed) = Some(tx);
        Ok(rx.boxed())
    }

    async fn close_link(&self, link: &MockLink) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.enter(MockStep::CloseLink).await?;
        lock(&self.feed).take();
        debug!(device = %link.device_id, sequence = link.sequence, "Mock link closed");
        Ok(())
    }
}

/// Builder for creating mock transports with custom settings.
#[derive(Debug)]
pub struct MockTransportBuilder {
    devices: Vec<DiscoveredDevice>,
    default_device: bool,
    available: bool,
    demo_interval: Option<Duration>,
    drop_on_enable: Option<DisconnectReason>,
}

impl Default for MockTransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransportBuilder {
    /// Create a new builder with one default device.
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            default_device: true,
            available: true,
            demo_interval: None,
            drop_on_enable: None,
        }
    }

    /// Add a device in range.
    #[must_use]
    pub fn device(mut self, device: DiscoveredDevice) -> Self {
        self.devices.push(device);
        self.default_device = false;
        self
    }

    /// Start with no devices in range.
    #[must_use]
    pub fn no_devices(mut self) -> Self {
        self.devices.clear();
        self.default_device = false;
        self
    }

    /// Set whether the capability check succeeds.
    #[must_use]
    pub fn available(mut self, available: bool) -> Self {
        self.available = available;
        self
    }

    /// Emit synthetic readings at the given interval once notifications are on.
    #[must_use]
    pub fn demo_feed(mut self, interval: Duration) -> Self {
        self.demo_interval = Some(interval);
        self
    }

    /// Drop the link with `reason` as soon as notifications are enabled.
    #[must_use]
    pub fn drop_link_on_enable(mut self, reason: DisconnectReason) -> Self {
        self.drop_on_enable = Some(reason);
        self
    }

    /// Build the mock transport.
    pub fn build(self) -> MockTransport {
        let mut devices = self.devices;
        if self.default_device {
            devices.push(DiscoveredDevice::new("MOCK-000001", Some("ESP32-GlucoPatch")).with_rssi(-55));
        }
        MockTransport {
            devices,
            offered: GattTarget::default(),
            available: AtomicBool::new(self.available),
            failures: Mutex::new(HashMap::new()),
            step_latency_ms: AtomicU64::new(0),
            feed: Mutex::new(None),
            demo_interval: self.demo_interval,
            drop_on_enable: self.drop_on_enable,
            open_links: AtomicU32::new(0),
            close_calls: AtomicU32::new(0),
            scan_calls: AtomicU32::new(0),
        }
    }
}

/// Synthetic glucose/temperature signal for demo mode.
///
/// Glucose follows a mean-reverting random walk around 110 mg/dL; skin
/// temperature drifts slowly around 36.6 °C.
#[derive(Debug, Clone)]
pub struct DemoSignal {
    glucose: f64,
    temperature: f64,
    started: Instant,
}

impl Default for DemoSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl DemoSignal {
    pub fn new() -> Self {
        Self {
            glucose: 110.0,
            temperature: 36.6,
            started: Instant::now(),
        }
    }

    /// Advance the signal and return the next JSON frame.
    pub fn next_frame(&mut self) -> Bytes {
        let (glucose_step, temperature_step) = {
            let mut rng = rand::rng();
            (rng.random_range(-6.0..6.0), rng.random_range(-0.05..0.05))
        };
        self.glucose = (self.glucose + glucose_step + (110.0 - self.glucose) * 0.05).clamp(55.0, 280.0);
        self.temperature =
            (self.temperature + temperature_step + (36.6 - self.temperature) * 0.1).clamp(35.5, 38.0);

        let now = OffsetDateTime::now_utc();
        let timestamp = now
            .format(&Rfc3339)
            .unwrap_or_else(|_| now.unix_timestamp().to_string());
        let uptime = self.started.elapsed().as_secs();

        let frame = serde_json::json!({
            "timestamp": timestamp,
            "glucose_mg_dL": (self.glucose * 10.0).round() / 10.0,
            "temperature_C": (self.temperature * 100.0).round() / 100.0,
            "uptime": format!("{:02}:{:02}:{:02}", uptime / 3600, (uptime / 60) % 60, uptime % 60),
        });
        Bytes::from(frame.to_string())
    }
}

fn spawn_demo_feed(tx: UnboundedSender<LinkEvent>, interval: Duration) {
    tokio::spawn(async move {
        let mut signal = DemoSignal::new();
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if tx.unbounded_send(LinkEvent::Frame(signal.next_frame())).is_err() {
                debug!("Demo feed stopped");
                return;
            }
        }
    });
}

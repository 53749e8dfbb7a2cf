//! Session controller.
//!
//! A [`Session`] owns the connection state machine, the reading store and
//! the diagnostic log for one monitor run:
//!
//! ```text
//! Disconnected --connect()--> Connecting --link + subscription--> Connected
//!      ^                          |                                  |
//!      +------ any step fails ----+---- disconnect() / link lost ----+
//! ```
//!
//! State is published on a `watch` channel and everything else that happens
//! (readings, decode failures, log lines) on a `broadcast` channel of
//! [`SessionEvent`]s. Nothing reconnects automatically.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use glucopatch_core::{ConnectionState, FirstMatch, MockTransport, Session, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let transport = Arc::new(MockTransport::new());
//!     let session = Session::new(transport.clone(), SessionConfig::default());
//!
//!     session.connect(&FirstMatch).await.unwrap();
//!     assert_eq!(session.state(), ConnectionState::Connected);
//!
//!     session.disconnect().await.unwrap();
//!     assert_eq!(session.state(), ConnectionState::Disconnected);
//! }
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use time::UtcOffset;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use glucopatch_types::{DecodeError, LogLevel, Reading};

use crate::connection::{ConnectionConfig, ConnectionHandle, Subscription, connect_gatt_observed};
use crate::discovery::{DeviceChooser, ScanOptions, discover};
use crate::error::{ConnectStep, Error, Result};
use crate::events::{EventReceiver, SessionEvent};
use crate::log::DiagnosticLog;
use crate::recorder::{DEFAULT_EVENT_CAPACITY, Recorder};
use crate::store::ReadingStore;
use crate::transport::{DiscoveredDevice, DisconnectReason, GattTarget, LinkEvent, Transport};

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
        }
    }
}

/// Configuration for a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How to find the patch.
    pub scan: ScanOptions,
    /// Service and characteristic carrying readings.
    pub target: GattTarget,
    /// Per-step timeouts.
    pub connection: ConnectionConfig,
    /// Optional reading retention cap (`None` = unbounded).
    pub max_readings: Option<usize>,
    /// Capacity of the session event broadcast.
    pub event_capacity: usize,
    /// UTC offset used to stamp log entries.
    pub clock_offset: UtcOffset,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scan: ScanOptions::default(),
            target: GattTarget::default(),
            connection: ConnectionConfig::default(),
            max_readings: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            clock_offset: UtcOffset::UTC,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn scan(mut self, scan: ScanOptions) -> Self {
        // Scanning and connecting must agree on the service.
        self.target.service = scan.service;
        self.scan = scan;
        self
    }

    #[must_use]
    pub fn target(mut self, target: GattTarget) -> Self {
        self.scan.service = target.service;
        self.target = target;
        self
    }

    #[must_use]
    pub fn connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }

    #[must_use]
    pub fn max_readings(mut self, max_readings: Option<usize>) -> Self {
        self.max_readings = max_readings;
        self
    }

    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn clock_offset(mut self, offset: UtcOffset) -> Self {
        self.clock_offset = offset;
        self
    }
}

/// State shared between the session and its frame pump.
struct Shared {
    recorder: Recorder,
    state: watch::Sender<ConnectionState>,
}

impl Shared {
    fn record(&self, level: LogLevel, message: impl Into<String>) {
        self.recorder.record(level, message);
    }

    /// Move from `from` to `to` if the state is `from`; returns whether it did.
    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        let changed = self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });
        if changed {
            debug!(%from, %to, "Session state changed");
            self.recorder.send(SessionEvent::StateChanged { state: to });
        }
        changed
    }
}

/// The link currently owned by a session.
struct ActiveLink<T: Transport> {
    handle: Arc<ConnectionHandle<T>>,
    cancel: CancellationToken,
    pump: JoinHandle<()>,
}

/// One monitor session: connection state machine, reading store and log.
pub struct Session<T: Transport> {
    transport: Arc<T>,
    config: SessionConfig,
    shared: Arc<Shared>,
    active: Mutex<Option<ActiveLink<T>>>,
}

impl<T: Transport> fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("readings", &self.shared.recorder.store().len())
            .field("log_entries", &self.shared.recorder.log().len())
            .finish_non_exhaustive()
    }
}

/// Log line for a failed connect attempt. Always names the failing step.
fn failure_message(err: &Error) -> String {
    match err {
        // Already rendered as "<step> failed: <reason>".
        Error::ConnectFailed { .. } => err.to_string(),
        Error::CapabilityUnavailable(reason) => {
            format!("{} failed: {reason}", ConnectStep::CapabilityCheck)
        }
        Error::Discovery(reason) => format!("{} failed: {reason}", ConnectStep::DeviceDiscovery),
        other => match other.step() {
            Some(step) => format!("{step} failed: {other}"),
            None => format!("Connect failed: {other}"),
        },
    }
}

impl<T: Transport> Session<T> {
    /// Create a disconnected session with an empty store and log.
    pub fn new(transport: Arc<T>, config: SessionConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let shared = Arc::new(Shared {
            recorder: Recorder::new(
                config.max_readings,
                config.event_capacity,
                config.clock_offset,
            ),
            state,
        });
        Self {
            transport,
            config,
            shared,
            active: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Watch connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> EventReceiver {
        self.shared.recorder.subscribe()
    }

    /// The reading history.
    pub fn store(&self) -> &Arc<ReadingStore> {
        self.shared.recorder.store()
    }

    /// The diagnostic log.
    pub fn log(&self) -> &Arc<DiagnosticLog> {
        self.shared.recorder.log()
    }

    /// The store, log and event broadcast this session records into.
    pub fn recorder(&self) -> &Recorder {
        &self.shared.recorder
    }

    /// The device of the current (or last) link, while a link is held.
    pub fn device(&self) -> Option<DiscoveredDevice> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|active| active.handle.device().clone())
    }

    /// Decode one frame and, on success, append it to the store.
    ///
    /// This is the same path notifications take. See
    /// [`Recorder::ingest_frame`].
    pub fn ingest_frame(&self, bytes: &[u8]) -> std::result::Result<Reading, DecodeError> {
        self.shared.recorder.ingest_frame(bytes)
    }

    /// Bring up a link and start consuming notifications.
    ///
    /// Runs the capability check, discovery (with `chooser` picking the
    /// device), GATT connect, service lookup, characteristic lookup and
    /// notification enable in order, logging each. Any failure is logged
    /// with the step it happened in, returns the session to
    /// [`ConnectionState::Disconnected`] and is returned to the caller.
    ///
    /// Returns [`Error::Busy`] without touching state unless the session is
    /// disconnected.
    #[tracing::instrument(level = "info", skip_all, fields(filter = %self.config.scan.filter))]
    pub async fn connect(&self, chooser: &dyn DeviceChooser) -> Result<DiscoveredDevice> {
        if !self
            .shared
            .transition(ConnectionState::Disconnected, ConnectionState::Connecting)
        {
            return Err(Error::Busy(self.state()));
        }

        // A link that dropped on its own is still parked here.
        let stale = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(stale) = stale {
            release(stale).await;
        }

        match self.bring_up(chooser).await {
            Ok((handle, subscription)) => {
                let device = handle.device().clone();
                let handle = Arc::new(handle);
                let cancel = CancellationToken::new();

                // Held until the link is parked so `disconnect` sees either
                // nothing or the whole link.
                let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
                self.shared
                    .transition(ConnectionState::Connecting, ConnectionState::Connected);
                self.shared.record(
                    LogLevel::Info,
                    format!("Connected to {}", device.display_name()),
                );
                // The pump may report the link lost at once, so it only
                // starts after the session is Connected.
                let pump = tokio::spawn(pump(
                    Arc::clone(&self.shared),
                    Arc::clone(&handle),
                    subscription,
                    cancel.clone(),
                ));
                *active = Some(ActiveLink {
                    handle,
                    cancel,
                    pump,
                });
                Ok(device)
            }
            Err(err) => {
                self.shared.record(LogLevel::Error, failure_message(&err));
                self.shared
                    .transition(ConnectionState::Connecting, ConnectionState::Disconnected);
                Err(err)
            }
        }
    }

    async fn bring_up(
        &self,
        chooser: &dyn DeviceChooser,
    ) -> Result<(ConnectionHandle<T>, Subscription)> {
        let shared = &self.shared;
        let config = &self.config;

        shared.record(LogLevel::Info, "Checking Bluetooth availability...");
        let limit = config.connection.capability_timeout;
        match timeout(limit, self.transport.check_capability()).await {
            Ok(Ok(())) => {}
            Ok(Err(err @ Error::CapabilityUnavailable(_))) => return Err(err),
            Ok(Err(err)) => return Err(Error::connect_failed(ConnectStep::CapabilityCheck, err)),
            Err(_) => {
                return Err(Error::connect_failed(
                    ConnectStep::CapabilityCheck,
                    Error::timeout(ConnectStep::CapabilityCheck.to_string(), limit),
                ));
            }
        }
        shared.record(LogLevel::Info, "Bluetooth available");

        shared.record(
            LogLevel::Info,
            format!("Scanning for devices ({})...", config.scan.filter),
        );
        let device = discover(self.transport.as_ref(), &config.scan, chooser).await?;
        shared.record(
            LogLevel::Info,
            format!("Selected {} ({})", device.display_name(), device.id),
        );

        let target = config.target;
        let handle = connect_gatt_observed(
            Arc::clone(&self.transport),
            device,
            target,
            config.connection.clone(),
            |step| {
                let message = match step {
                    ConnectStep::GattConnect => "GATT connected".to_string(),
                    ConnectStep::ServiceLookup => format!("Service {} found", target.service),
                    ConnectStep::CharacteristicLookup => {
                        format!("Characteristic {} found", target.characteristic)
                    }
                    other => format!("{other} done"),
                };
                shared.record(LogLevel::Info, message);
            },
        )
        .await?;

        let subscription = match handle.subscribe().await {
            Ok(subscription) => subscription,
            Err(err) => {
                if let Err(close_err) = handle.close().await {
                    debug!(error = %close_err, "Failed to close link after enable failure");
                }
                return Err(err);
            }
        };
        shared.record(LogLevel::Info, "Notifications enabled");
        Ok((handle, subscription))
    }

    /// Explicitly stop: cancel the frame pump, close the link and return to
    /// [`ConnectionState::Disconnected`].
    ///
    /// A no-op when no link is held (including while a connect is still in
    /// progress).
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn disconnect(&self) -> Result<()> {
        let active = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(active) = active else {
            return Ok(());
        };

        let name = active.handle.device().display_name().to_string();
        active.cancel.cancel();
        if let Err(e) = active.pump.await {
            debug!(error = %e, "Frame pump ended abnormally");
        }
        // No-op when the pump already closed it.
        let closed = active.handle.close().await;

        if self
            .shared
            .transition(ConnectionState::Connected, ConnectionState::Disconnected)
        {
            self.shared
                .record(LogLevel::Info, format!("Disconnected from {name}"));
        }
        closed
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        let active = self
            .active
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(active) = active {
            active.cancel.cancel();
            // The pump closes the link itself once cancelled.
            debug!("Session dropped with an active link");
        }
    }
}

/// Tear down a link whose pump already finished.
async fn release<T: Transport>(active: ActiveLink<T>) {
    active.cancel.cancel();
    let _ = active.pump.await;
    if let Err(e) = active.handle.close().await {
        debug!(error = %e, "Failed to close stale link");
    }
}

/// Consume the subscription one event at a time, in arrival order.
async fn pump<T: Transport>(
    shared: Arc<Shared>,
    handle: Arc<ConnectionHandle<T>>,
    mut subscription: Subscription,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            event = subscription.recv() => Some(event),
        };

        match event {
            None => {
                subscription.close().await;
                if let Err(e) = handle.close().await {
                    debug!(error = %e, "Failed to close link after cancel");
                }
                return;
            }
            Some(Some(LinkEvent::Frame(bytes))) => {
                let _ = shared.recorder.ingest_frame(&bytes);
            }
            Some(Some(LinkEvent::Disconnected(reason))) => {
                link_lost(&shared, &handle, reason).await;
                return;
            }
            Some(None) => {
                link_lost(&shared, &handle, DisconnectReason::NotificationsClosed).await;
                return;
            }
        }
    }
}

async fn link_lost<T: Transport>(
    shared: &Shared,
    handle: &ConnectionHandle<T>,
    reason: DisconnectReason,
) {
    info!(%reason, "Link lost");
    if let Err(e) = handle.close().await {
        debug!(error = %e, "Failed to close link after disconnect");
    }
    shared.record(LogLevel::Warn, format!("Device disconnected: {reason}"));
    shared.transition(ConnectionState::Connected, ConnectionState::Disconnected);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::FirstMatch;
    use crate::mock::{MockStep, MockTransport};
    use crate::transport::DiscoveryFilter;

    fn session(transport: &Arc<MockTransport>) -> Session<MockTransport> {
        Session::new(Arc::clone(transport), SessionConfig::default())
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Disconnected.to_string(), "Disconnected");
        assert_eq!(ConnectionState::Connecting.to_string(), "Connecting");
        assert_eq!(ConnectionState::Connected.to_string(), "Connected");
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_session_config_keeps_service_consistent() {
        let config = SessionConfig::new().scan(ScanOptions::new().all_devices());
        assert_eq!(config.scan.filter, DiscoveryFilter::AcceptAll);
        assert_eq!(config.scan.service, config.target.service);
        assert_eq!(SessionConfig::new().event_capacity(0).event_capacity, 1);
    }

    #[test]
    fn test_failure_message_names_step() {
        let err = Error::connect_failed(ConnectStep::ServiceLookup, Error::NotConnected);
        assert!(failure_message(&err).starts_with("Service lookup failed"));

        let err = Error::cancelled();
        assert_eq!(
            failure_message(&err),
            "Device discovery failed: device selection cancelled"
        );
    }

    #[tokio::test]
    async fn test_new_session_is_empty() {
        let transport = Arc::new(MockTransport::new());
        let session = session(&transport);
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(session.store().is_empty());
        assert!(session.log().is_empty());
        assert!(session.device().is_none());
    }

    #[tokio::test]
    async fn test_connect_logs_every_step() {
        let transport = Arc::new(MockTransport::new());
        let session = session(&transport);

        let device = session.connect(&FirstMatch).await.unwrap();
        assert_eq!(device.name.as_deref(), Some("ESP32-GlucoPatch"));
        assert_eq!(session.state(), ConnectionState::Connected);
        assert!(transport.notifications_active());

        let messages: Vec<String> = session.log().entries().into_iter().map(|e| e.message).collect();
        assert!(messages.iter().any(|m| m == "Bluetooth available"));
        assert!(messages.iter().any(|m| m.starts_with("Selected ESP32-GlucoPatch")));
        assert!(messages.iter().any(|m| m == "GATT connected"));
        assert!(messages.iter().any(|m| m.starts_with("Service ")));
        assert!(messages.iter().any(|m| m.starts_with("Characteristic ")));
        assert!(messages.iter().any(|m| m == "Notifications enabled"));

        session.disconnect().await.unwrap();
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(transport.close_link_count(), 1);
    }

    #[tokio::test]
    async fn test_capability_failure_returns_to_disconnected() {
        let transport = Arc::new(MockTransport::new());
        transport.set_available(false);
        let session = session(&transport);

        let err = session.connect(&FirstMatch).await.unwrap_err();
        assert!(matches!(err, Error::CapabilityUnavailable(_)));
        assert_eq!(session.state(), ConnectionState::Disconnected);

        let last = session.log().entries().pop().unwrap();
        assert_eq!(last.level, LogLevel::Error);
        assert!(last.message.starts_with("Capability check failed"));
        assert_eq!(transport.scan_count(), 0);
    }

    #[tokio::test]
    async fn test_enable_failure_closes_link() {
        let transport = Arc::new(MockTransport::new());
        transport.fail_at(MockStep::EnableNotifications, "CCCD write rejected");
        let session = session(&transport);

        let err = session.connect(&FirstMatch).await.unwrap_err();
        assert_eq!(err.step(), Some(ConnectStep::NotificationEnable));
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(transport.open_link_count(), 1);
        assert_eq!(transport.close_link_count(), 1);
    }

    #[tokio::test]
    async fn test_ingest_frame_appends_and_logs() {
        let transport = Arc::new(MockTransport::new());
        let session = session(&transport);

        let reading = session
            .ingest_frame(br#"{"glucose_mg_dL": 98.5, "temperature_C": 36.7}"#)
            .unwrap();
        assert_eq!(reading.glucose_mg_dl, 98.5);
        assert_eq!(session.store().len(), 1);

        let err = session.ingest_frame(&[0xff, 0xfe]).unwrap_err();
        assert_eq!(err.kind(), "encoding");
        assert_eq!(session.store().len(), 1);

        let entries = session.log().entries();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].message.starts_with("Received 98.5 mg/dL"));
        assert_eq!(entries[1].level, LogLevel::Warn);
        assert!(entries[1].message.starts_with("Invalid frame (encoding)"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_immediate_link_loss_ends_disconnected() {
        let transport = Arc::new(
            MockTransport::builder()
                .drop_link_on_enable(DisconnectReason::PeripheralDisconnected)
                .build(),
        );
        let session = session(&transport);
        let mut state = session.watch_state();

        for attempt in 0..200 {
            session.connect(&FirstMatch).await.unwrap();
            tokio::time::timeout(
                std::time::Duration::from_secs(2),
                state.wait_for(|s| *s == ConnectionState::Disconnected),
            )
            .await
            .unwrap_or_else(|_| panic!("attempt {attempt}: still {} after link loss", session.state()))
            .unwrap();
        }

        let lost = session
            .log()
            .entries()
            .iter()
            .filter(|e| e.message.starts_with("Device disconnected"))
            .count();
        assert_eq!(lost, 200);
    }

    #[tokio::test]
    async fn test_log_uses_configured_clock_offset() {
        let offset = UtcOffset::from_hms(9, 0, 0).unwrap();
        let transport = Arc::new(MockTransport::new());
        let session = Session::new(transport, SessionConfig::new().clock_offset(offset));
        assert_eq!(session.log().offset(), offset);
        assert!(std::ptr::eq(
            Arc::as_ptr(session.store()),
            Arc::as_ptr(session.recorder().store())
        ));
    }

    #[tokio::test]
    async fn test_disconnect_without_link_is_noop() {
        let transport = Arc::new(MockTransport::new());
        let session = session(&transport);
        session.disconnect().await.unwrap();
        assert!(session.log().is_empty());
        assert_eq!(transport.close_link_count(), 0);
    }
}

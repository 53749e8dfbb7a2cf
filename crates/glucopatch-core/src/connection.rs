//! GATT link bring-up and the notification subscription.
//!
//! [`connect_gatt`] opens the link, resolves the service and resolves the
//! characteristic, each under its own timeout. The resulting
//! [`ConnectionHandle`] allows exactly one [`Subscription`], which delivers
//! frames in arrival order over a bounded channel.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::StreamExt;
use futures::stream::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ConnectStep, Error, Result};
use crate::transport::{DiscoveredDevice, DisconnectReason, GattTarget, LinkEvent, Transport};

/// Default timeout for opening the GATT link.
const DEFAULT_LINK_TIMEOUT: Duration = Duration::from_secs(15);

/// Default timeout for primary service resolution.
const DEFAULT_SERVICE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for characteristic resolution.
const DEFAULT_CHARACTERISTIC_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for enabling notifications.
const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for the adapter capability check.
const DEFAULT_CAPABILITY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of frames buffered between the transport and the consumer.
const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Timeouts for each bring-up step.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use glucopatch_core::connection::ConnectionConfig;
///
/// let config = ConnectionConfig::default()
///     .link_timeout(Duration::from_secs(20))
///     .notify_timeout(Duration::from_secs(5));
/// assert_eq!(config.link_timeout, Duration::from_secs(20));
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Timeout for the capability check.
    pub capability_timeout: Duration,
    /// Timeout for opening the GATT link.
    pub link_timeout: Duration,
    /// Timeout for resolving the primary service.
    pub service_timeout: Duration,
    /// Timeout for resolving the characteristic.
    pub characteristic_timeout: Duration,
    /// Timeout for enabling notifications.
    pub notify_timeout: Duration,
    /// Capacity of the frame channel.
    pub channel_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            capability_timeout: DEFAULT_CAPABILITY_TIMEOUT,
            link_timeout: DEFAULT_LINK_TIMEOUT,
            service_timeout: DEFAULT_SERVICE_TIMEOUT,
            characteristic_timeout: DEFAULT_CHARACTERISTIC_TIMEOUT,
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl ConnectionConfig {
    /// Create a new connection config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the link timeout.
    #[must_use]
    pub fn link_timeout(mut self, timeout: Duration) -> Self {
        self.link_timeout = timeout;
        self
    }

    /// Set the service and characteristic resolution timeouts.
    #[must_use]
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.service_timeout = timeout;
        self.characteristic_timeout = timeout;
        self
    }

    /// Set the notification enable timeout.
    #[must_use]
    pub fn notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    /// Set the capability check timeout.
    #[must_use]
    pub fn capability_timeout(mut self, timeout: Duration) -> Self {
        self.capability_timeout = timeout;
        self
    }

    /// Set the frame channel capacity (minimum 1).
    #[must_use]
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Timeout applied to a given step, if the step has one.
    pub fn timeout_for(&self, step: ConnectStep) -> Option<Duration> {
        match step {
            ConnectStep::CapabilityCheck => Some(self.capability_timeout),
            ConnectStep::DeviceDiscovery => None,
            ConnectStep::GattConnect => Some(self.link_timeout),
            ConnectStep::ServiceLookup => Some(self.service_timeout),
            ConnectStep::CharacteristicLookup => Some(self.characteristic_timeout),
            ConnectStep::NotificationEnable => Some(self.notify_timeout),
        }
    }
}

/// Run one bring-up step under a timeout, tagging any failure with the step.
pub(crate) async fn run_step<F, R>(step: ConnectStep, limit: Duration, fut: F) -> Result<R>
where
    F: Future<Output = Result<R>>,
{
    match timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(Error::connect_failed(step, e)),
        Err(_) => Err(Error::connect_failed(
            step,
            Error::timeout(step.to_string(), limit),
        )),
    }
}

/// An open GATT link with its characteristic resolved.
///
/// A handle owns at most one notification subscription. Call
/// [`ConnectionHandle::close`] to release the link.
pub struct ConnectionHandle<T: Transport> {
    transport: Arc<T>,
    device: DiscoveredDevice,
    target: GattTarget,
    link: T::Link,
    characteristic: T::Characteristic,
    config: ConnectionConfig,
    subscribed: AtomicBool,
    closed: AtomicBool,
}

impl<T: Transport> std::fmt::Debug for ConnectionHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("device", &self.device)
            .field("target", &self.target)
            .field("subscribed", &self.subscribed.load(Ordering::Relaxed))
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Open the link, resolve the service and resolve the characteristic.
pub async fn connect_gatt<T: Transport>(
    transport: Arc<T>,
    device: DiscoveredDevice,
    target: GattTarget,
    config: ConnectionConfig,
) -> Result<ConnectionHandle<T>> {
    connect_gatt_observed(transport, device, target, config, |_| {}).await
}

/// Like [`connect_gatt`], calling `on_step` after each step that succeeds.
///
/// A failing step is reported through the returned
/// [`Error::ConnectFailed`], which names it. If the link was already open
/// when a later step fails, the link is closed before returning.
#[tracing::instrument(level = "info", skip_all, fields(device = %device.display_name()))]
pub async fn connect_gatt_observed<T, F>(
    transport: Arc<T>,
    device: DiscoveredDevice,
    target: GattTarget,
    config: ConnectionConfig,
    mut on_step: F,
) -> Result<ConnectionHandle<T>>
where
    T: Transport,
    F: FnMut(ConnectStep) + Send,
{
    info!("Opening GATT link...");
    let link = run_step(
        ConnectStep::GattConnect,
        config.link_timeout,
        transport.open_link(&device),
    )
    .await?;
    on_step(ConnectStep::GattConnect);

    let resolved = async {
        run_step(
            ConnectStep::ServiceLookup,
            config.service_timeout,
            transport.resolve_service(&link, target.service),
        )
        .await?;
        on_step(ConnectStep::ServiceLookup);

        let characteristic = run_step(
            ConnectStep::CharacteristicLookup,
            config.characteristic_timeout,
            transport.resolve_characteristic(&link, target.service, target.characteristic),
        )
        .await?;
        on_step(ConnectStep::CharacteristicLookup);
        Ok(characteristic)
    }
    .await;

    match resolved {
        Ok(characteristic) => {
            debug!(service = %target.service, characteristic = %target.characteristic, "GATT resolved");
            Ok(ConnectionHandle {
                transport,
                device,
                target,
                link,
                characteristic,
                config,
                subscribed: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            })
        }
        Err(e) => {
            if let Err(close_err) = transport.close_link(&link).await {
                debug!(error = %close_err, "Failed to close link after bring-up failure");
            }
            Err(e)
        }
    }
}

impl<T: Transport> ConnectionHandle<T> {
    /// The device this link is open to.
    pub fn device(&self) -> &DiscoveredDevice {
        &self.device
    }

    /// The service and characteristic in use.
    pub fn target(&self) -> GattTarget {
        self.target
    }

    /// Whether the one subscription has been taken.
    pub fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::SeqCst)
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Enable notifications and start forwarding them into a [`Subscription`].
    ///
    /// A handle supports one subscription for its lifetime; a second call
    /// returns [`Error::AlreadySubscribed`].
    #[tracing::instrument(level = "info", skip(self), fields(device = %self.device.display_name()))]
    pub async fn subscribe(&self) -> Result<Subscription> {
        if self.is_closed() {
            return Err(Error::NotConnected);
        }
        if self.subscribed.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadySubscribed);
        }

        let stream = match run_step(
            ConnectStep::NotificationEnable,
            self.config.notify_timeout,
            self.transport
                .enable_notifications(&self.link, &self.characteristic),
        )
        .await
        {
            Ok(stream) => stream,
            Err(e) => {
                // A failed enable does not consume the subscription.
                self.subscribed.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        info!("Notifications enabled");
        Ok(Subscription::spawn(stream, self.config.channel_capacity))
    }

    /// Close the link. Calling this more than once is a no-op.
    #[tracing::instrument(level = "info", skip(self), fields(device = %self.device.display_name()))]
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("Closing GATT link...");
        self.transport.close_link(&self.link).await
    }
}

impl<T: Transport> Drop for ConnectionHandle<T> {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) {
            warn!(
                device = %self.device.display_name(),
                "ConnectionHandle dropped without calling close()"
            );
        }
    }
}

/// The single consumer side of a notification link.
///
/// Frames arrive in the order the transport delivered them. A
/// [`LinkEvent::Disconnected`] is delivered at most once and is always the
/// last event; the channel closes after it. Dropping the subscription stops
/// the forwarding task.
pub struct Subscription {
    receiver: mpsc::Receiver<LinkEvent>,
    cancel_token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("cancelled", &self.cancel_token.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Subscription {
    fn spawn(mut stream: crate::transport::LinkEventStream, capacity: usize) -> Self {
        let (tx, receiver) = mpsc::channel(capacity);
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        debug!("Subscription cancelled");
                        return;
                    }
                    event = stream.next() => match event {
                        Some(LinkEvent::Frame(bytes)) => {
                            if tx.send(LinkEvent::Frame(bytes)).await.is_err() {
                                debug!("Subscription receiver dropped");
                                return;
                            }
                        }
                        Some(LinkEvent::Disconnected(reason)) => {
                            let _ = tx.send(LinkEvent::Disconnected(reason)).await;
                            return;
                        }
                        None => {
                            let _ = tx
                                .send(LinkEvent::Disconnected(DisconnectReason::NotificationsClosed))
                                .await;
                            return;
                        }
                    }
                }
            }
        });

        Self {
            receiver,
            cancel_token,
            task: Some(task),
        }
    }

    /// Receive the next event, or `None` once the link is gone.
    pub async fn recv(&mut self) -> Option<LinkEvent> {
        self.receiver.recv().await
    }

    /// Stop forwarding and wait for the forwarding task to finish.
    pub async fn close(&mut self) {
        self.cancel_token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    /// Whether the subscription has been closed.
    pub fn is_closed(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

impl Stream for Subscription {
    type Item = LinkEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockStep, MockTransport};
    use bytes::Bytes;

    fn device() -> DiscoveredDevice {
        DiscoveredDevice::new("MOCK-1", Some("ESP32-Test"))
    }

    #[test]
    fn test_connection_config_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.link_timeout, Duration::from_secs(15));
        assert_eq!(config.service_timeout, Duration::from_secs(10));
        assert_eq!(config.characteristic_timeout, Duration::from_secs(10));
        assert_eq!(config.notify_timeout, Duration::from_secs(10));
        assert_eq!(config.timeout_for(ConnectStep::DeviceDiscovery), None);
    }

    #[test]
    fn test_connection_config_builder() {
        let config = ConnectionConfig::new()
            .discovery_timeout(Duration::from_secs(3))
            .channel_capacity(0);
        assert_eq!(config.service_timeout, Duration::from_secs(3));
        assert_eq!(config.characteristic_timeout, Duration::from_secs(3));
        assert_eq!(config.channel_capacity, 1);
    }

    #[tokio::test]
    async fn test_connect_gatt_reports_each_step() {
        let transport = Arc::new(MockTransport::new());
        let mut steps = Vec::new();

        let handle = connect_gatt_observed(
            transport.clone(),
            device(),
            GattTarget::default(),
            ConnectionConfig::default(),
            |step| steps.push(step),
        )
        .await
        .unwrap();

        assert_eq!(
            steps,
            vec![
                ConnectStep::GattConnect,
                ConnectStep::ServiceLookup,
                ConnectStep::CharacteristicLookup
            ]
        );
        handle.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_gatt_failure_closes_link() {
        let transport = Arc::new(MockTransport::new());
        transport.fail_at(MockStep::ResolveCharacteristic, "no such characteristic");

        let err = connect_gatt(
            transport.clone(),
            device(),
            GattTarget::default(),
            ConnectionConfig::default(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.step(), Some(ConnectStep::CharacteristicLookup));
        assert_eq!(transport.open_link_count(), 1);
        assert_eq!(transport.close_link_count(), 1);
    }

    #[tokio::test]
    async fn test_connect_gatt_step_timeout() {
        let transport = Arc::new(MockTransport::new());
        transport.set_step_latency(Duration::from_millis(200));

        let config = ConnectionConfig::default().link_timeout(Duration::from_millis(20));
        let err = connect_gatt(transport, device(), GattTarget::default(), config)
            .await
            .unwrap_err();

        assert_eq!(err.step(), Some(ConnectStep::GattConnect));
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_second_subscribe_is_rejected() {
        let transport = Arc::new(MockTransport::new());
        let handle = connect_gatt(
            transport.clone(),
            device(),
            GattTarget::default(),
            ConnectionConfig::default(),
        )
        .await
        .unwrap();

        let _first = handle.subscribe().await.unwrap();
        let second = handle.subscribe().await;
        assert!(matches!(second, Err(Error::AlreadySubscribed)));
        handle.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_enable_keeps_subscription_available() {
        let transport = Arc::new(MockTransport::new());
        let handle = connect_gatt(
            transport.clone(),
            device(),
            GattTarget::default(),
            ConnectionConfig::default(),
        )
        .await
        .unwrap();

        transport.fail_at(MockStep::EnableNotifications, "CCCD write rejected");
        let err = handle.subscribe().await.unwrap_err();
        assert_eq!(err.step(), Some(ConnectStep::NotificationEnable));
        assert!(!handle.is_subscribed());

        transport.clear_failures();
        assert!(handle.subscribe().await.is_ok());
        handle.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_subscription_preserves_order_and_ends_once() {
        let transport = Arc::new(MockTransport::new());
        let handle = connect_gatt(
            transport.clone(),
            device(),
            GattTarget::default(),
            ConnectionConfig::default(),
        )
        .await
        .unwrap();
        let mut sub = handle.subscribe().await.unwrap();

        for i in 0..5u8 {
            assert!(transport.push_frame(vec![b'0' + i]));
        }
        assert!(transport.simulate_disconnect(DisconnectReason::PeripheralDisconnected));

        for i in 0..5u8 {
            assert_eq!(sub.recv().await, Some(LinkEvent::Frame(Bytes::from(vec![b'0' + i]))));
        }
        assert_eq!(
            sub.recv().await,
            Some(LinkEvent::Disconnected(DisconnectReason::PeripheralDisconnected))
        );
        assert_eq!(sub.recv().await, None);
        handle.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_subscription_close_stops_forwarding() {
        let transport = Arc::new(MockTransport::new());
        let handle = connect_gatt(
            transport.clone(),
            device(),
            GattTarget::default(),
            ConnectionConfig::default(),
        )
        .await
        .unwrap();
        let mut sub = handle.subscribe().await.unwrap();

        sub.close().await;
        assert!(sub.is_closed());
        assert_eq!(sub.recv().await, None);
        handle.close().await.unwrap();
        handle.close().await.unwrap();
        assert_eq!(transport.close_link_count(), 1);
    }
}

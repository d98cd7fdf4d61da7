//! Connection management for a single robot.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use log::{debug, error, info, trace, warn};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

use robodash_protocol::{
    codec_for, ControlParameters, DeviceProfile, FrameCodec, OperatingMode, TelemetrySnapshot,
    ValidationError,
};

use crate::error::{ConnectError, TransmitError};
use crate::events::SessionEvent;
use crate::store::TelemetryStore;
use crate::transport::{
    Characteristic, Device, DeviceFilter, NotificationStream, Transport, TransportError,
    DEFAULT_CHARACTERISTIC, DEFAULT_SERVICE,
};

/// Status shown when the platform has no wireless support.
pub const UNSUPPORTED_MESSAGE: &str = "Wireless transport is not supported on this platform.";

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "Disconnected",
            SessionState::Connecting => "Connecting",
            SessionState::Connected => "Connected",
        };
        f.write_str(name)
    }
}

/// State plus the human readable status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: SessionState,
    pub message: String,
}

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub profile: DeviceProfile,
    /// Advertised name used as the discovery filter.
    pub device_name: String,
    pub service_uuid: Uuid,
    pub characteristic_uuid: Uuid,
    /// Bound on GATT negotiation. Device selection is not included since
    /// it may wait on the user.
    pub connect_timeout: Duration,
    pub write_timeout: Option<Duration>,
    /// Capacity of the raw event channel. Raw receivers that fall this far
    /// behind skip events; callback subscriptions are not bounded by it.
    pub event_capacity: usize,
}

impl ConnectionConfig {
    pub fn for_profile(profile: DeviceProfile) -> Self {
        Self {
            profile,
            device_name: profile.default_device_name().to_string(),
            service_uuid: DEFAULT_SERVICE,
            characteristic_uuid: DEFAULT_CHARACTERISTIC,
            connect_timeout: Duration::from_secs(30),
            write_timeout: None,
            event_capacity: 64,
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::for_profile(DeviceProfile::Text)
    }
}

/// Resources held while connected.
struct Link {
    device: Arc<dyn Device>,
    characteristic: Arc<dyn Characteristic>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Link {
    /// Stop the link task and release the device. Best effort.
    async fn close(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.characteristic.stop_notifications().await {
            warn!("[Connection] Failed to stop notifications: {}", e);
        }
        self.device.disconnect().await;
        debug!("[Connection] Link to {} closed", self.device.name());
    }
}

struct Negotiated {
    characteristic: Arc<dyn Characteristic>,
    notifications: NotificationStream,
    disconnected: broadcast::Receiver<()>,
}

struct Inner {
    state: SessionState,
    message: String,
    /// Bumped on every transition; stale tasks compare against it.
    epoch: u64,
    link: Option<Link>,
    params: ControlParameters,
    subscribers: Vec<mpsc::UnboundedSender<SessionEvent>>,
}

/// Drives one device through Disconnected, Connecting and Connected.
///
/// All transitions, telemetry updates and parameter resets happen under a
/// single lock, and events are published while it is held so subscribers
/// observe them in mutation order.
pub struct Connection {
    config: ConnectionConfig,
    transport: Arc<dyn Transport>,
    codec: &'static dyn FrameCodec,
    store: TelemetryStore,
    inner: Mutex<Inner>,
    events: broadcast::Sender<SessionEvent>,
}

impl Connection {
    /// Create a new connection.
    pub fn new(config: ConnectionConfig, transport: Arc<dyn Transport>) -> Arc<Self> {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let profile = config.profile;
        Arc::new(Self {
            codec: codec_for(profile),
            store: TelemetryStore::new(profile),
            inner: Mutex::new(Inner {
                state: SessionState::Disconnected,
                message: SessionState::Disconnected.to_string(),
                epoch: 0,
                link: None,
                params: ControlParameters::defaults(profile),
                subscribers: Vec::new(),
            }),
            config,
            transport,
            events,
        })
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn codec(&self) -> &'static dyn FrameCodec {
        self.codec
    }

    /// Get the current state.
    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn status(&self) -> SessionStatus {
        let inner = self.inner.lock();
        SessionStatus {
            state: inner.state,
            message: inner.message.clone(),
        }
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.store.snapshot()
    }

    /// Pending control parameters.
    pub fn parameters(&self) -> ControlParameters {
        self.inner.lock().params
    }

    /// Replace the pending parameters with the result of `edit`.
    pub fn update_parameters<F>(&self, edit: F) -> Result<ControlParameters, ValidationError>
    where
        F: FnOnce(&ControlParameters) -> Result<ControlParameters, ValidationError>,
    {
        let mut inner = self.inner.lock();
        let params = edit(&inner.params)?;
        inner.params = params;
        Ok(params)
    }

    /// Raw event receiver. Lags if the consumer falls behind.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Lossless event queue. Closed senders are pruned on the next publish.
    pub fn subscribe_changes(&self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().subscribers.push(tx);
        rx
    }

    /// Discover the device and bring the link up.
    pub async fn connect(self: &Arc<Self>) -> Result<(), ConnectError> {
        let epoch = {
            let mut inner = self.inner.lock();
            if inner.state != SessionState::Disconnected {
                warn!("[Connection] connect() while {}", inner.state);
                return Err(ConnectError::InvalidState(inner.state));
            }
            if !self.transport.is_supported() {
                error!("[Connection] Wireless transport unavailable");
                inner.message = UNSUPPORTED_MESSAGE.to_string();
                self.publish_status(&mut inner);
                return Err(ConnectError::UnsupportedTransport);
            }
            inner.epoch += 1;
            self.transition(&mut inner, SessionState::Connecting);
            inner.epoch
        };

        info!(
            "[Connection] Requesting device {:?} ({} profile)",
            self.config.device_name, self.config.profile
        );
        let filter = DeviceFilter {
            name: self.config.device_name.clone(),
            service: self.config.service_uuid,
        };
        let device = match self.transport.request_device(&filter).await {
            Ok(device) => device,
            Err(e) => return Err(self.fail_connect(epoch, e.into())),
        };
        if !self.is_current(epoch) {
            info!("[Connection] Disconnected during device selection");
            return Err(ConnectError::Aborted);
        }

        debug!("[Connection] Negotiating with {} (timeout {:?})", device.name(), self.config.connect_timeout);
        let negotiated = match tokio::time::timeout(
            self.config.connect_timeout,
            negotiate(device.as_ref(), &self.config),
        )
        .await
        {
            Ok(Ok(negotiated)) => negotiated,
            Ok(Err(e)) => {
                device.disconnect().await;
                return Err(self.fail_connect(epoch, e.into()));
            }
            Err(_) => {
                device.disconnect().await;
                return Err(self.fail_connect(epoch, ConnectError::Timeout));
            }
        };

        let Negotiated {
            characteristic,
            notifications,
            disconnected,
        } = negotiated;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let link = Link {
            device: Arc::clone(&device),
            characteristic,
            shutdown: Some(shutdown_tx),
        };

        let rejected = {
            let mut inner = self.inner.lock();
            if inner.epoch == epoch {
                inner.link = Some(link);
                tokio::spawn(link_task(
                    Arc::downgrade(self),
                    epoch,
                    notifications,
                    disconnected,
                    shutdown_rx,
                ));
                self.transition(&mut inner, SessionState::Connected);
                None
            } else {
                Some(link)
            }
        };

        if let Some(link) = rejected {
            info!("[Connection] Disconnected while connecting, dropping link");
            link.close().await;
            return Err(ConnectError::Aborted);
        }

        info!("[Connection] Connected to {}", device.name());
        Ok(())
    }

    /// Tear the session down. Safe to call in any state.
    pub async fn disconnect(&self) {
        let link = {
            let mut inner = self.inner.lock();
            if inner.state == SessionState::Disconnected {
                debug!("[Connection] disconnect() while already disconnected");
                return;
            }
            info!("[Connection] Disconnecting (was {})", inner.state);
            self.teardown(&mut inner)
        };

        if let Some(link) = link {
            link.close().await;
        }
    }

    /// Write one frame to the device.
    ///
    /// Does nothing unless connected. There is no write queue, so
    /// overlapping calls may overlap at the transport.
    pub async fn send(&self, frame: Bytes) -> Result<(), TransmitError> {
        self.send_tracked(frame).await.map(|_| ())
    }

    /// Like [`Connection::send`], returning the epoch of the link that
    /// acknowledged the write, or `None` if nothing was written.
    pub async fn send_tracked(&self, frame: Bytes) -> Result<Option<u64>, TransmitError> {
        let (characteristic, epoch) = {
            let inner = self.inner.lock();
            match (&inner.link, inner.state) {
                (Some(link), SessionState::Connected) => {
                    (Arc::clone(&link.characteristic), inner.epoch)
                }
                _ => {
                    debug!("[Connection] Not connected, dropping {} byte write", frame.len());
                    return Ok(None);
                }
            }
        };

        trace!("[Connection] Writing {:02x?}", &frame[..]);
        let write = characteristic.write_value(&frame);
        let result = match self.config.write_timeout {
            Some(limit) => tokio::time::timeout(limit, write)
                .await
                .unwrap_or(Err(TransportError::Timeout)),
            None => write.await,
        };

        if let Err(e) = result {
            let err = TransmitError(e);
            error!("[Connection] {}", err);
            let mut inner = self.inner.lock();
            if inner.epoch == epoch {
                inner.message = format!("Error: {}", err);
                self.publish_status(&mut inner);
            }
            return Err(err);
        }
        Ok(Some(epoch))
    }

    /// Reflect a mode change acknowledged on link `epoch` in the snapshot.
    pub fn apply_local_mode(&self, epoch: u64, mode: OperatingMode) {
        let mut inner = self.inner.lock();
        if inner.epoch != epoch || inner.state != SessionState::Connected {
            debug!("[Connection] Mode ack from stale link ignored");
            return;
        }
        if let Some(snapshot) = self.store.set_mode(mode) {
            self.publish(&mut inner, SessionEvent::Telemetry(snapshot));
        }
    }

    fn apply_frame(&self, epoch: u64, frame: &[u8]) {
        let event = match self.codec.decode_frame(frame) {
            Ok(event) => event,
            Err(e) => {
                warn!("[Connection] Dropping {} byte frame: {}", frame.len(), e);
                return;
            }
        };

        let mut inner = self.inner.lock();
        if inner.epoch != epoch || inner.state != SessionState::Connected {
            trace!("[Connection] Dropping frame from stale link");
            return;
        }
        if let Some(snapshot) = self.store.apply(&event) {
            self.publish(&mut inner, SessionEvent::Telemetry(snapshot));
        }
    }

    /// Tear down after the link went away underneath us. The returned link
    /// still has to be closed, since the device may consider itself
    /// connected when only the notification stream ended.
    fn handle_link_lost(&self, epoch: u64) -> Option<Link> {
        let mut inner = self.inner.lock();
        if inner.epoch != epoch || inner.state != SessionState::Connected {
            return None;
        }
        warn!("[Connection] Link to {} lost", self.config.device_name);
        self.teardown(&mut inner)
    }

    fn fail_connect(&self, epoch: u64, err: ConnectError) -> ConnectError {
        let mut inner = self.inner.lock();
        if inner.epoch != epoch {
            info!("[Connection] Connect failed after disconnect: {}", err);
            return ConnectError::Aborted;
        }
        error!("[Connection] Connect failed: {}", err);
        inner.epoch += 1;
        inner.state = SessionState::Disconnected;
        inner.message = format!("Error: {}", err);
        self.publish_status(&mut inner);
        err
    }

    /// Reset to Disconnected, parameters to defaults and telemetry to zero.
    fn teardown(&self, inner: &mut Inner) -> Option<Link> {
        inner.epoch += 1;
        let link = inner.link.take();
        inner.params = ControlParameters::defaults(self.config.profile);
        let zero = self.store.reset();
        self.transition(inner, SessionState::Disconnected);
        self.publish(inner, SessionEvent::Telemetry(zero));
        link
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.inner.lock().epoch == epoch
    }

    fn transition(&self, inner: &mut Inner, state: SessionState) {
        debug!("[Connection] {} -> {}", inner.state, state);
        inner.state = state;
        inner.message = state.to_string();
        self.publish_status(inner);
    }

    fn publish_status(&self, inner: &mut Inner) {
        let status = SessionStatus {
            state: inner.state,
            message: inner.message.clone(),
        };
        self.publish(inner, SessionEvent::Status(status));
    }

    /// Must be called with the state lock held so every receiver sees
    /// events in mutation order.
    fn publish(&self, inner: &mut Inner, event: SessionEvent) {
        inner.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        let _ = self.events.send(event);
    }
}

/// Resolve the service and characteristic and start notifications.
async fn negotiate(
    device: &dyn Device,
    config: &ConnectionConfig,
) -> Result<Negotiated, TransportError> {
    // Subscribe first so a drop during negotiation is not missed.
    let disconnected = device.disconnected();
    let server = device.connect().await?;
    let service = server.primary_service(config.service_uuid).await?;
    let characteristic = service.characteristic(config.characteristic_uuid).await?;
    let notifications = characteristic.start_notifications().await?;
    Ok(Negotiated {
        characteristic,
        notifications,
        disconnected,
    })
}

/// Background task routing notifications and the disconnect event.
async fn link_task(
    conn: Weak<Connection>,
    epoch: u64,
    mut notifications: NotificationStream,
    mut disconnected: broadcast::Receiver<()>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                debug!("[Connection] Link task shutting down");
                return;
            }

            _ = disconnected.recv() => {
                info!("[Connection] Device reported disconnect");
                break;
            }

            frame = notifications.next() => {
                let Some(conn) = conn.upgrade() else { return };
                match frame {
                    Some(frame) => conn.apply_frame(epoch, &frame),
                    None => {
                        info!("[Connection] Notification stream ended");
                        break;
                    }
                }
            }
        }
    }

    let Some(conn) = conn.upgrade() else { return };
    let link = conn.handle_link_lost(epoch);
    drop(conn);
    if let Some(link) = link {
        link.close().await;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(link) = self.inner.get_mut().link.take() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(link.close());
                }
                Err(_) => debug!("[Connection] No runtime, dropping link without closing"),
            }
        }
    }
}

//! In-memory loopback transport.
//!
//! Plays the part of the wireless stack and the device firmware at once:
//! frames written by the session are recorded, and telemetry can be pushed
//! back as notifications. Failure modes (user cancellation, missing device,
//! negotiation and write errors, unsolicited disconnects) can be armed
//! per peripheral.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc;
use futures::StreamExt;
use log::{debug, trace};
use parking_lot::Mutex;
use tokio::sync::{broadcast, Notify};
use uuid::Uuid;

use robodash_protocol::{codec_for, DeviceProfile, TelemetryEvent};

use super::{
    Characteristic, Device, DeviceFilter, GattServer, NotificationStream, Service, Transport,
    TransportError, DEFAULT_CHARACTERISTIC, DEFAULT_SERVICE,
};

/// Transport backed by a list of simulated peripherals.
pub struct MemoryTransport {
    supported: bool,
    peripherals: Mutex<Vec<MemoryPeripheral>>,
    cancel_next: AtomicBool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            supported: true,
            peripherals: Mutex::new(Vec::new()),
            cancel_next: AtomicBool::new(false),
        }
    }

    /// A transport reporting that the platform lacks wireless support.
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new()
        }
    }

    /// Make a peripheral discoverable.
    pub fn add_peripheral(&self, peripheral: MemoryPeripheral) {
        self.peripherals.lock().push(peripheral);
    }

    /// The next discovery behaves as if the user dismissed the chooser.
    pub fn cancel_next_request(&self) {
        self.cancel_next.store(true, Ordering::SeqCst);
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn request_device(&self, filter: &DeviceFilter) -> Result<Arc<dyn Device>, TransportError> {
        if !self.supported {
            return Err(TransportError::Unsupported);
        }
        if self.cancel_next.swap(false, Ordering::SeqCst) {
            debug!("[MemoryTransport] Device request cancelled");
            return Err(TransportError::Cancelled);
        }

        let peripherals = self.peripherals.lock();
        peripherals
            .iter()
            .find(|p| p.inner.name == filter.name && p.inner.service == filter.service)
            .map(|p| Arc::new(p.clone()) as Arc<dyn Device>)
            .ok_or_else(|| TransportError::DeviceNotFound(filter.name.clone()))
    }
}

/// A simulated device exposing one service with one characteristic.
///
/// Clones share state, so a test can keep a handle while the session owns
/// another.
#[derive(Clone)]
pub struct MemoryPeripheral {
    inner: Arc<PeripheralInner>,
}

struct PeripheralInner {
    name: String,
    service: Uuid,
    characteristic: Uuid,
    connected: AtomicBool,
    notify_tx: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
    disconnect_tx: broadcast::Sender<()>,
    writes: Mutex<Vec<Bytes>>,
    write_failure: Mutex<Option<String>>,
    stall_writes: AtomicBool,
    connect_failure: Mutex<Option<String>>,
    connect_gate: Mutex<Option<Arc<Notify>>>,
}

impl MemoryPeripheral {
    /// Peripheral advertising `name` with the default service and characteristic.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_ids(name, DEFAULT_SERVICE, DEFAULT_CHARACTERISTIC)
    }

    /// Peripheral advertising the default name of `profile`.
    pub fn for_profile(profile: DeviceProfile) -> Self {
        Self::new(profile.default_device_name())
    }

    pub fn with_ids(name: impl Into<String>, service: Uuid, characteristic: Uuid) -> Self {
        let (disconnect_tx, _) = broadcast::channel(1);
        Self {
            inner: Arc::new(PeripheralInner {
                name: name.into(),
                service,
                characteristic,
                connected: AtomicBool::new(false),
                notify_tx: Mutex::new(None),
                disconnect_tx,
                writes: Mutex::new(Vec::new()),
                write_failure: Mutex::new(None),
                stall_writes: AtomicBool::new(false),
                connect_failure: Mutex::new(None),
                connect_gate: Mutex::new(None),
            }),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    pub fn is_notifying(&self) -> bool {
        self.inner.notify_tx.lock().is_some()
    }

    /// Push a notification payload. Returns false if nobody is listening.
    pub fn notify(&self, frame: impl Into<Bytes>) -> bool {
        match self.inner.notify_tx.lock().as_ref() {
            Some(tx) => tx.unbounded_send(frame.into()).is_ok(),
            None => false,
        }
    }

    /// Push `event` encoded the way the firmware for its profile would.
    pub fn notify_event(&self, event: &TelemetryEvent) -> bool {
        match codec_for(event.profile()).encode_telemetry(event) {
            Ok(frame) => self.notify(frame),
            Err(e) => {
                debug!("[MemoryPeripheral] Cannot encode {:?}: {}", event, e);
                false
            }
        }
    }

    /// Simulate the device powering off or going out of range.
    pub fn drop_link(&self) {
        debug!("[MemoryPeripheral] {} link dropped", self.inner.name);
        self.sever();
    }

    /// Frames written so far, in order.
    pub fn writes(&self) -> Vec<Bytes> {
        self.inner.writes.lock().clone()
    }

    /// Make every following write fail with `reason` (or succeed with `None`).
    pub fn fail_writes(&self, reason: Option<&str>) {
        *self.inner.write_failure.lock() = reason.map(str::to_string);
    }

    /// While set, writes never complete.
    pub fn stall_writes(&self, stall: bool) {
        self.inner.stall_writes.store(stall, Ordering::SeqCst);
    }

    /// Make GATT connection fail with `reason` (or succeed with `None`).
    pub fn fail_connect(&self, reason: Option<&str>) {
        *self.inner.connect_failure.lock() = reason.map(str::to_string);
    }

    /// Hold GATT connection until the returned gate is notified.
    pub fn gate_connect(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.inner.connect_gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    fn sever(&self) {
        if self.inner.connected.swap(false, Ordering::SeqCst) {
            *self.inner.notify_tx.lock() = None;
            let _ = self.inner.disconnect_tx.send(());
        }
    }

    fn ensure_connected(&self) -> Result<(), TransportError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(TransportError::Disconnected)
        }
    }
}

#[async_trait]
impl Device for MemoryPeripheral {
    fn name(&self) -> String {
        self.inner.name.clone()
    }

    async fn connect(&self) -> Result<Arc<dyn GattServer>, TransportError> {
        let gate = self.inner.connect_gate.lock().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if let Some(reason) = self.inner.connect_failure.lock().clone() {
            return Err(TransportError::Gatt(reason));
        }

        self.inner.connected.store(true, Ordering::SeqCst);
        Ok(Arc::new(self.clone()))
    }

    fn disconnected(&self) -> broadcast::Receiver<()> {
        self.inner.disconnect_tx.subscribe()
    }

    async fn disconnect(&self) {
        self.sever();
    }
}

#[async_trait]
impl GattServer for MemoryPeripheral {
    async fn primary_service(&self, uuid: Uuid) -> Result<Arc<dyn Service>, TransportError> {
        self.ensure_connected()?;
        if uuid != self.inner.service {
            return Err(TransportError::ServiceNotFound(uuid));
        }
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl Service for MemoryPeripheral {
    async fn characteristic(&self, uuid: Uuid) -> Result<Arc<dyn Characteristic>, TransportError> {
        self.ensure_connected()?;
        if uuid != self.inner.characteristic {
            return Err(TransportError::CharacteristicNotFound(uuid));
        }
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl Characteristic for MemoryPeripheral {
    async fn start_notifications(&self) -> Result<NotificationStream, TransportError> {
        self.ensure_connected()?;
        let (tx, rx) = mpsc::unbounded();
        *self.inner.notify_tx.lock() = Some(tx);
        Ok(rx.boxed())
    }

    async fn stop_notifications(&self) -> Result<(), TransportError> {
        *self.inner.notify_tx.lock() = None;
        Ok(())
    }

    async fn write_value(&self, value: &[u8]) -> Result<(), TransportError> {
        self.ensure_connected()?;
        if let Some(reason) = self.inner.write_failure.lock().clone() {
            return Err(TransportError::WriteFailed(reason));
        }
        if self.inner.stall_writes.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }
        trace!("[MemoryPeripheral] write {} bytes", value.len());
        self.inner.writes.lock().push(Bytes::copy_from_slice(value));
        Ok(())
    }
}

//! Transport collaborator: the platform wireless stack.
//!
//! The session layer only needs a handful of GATT style operations:
//! discovery by advertised name, connecting to the device's server,
//! resolving the service and characteristic, notifications, writes and a
//! disconnect event. Each step is a trait so a platform backend (or the
//! in-memory [`memory`] transport) can be plugged in.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

pub use memory::{MemoryPeripheral, MemoryTransport};

/// Service exposed by both firmware profiles.
pub const DEFAULT_SERVICE: Uuid = Uuid::from_u128(0x4fafc201_1fb5_459e_8fcc_c5c9c331914b);

/// The read/write/notify characteristic inside [`DEFAULT_SERVICE`].
pub const DEFAULT_CHARACTERISTIC: Uuid = Uuid::from_u128(0xbeb5483e_36e1_4688_b7f5_ea07361b26a8);

/// Stream of raw notification payloads from a characteristic.
pub type NotificationStream = BoxStream<'static, Bytes>;

/// Which device to pick during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFilter {
    /// Exact advertised name.
    pub name: String,
    /// Service the device must expose.
    pub service: Uuid,
}

/// Errors raised by a transport backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The platform lacks the wireless capability.
    #[error("Wireless transport is not supported on this platform")]
    Unsupported,

    /// The user dismissed the device chooser.
    #[error("Device selection cancelled by user")]
    Cancelled,

    /// No device matched the filter.
    #[error("No device named {0:?} found")]
    DeviceNotFound(String),

    #[error("Service {0} not found")]
    ServiceNotFound(Uuid),

    #[error("Characteristic {0} not found")]
    CharacteristicNotFound(Uuid),

    /// Generic GATT failure during negotiation.
    #[error("GATT operation failed: {0}")]
    Gatt(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Operation timed out")]
    Timeout,

    /// The device is no longer connected.
    #[error("Device disconnected")]
    Disconnected,
}

/// Entry point of a wireless backend.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether the platform provides the capability at all.
    fn is_supported(&self) -> bool;

    /// Discover a device matching `filter`. May involve user interaction.
    async fn request_device(&self, filter: &DeviceFilter) -> Result<Arc<dyn Device>, TransportError>;
}

/// A discovered device.
#[async_trait]
pub trait Device: Send + Sync {
    fn name(&self) -> String;

    /// Connect to the device's GATT server.
    async fn connect(&self) -> Result<Arc<dyn GattServer>, TransportError>;

    /// Disconnect event. Fires once per lost connection, whoever caused it.
    fn disconnected(&self) -> broadcast::Receiver<()>;

    /// Drop the connection. Best effort, never fails.
    async fn disconnect(&self);
}

#[async_trait]
pub trait GattServer: Send + Sync {
    async fn primary_service(&self, uuid: Uuid) -> Result<Arc<dyn Service>, TransportError>;
}

#[async_trait]
pub trait Service: Send + Sync {
    async fn characteristic(&self, uuid: Uuid) -> Result<Arc<dyn Characteristic>, TransportError>;
}

/// The single read/write/notify characteristic carrying all traffic.
#[async_trait]
pub trait Characteristic: Send + Sync {
    async fn start_notifications(&self) -> Result<NotificationStream, TransportError>;

    async fn stop_notifications(&self) -> Result<(), TransportError>;

    /// Write one frame and wait for the transport to acknowledge it.
    async fn write_value(&self, value: &[u8]) -> Result<(), TransportError>;
}

//! Error types for the session layer.

use std::path::PathBuf;

use thiserror::Error;

use robodash_protocol::{EncodeError, ValidationError};

use crate::client::SessionState;
use crate::transport::TransportError;

/// Connecting to the device failed. The session is back in `Disconnected`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// The platform lacks the wireless capability. Retrying will not help.
    #[error("Wireless transport is not supported on this platform")]
    UnsupportedTransport,

    /// The user dismissed device selection.
    #[error("Device selection cancelled")]
    Cancelled,

    /// No device matched the configured name filter.
    #[error("No matching device found: {0}")]
    DeviceNotFound(String),

    /// GATT negotiation failed after the device was found.
    #[error("Negotiation failed: {0}")]
    NegotiationFailed(String),

    /// GATT negotiation did not finish within the connect timeout.
    #[error("Connection timed out")]
    Timeout,

    /// `disconnect()` was called while the connection was being set up.
    #[error("Connection aborted by disconnect")]
    Aborted,

    /// `connect()` is only valid from `Disconnected`.
    #[error("Cannot connect while {0}")]
    InvalidState(SessionState),
}

impl From<TransportError> for ConnectError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Unsupported => ConnectError::UnsupportedTransport,
            TransportError::Cancelled => ConnectError::Cancelled,
            TransportError::DeviceNotFound(name) => ConnectError::DeviceNotFound(name),
            TransportError::Timeout => ConnectError::Timeout,
            other => ConnectError::NegotiationFailed(other.to_string()),
        }
    }
}

/// A write to the device failed. The connection state is unaffected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Transmit failed: {0}")]
pub struct TransmitError(#[from] pub TransportError);

/// Any failure surfaced by the [`Session`](crate::Session) facade.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Transmit(#[from] TransmitError),

    /// The command is not part of the device profile.
    #[error(transparent)]
    Unsupported(#[from] EncodeError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Configuration could not be loaded.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

//! Client side of the device link.

pub mod connection;

pub use connection::{
    Connection, ConnectionConfig, SessionState, SessionStatus, UNSUPPORTED_MESSAGE,
};

//! Device session layer for the robodash robot dashboard.
//!
//! Owns the wireless link to one robot: discovery and connection through a
//! [`Transport`], decoding of inbound telemetry, validation and transmission
//! of operator commands, and change notifications for the Presentation Layer.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use robodash_protocol::{DeviceProfile, Movement, OperatingMode};
//! use robodash_session::{ConnectionConfig, MemoryPeripheral, MemoryTransport, Session};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), robodash_session::SessionError> {
//! let transport = Arc::new(MemoryTransport::new());
//! let robot = MemoryPeripheral::for_profile(DeviceProfile::Text);
//! transport.add_peripheral(robot.clone());
//!
//! let session = Session::new(ConnectionConfig::for_profile(DeviceProfile::Text), transport);
//! let _subscription = session.subscribe(
//!     |telemetry| println!("telemetry: {:?}", telemetry),
//!     |status| println!("status: {}", status.message),
//! );
//!
//! session.connect().await?;
//! session.set_mode(OperatingMode::Control).await?;
//! session.send_movement(Movement::Forward).await?;
//! assert_eq!(&robot.writes()[1][..], b"CMD:FWD");
//!
//! session.disconnect().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod session;
pub mod store;
pub mod transport;

pub use client::{ConnectionConfig, SessionState, SessionStatus};
pub use config::{load_config, DashboardConfig, LoggingConfig};
pub use error::{ConfigError, ConnectError, SessionError, TransmitError};
pub use events::{SessionEvent, Subscription};
pub use logging::init_logging;
pub use session::Session;
pub use store::TelemetryStore;
pub use transport::{MemoryPeripheral, MemoryTransport, Transport, TransportError};

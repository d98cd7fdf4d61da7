//! The session facade used by the Presentation Layer.

use std::sync::Arc;

use log::{debug, info};
use tokio::sync::broadcast;

use robodash_protocol::{
    Command, ControlParameters, DeviceProfile, Movement, OperatingMode, ParameterKey,
    TelemetrySnapshot,
};

use crate::client::{Connection, ConnectionConfig, SessionState, SessionStatus};
use crate::error::SessionError;
use crate::events::{SessionEvent, Subscription};
use crate::transport::Transport;

/// One logical session with one robot.
///
/// The device profile is fixed for the lifetime of the session. Editing
/// parameters never transmits; [`Session::send_control_values`] does.
pub struct Session {
    connection: Arc<Connection>,
}

impl Session {
    pub fn new(config: ConnectionConfig, transport: Arc<dyn Transport>) -> Self {
        info!(
            "[Session] Created for {} profile, device {:?}",
            config.profile, config.device_name
        );
        Self {
            connection: Connection::new(config, transport),
        }
    }

    pub fn profile(&self) -> DeviceProfile {
        self.connection.config().profile
    }

    pub fn state(&self) -> SessionState {
        self.connection.state()
    }

    pub fn status(&self) -> SessionStatus {
        self.connection.status()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.connection.snapshot()
    }

    /// Pending (not necessarily transmitted) control parameters.
    pub fn parameters(&self) -> ControlParameters {
        self.connection.parameters()
    }

    pub async fn connect(&self) -> Result<(), SessionError> {
        self.connection.connect().await?;
        Ok(())
    }

    pub async fn disconnect(&self) {
        self.connection.disconnect().await;
    }

    /// Apply raw operator input to one parameter.
    ///
    /// Input that does not parse as a number is discarded and the previous
    /// value kept.
    pub fn update_parameter(
        &self,
        key: ParameterKey,
        raw: &str,
    ) -> Result<ControlParameters, SessionError> {
        let mut unchanged = false;
        let params = self.connection.update_parameters(|p| {
            let next = p.set_parameter(key, raw)?;
            unchanged = next == *p;
            Ok(next)
        })?;
        if unchanged {
            debug!("[Session] Input {:?} left {} unchanged", raw, key);
        }
        Ok(params)
    }

    /// Typed variant of [`Session::update_parameter`], e.g. for sliders.
    pub fn set_parameter_value(
        &self,
        key: ParameterKey,
        value: f64,
    ) -> Result<ControlParameters, SessionError> {
        Ok(self.connection.update_parameters(|p| p.set_value(key, value))?)
    }

    /// Transmit the pending parameters. Stops at the first failed write.
    pub async fn send_control_values(&self) -> Result<(), SessionError> {
        let params = self.connection.parameters();
        for command in params.commands() {
            self.send_command(&command).await?;
        }
        Ok(())
    }

    /// Switch the balancing robot between balancing and control mode.
    ///
    /// The snapshot reflects the new mode as soon as the write is
    /// acknowledged, before the device reports it back.
    pub async fn set_mode(&self, mode: OperatingMode) -> Result<(), SessionError> {
        let frame = self.connection.codec().encode_command(&Command::Mode(mode))?;
        debug!("[Session] Switching to {:?}", mode);
        if let Some(epoch) = self.connection.send_tracked(frame).await? {
            self.connection.apply_local_mode(epoch, mode);
        }
        Ok(())
    }

    /// Send a one-shot movement command.
    pub async fn send_movement(&self, movement: Movement) -> Result<(), SessionError> {
        self.send_command(&Command::Move(movement)).await
    }

    /// Whether movement inputs should be offered to the operator.
    ///
    /// The balancing robot only accepts movement in control mode.
    pub fn movement_enabled(&self) -> bool {
        if self.state() != SessionState::Connected {
            return false;
        }
        match self.profile() {
            DeviceProfile::Text => {
                self.snapshot().operating_mode() == Some(OperatingMode::Control)
            }
            DeviceProfile::Binary => true,
        }
    }

    /// Register change callbacks. Dropping the returned guard removes them.
    pub fn subscribe<T, S>(&self, on_telemetry: T, on_status: S) -> Subscription
    where
        T: FnMut(TelemetrySnapshot) + Send + 'static,
        S: FnMut(SessionStatus) + Send + 'static,
    {
        Subscription::spawn(self.connection.subscribe_changes(), on_telemetry, on_status)
    }

    /// Raw event stream for async consumers. Unlike [`Session::subscribe`],
    /// a receiver more than `event_capacity` events behind skips ahead.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.connection.subscribe()
    }

    async fn send_command(&self, command: &Command) -> Result<(), SessionError> {
        let frame = self.connection.codec().encode_command(command)?;
        debug!("[Session] Sending {} ({} bytes)", command.name(), frame.len());
        self.connection.send(frame).await?;
        Ok(())
    }
}

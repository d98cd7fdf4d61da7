//! Latest telemetry snapshot of a session.

use parking_lot::Mutex;

use robodash_protocol::{
    DeviceProfile, OperatingMode, TelemetryEvent, TelemetrySnapshot,
};

/// Holds the most recent decoded telemetry. No history is kept.
///
/// Writers are serialized by the connection state lock; readers may call
/// [`TelemetryStore::snapshot`] at any time.
pub struct TelemetryStore {
    profile: DeviceProfile,
    snapshot: Mutex<TelemetrySnapshot>,
}

impl TelemetryStore {
    pub fn new(profile: DeviceProfile) -> Self {
        Self {
            profile,
            snapshot: Mutex::new(TelemetrySnapshot::zero(profile)),
        }
    }

    pub fn profile(&self) -> DeviceProfile {
        self.profile
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        *self.snapshot.lock()
    }

    /// Fold a decoded frame into the snapshot.
    ///
    /// Text frames replace the snapshot wholesale; binary RPM and IMU frames
    /// each update their half. Returns the new snapshot, or `None` if the
    /// event does not belong to this profile.
    pub fn apply(&self, event: &TelemetryEvent) -> Option<TelemetrySnapshot> {
        let mut snapshot = self.snapshot.lock();
        match (&mut *snapshot, event) {
            (TelemetrySnapshot::Balance(current), TelemetryEvent::Balance(next)) => {
                *current = *next;
            }
            (TelemetrySnapshot::Motor(current), TelemetryEvent::WheelRpm(rpm)) => {
                current.rpm = *rpm;
            }
            (TelemetrySnapshot::Motor(current), TelemetryEvent::Imu(imu)) => {
                current.imu = *imu;
            }
            _ => return None,
        }
        Some(*snapshot)
    }

    /// Record a mode change acknowledged by the transport.
    pub fn set_mode(&self, mode: OperatingMode) -> Option<TelemetrySnapshot> {
        let mut snapshot = self.snapshot.lock();
        match &mut *snapshot {
            TelemetrySnapshot::Balance(current) => {
                current.mode = mode.as_raw();
                Some(*snapshot)
            }
            TelemetrySnapshot::Motor(_) => None,
        }
    }

    /// Return to the zero value.
    pub fn reset(&self) -> TelemetrySnapshot {
        let zero = TelemetrySnapshot::zero(self.profile);
        *self.snapshot.lock() = zero;
        zero
    }
}

//! Message type definitions for the robodash wire protocols.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Default service identifier shared by both device profiles.
pub const DEFAULT_SERVICE_UUID: &str = "4fafc201-1fb5-459e-8fcc-c5c9c331914b";

/// Default read/write/notify characteristic identifier carrying all traffic.
pub const DEFAULT_CHARACTERISTIC_UUID: &str = "beb5483e-36e1-4688-b7f5-ea07361b26a8";

/// Binary frame tags (first byte of every binary frame).
pub mod tag {
    /// Device → dashboard: left/right wheel RPM pair.
    pub const WHEEL_RPM: u8 = 0x01;
    /// Device → dashboard: 6-axis IMU sample.
    pub const IMU: u8 = 0x02;
    /// Dashboard → device: speed as PWM duty (0-255).
    pub const SPEED: u8 = 0x01;
    /// Dashboard → device: PID gains scaled by 1000.
    pub const GAINS: u8 = 0x02;
    /// Dashboard → device: movement direction code.
    pub const MOVE: u8 = 0x03;
}

/// Total frame length (tag included) of a binary RPM frame.
pub const WHEEL_RPM_FRAME_LEN: usize = 5;

/// Total frame length (tag included) of a binary IMU frame.
pub const IMU_FRAME_LEN: usize = 13;

/// Number of comma separated fields in a text telemetry frame.
pub const TEXT_FIELD_COUNT: usize = 9;

/// Wire format and command vocabulary spoken by a device firmware.
///
/// - `Text`: the self-balancing robot. Comma separated ASCII frames.
/// - `Binary`: the motor controller. Tagged big-endian binary frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceProfile {
    #[default]
    #[serde(alias = "balancing")]
    Text,
    #[serde(alias = "motor")]
    Binary,
}

impl DeviceProfile {
    /// Name the device advertises by default.
    pub fn default_device_name(&self) -> &'static str {
        match self {
            DeviceProfile::Text => "SelfBalancingRobot",
            DeviceProfile::Binary => "MotorControl",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DeviceProfile::Text => "text",
            DeviceProfile::Binary => "binary",
        }
    }
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DeviceProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "balancing" => Ok(DeviceProfile::Text),
            "binary" | "motor" => Ok(DeviceProfile::Binary),
            other => Err(format!("unknown device profile: {other}")),
        }
    }
}

/// Operating mode of the balancing robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum OperatingMode {
    /// Self-balancing in place.
    Balancing = 0,
    /// Accepts movement commands.
    Control = 1,
}

impl OperatingMode {
    /// Map the raw mode value reported by telemetry.
    pub fn from_raw(value: i32) -> Option<Self> {
        match value {
            0 => Some(OperatingMode::Balancing),
            1 => Some(OperatingMode::Control),
            _ => None,
        }
    }

    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

/// Movement request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Movement {
    Forward,
    Backward,
    Left,
    Right,
    Stop,
}

impl Movement {
    /// Token used by the text protocol (`CMD:<token>`).
    pub fn token(&self) -> &'static str {
        match self {
            Movement::Forward => "FWD",
            Movement::Backward => "BWD",
            Movement::Left => "LEFT",
            Movement::Right => "RIGHT",
            Movement::Stop => "STOP",
        }
    }

    /// Direction code used by the binary protocol (`[0x03, code]`).
    pub fn direction_code(&self) -> u8 {
        match self {
            Movement::Stop => 0,
            Movement::Forward => 1,
            Movement::Backward => 2,
            Movement::Left => 3,
            Movement::Right => 4,
        }
    }
}

impl FromStr for Movement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FWD" | "FORWARD" => Ok(Movement::Forward),
            "BWD" | "BACKWARD" => Ok(Movement::Backward),
            "LEFT" => Ok(Movement::Left),
            "RIGHT" => Ok(Movement::Right),
            "STOP" => Ok(Movement::Stop),
            other => Err(format!("unknown movement: {other}")),
        }
    }
}

/// Commands sent from the dashboard to the device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Balancing loop gains and tilt setpoint (text profile).
    Tuning {
        kp: f64,
        ki: f64,
        kd: f64,
        setpoint: f64,
    },
    /// Target speed in percent (binary profile).
    Speed(f64),
    /// Motor PID gains (binary profile).
    Gains { kp: f64, ki: f64, kd: f64 },
    /// Operating mode selection (text profile).
    Mode(OperatingMode),
    /// Movement request (both profiles).
    Move(Movement),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Tuning { .. } => "Tuning",
            Command::Speed(_) => "Speed",
            Command::Gains { .. } => "Gains",
            Command::Mode(_) => "Mode",
            Command::Move(_) => "Move",
        }
    }
}

/// Full sensor/state frame of the balancing robot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceTelemetry {
    /// Acceleration x/y/z (g).
    pub acc: [f64; 3],
    /// Angular rate x/y/z (deg/s).
    pub gyro: [f64; 3],
    /// Tilt angle (deg).
    pub angle: f64,
    /// Motor PWM.
    pub motor_speed: i32,
    /// Raw operating mode, see [`OperatingMode::from_raw`].
    pub mode: i32,
}

impl BalanceTelemetry {
    pub fn operating_mode(&self) -> Option<OperatingMode> {
        OperatingMode::from_raw(self.mode)
    }
}

/// Wheel speeds reported by the motor controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WheelRpm {
    pub left: u16,
    pub right: u16,
}

/// Raw 6-axis IMU sample reported by the motor controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImuSample {
    pub ax: u16,
    pub ay: u16,
    pub az: u16,
    pub gx: u16,
    pub gy: u16,
    pub gz: u16,
}

impl ImuSample {
    /// Yaw rate in deg/s; the firmware reports `gz` in hundredths.
    pub fn yaw_rate(&self) -> f64 {
        f64::from(self.gz) / 100.0
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TelemetryEvent {
    Balance(BalanceTelemetry),
    WheelRpm(WheelRpm),
    Imu(ImuSample),
}

impl TelemetryEvent {
    /// Profile whose devices send this kind of frame.
    pub fn profile(&self) -> DeviceProfile {
        match self {
            TelemetryEvent::Balance(_) => DeviceProfile::Text,
            TelemetryEvent::WheelRpm(_) | TelemetryEvent::Imu(_) => DeviceProfile::Binary,
        }
    }
}

/// Latest known motor controller state, merged across frame tags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotorTelemetry {
    pub rpm: WheelRpm,
    pub imu: ImuSample,
}

/// Latest decoded telemetry of a session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TelemetrySnapshot {
    Balance(BalanceTelemetry),
    Motor(MotorTelemetry),
}

impl TelemetrySnapshot {
    /// Zero value a session starts from and returns to on disconnect.
    pub fn zero(profile: DeviceProfile) -> Self {
        match profile {
            DeviceProfile::Text => TelemetrySnapshot::Balance(BalanceTelemetry::default()),
            DeviceProfile::Binary => TelemetrySnapshot::Motor(MotorTelemetry::default()),
        }
    }

    pub fn profile(&self) -> DeviceProfile {
        match self {
            TelemetrySnapshot::Balance(_) => DeviceProfile::Text,
            TelemetrySnapshot::Motor(_) => DeviceProfile::Binary,
        }
    }

    /// Operating mode, for profiles that report one.
    pub fn operating_mode(&self) -> Option<OperatingMode> {
        match self {
            TelemetrySnapshot::Balance(t) => t.operating_mode(),
            TelemetrySnapshot::Motor(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_from_str() {
        assert_eq!("text".parse::<DeviceProfile>().unwrap(), DeviceProfile::Text);
        assert_eq!("Motor".parse::<DeviceProfile>().unwrap(), DeviceProfile::Binary);
        assert!("serial".parse::<DeviceProfile>().is_err());
    }

    #[test]
    fn test_default_device_names() {
        assert_eq!(DeviceProfile::Text.default_device_name(), "SelfBalancingRobot");
        assert_eq!(DeviceProfile::Binary.default_device_name(), "MotorControl");
    }

    #[test]
    fn test_movement_codes() {
        assert_eq!(Movement::Stop.direction_code(), 0);
        assert_eq!(Movement::Forward.direction_code(), 1);
        assert_eq!(Movement::Backward.direction_code(), 2);
        assert_eq!(Movement::Left.direction_code(), 3);
        assert_eq!(Movement::Right.direction_code(), 4);
        assert_eq!("fwd".parse::<Movement>().unwrap(), Movement::Forward);
    }

    #[test]
    fn test_zero_snapshot() {
        let zero = TelemetrySnapshot::zero(DeviceProfile::Binary);
        assert_eq!(zero, TelemetrySnapshot::Motor(MotorTelemetry::default()));
        assert_eq!(zero.profile(), DeviceProfile::Binary);
        assert_eq!(
            TelemetrySnapshot::zero(DeviceProfile::Text).operating_mode(),
            Some(OperatingMode::Balancing)
        );
    }

    #[test]
    fn test_yaw_rate() {
        let imu = ImuSample { gz: 1234, ..Default::default() };
        assert!((imu.yaw_rate() - 12.34).abs() < 1e-9);
    }
}

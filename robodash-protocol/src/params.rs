//! Control parameters and the command validator.
//!
//! Operator input is parsed and clamped here before it can reach a codec.
//! Every setter returns a new record; deciding when to transmit it is left
//! to the caller.

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::types::{Command, DeviceProfile};

/// Range of the balancing gains (kp, ki, kd).
pub const BALANCE_GAIN_RANGE: RangeInclusive<f64> = 0.0..=3000.0;
/// Range of the balancing setpoint in degrees.
pub const SETPOINT_RANGE: RangeInclusive<f64> = -10.0..=10.0;
/// Range of the motor speed in percent.
pub const SPEED_RANGE: RangeInclusive<f64> = 0.0..=100.0;
/// Range of the motor proportional gain.
pub const MOTOR_KP_RANGE: RangeInclusive<f64> = 0.0..=10.0;
/// Range of the motor integral and derivative gains.
pub const MOTOR_KI_KD_RANGE: RangeInclusive<f64> = 0.0..=1.0;

/// Name of a tunable parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKey {
    Kp,
    Ki,
    Kd,
    Setpoint,
    Speed,
}

impl ParameterKey {
    pub fn name(&self) -> &'static str {
        match self {
            ParameterKey::Kp => "kp",
            ParameterKey::Ki => "ki",
            ParameterKey::Kd => "kd",
            ParameterKey::Setpoint => "setpoint",
            ParameterKey::Speed => "speed",
        }
    }

    /// Accepted range of this parameter, or `None` if the profile lacks it.
    pub fn range(&self, profile: DeviceProfile) -> Option<RangeInclusive<f64>> {
        match (profile, self) {
            (DeviceProfile::Text, ParameterKey::Kp | ParameterKey::Ki | ParameterKey::Kd) => {
                Some(BALANCE_GAIN_RANGE)
            }
            (DeviceProfile::Text, ParameterKey::Setpoint) => Some(SETPOINT_RANGE),
            (DeviceProfile::Text, ParameterKey::Speed) => None,
            (DeviceProfile::Binary, ParameterKey::Speed) => Some(SPEED_RANGE),
            (DeviceProfile::Binary, ParameterKey::Kp) => Some(MOTOR_KP_RANGE),
            (DeviceProfile::Binary, ParameterKey::Ki | ParameterKey::Kd) => {
                Some(MOTOR_KI_KD_RANGE)
            }
            (DeviceProfile::Binary, ParameterKey::Setpoint) => None,
        }
    }

    /// Clamp `value` into this parameter's range for `profile`.
    pub fn clamp(&self, profile: DeviceProfile, value: f64) -> Option<f64> {
        self.range(profile)
            .map(|range| value.clamp(*range.start(), *range.end()))
    }
}

impl fmt::Display for ParameterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ParameterKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kp" => Ok(ParameterKey::Kp),
            "ki" => Ok(ParameterKey::Ki),
            "kd" => Ok(ParameterKey::Kd),
            "setpoint" => Ok(ParameterKey::Setpoint),
            "speed" => Ok(ParameterKey::Speed),
            other => Err(ValidationError::UnknownKey(other.to_string())),
        }
    }
}

/// Balancing loop gains and tilt setpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BalanceTuning {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Target tilt in degrees.
    pub setpoint: f64,
}

impl Default for BalanceTuning {
    fn default() -> Self {
        Self {
            kp: 60.0,
            ki: 270.0,
            kd: 2.2,
            setpoint: 3.6,
        }
    }
}

/// Motor speed target and PID gains.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotorTuning {
    /// Target speed in percent.
    pub speed: f64,
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl Default for MotorTuning {
    fn default() -> Self {
        Self {
            speed: 0.0,
            kp: 1.0,
            ki: 0.1,
            kd: 0.05,
        }
    }
}

/// The coherent set of tunables transmitted by a "send" action.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ControlParameters {
    Balance(BalanceTuning),
    Motor(MotorTuning),
}

impl ControlParameters {
    /// Default record a session starts with and returns to on disconnect.
    pub fn defaults(profile: DeviceProfile) -> Self {
        match profile {
            DeviceProfile::Text => ControlParameters::Balance(BalanceTuning::default()),
            DeviceProfile::Binary => ControlParameters::Motor(MotorTuning::default()),
        }
    }

    pub fn profile(&self) -> DeviceProfile {
        match self {
            ControlParameters::Balance(_) => DeviceProfile::Text,
            ControlParameters::Motor(_) => DeviceProfile::Binary,
        }
    }

    /// Current value of `key`, if the profile has it.
    pub fn get(&self, key: ParameterKey) -> Option<f64> {
        match (self, key) {
            (ControlParameters::Balance(t), ParameterKey::Kp) => Some(t.kp),
            (ControlParameters::Balance(t), ParameterKey::Ki) => Some(t.ki),
            (ControlParameters::Balance(t), ParameterKey::Kd) => Some(t.kd),
            (ControlParameters::Balance(t), ParameterKey::Setpoint) => Some(t.setpoint),
            (ControlParameters::Motor(t), ParameterKey::Speed) => Some(t.speed),
            (ControlParameters::Motor(t), ParameterKey::Kp) => Some(t.kp),
            (ControlParameters::Motor(t), ParameterKey::Ki) => Some(t.ki),
            (ControlParameters::Motor(t), ParameterKey::Kd) => Some(t.kd),
            _ => None,
        }
    }

    /// Apply raw operator input to `key`.
    ///
    /// Input that does not parse as a number (or parses to NaN) is discarded
    /// and an unchanged copy is returned.
    pub fn set_parameter(&self, key: ParameterKey, raw: &str) -> Result<Self, ValidationError> {
        match raw.trim().parse::<f64>() {
            Ok(value) => self.set_value(key, value),
            Err(_) => {
                self.check_key(key)?;
                Ok(*self)
            }
        }
    }

    /// Apply a typed value to `key`, clamped into the profile range.
    pub fn set_value(&self, key: ParameterKey, value: f64) -> Result<Self, ValidationError> {
        self.check_key(key)?;
        if value.is_nan() {
            return Ok(*self);
        }
        let profile = self.profile();
        let value = key.clamp(profile, value).ok_or(ValidationError::UnsupportedKey { key, profile })?;

        let mut next = *self;
        match (&mut next, key) {
            (ControlParameters::Balance(t), ParameterKey::Kp) => t.kp = value,
            (ControlParameters::Balance(t), ParameterKey::Ki) => t.ki = value,
            (ControlParameters::Balance(t), ParameterKey::Kd) => t.kd = value,
            (ControlParameters::Balance(t), ParameterKey::Setpoint) => t.setpoint = value,
            (ControlParameters::Motor(t), ParameterKey::Speed) => t.speed = value,
            (ControlParameters::Motor(t), ParameterKey::Kp) => t.kp = value,
            (ControlParameters::Motor(t), ParameterKey::Ki) => t.ki = value,
            (ControlParameters::Motor(t), ParameterKey::Kd) => t.kd = value,
            _ => return Err(ValidationError::UnsupportedKey { key, profile }),
        }
        Ok(next)
    }

    /// Copy with every field clamped into its range.
    pub fn clamped(&self) -> Self {
        let profile = self.profile();
        let clamp = |key: ParameterKey, v: f64| key.clamp(profile, v).unwrap_or(v);
        match *self {
            ControlParameters::Balance(t) => ControlParameters::Balance(BalanceTuning {
                kp: clamp(ParameterKey::Kp, t.kp),
                ki: clamp(ParameterKey::Ki, t.ki),
                kd: clamp(ParameterKey::Kd, t.kd),
                setpoint: clamp(ParameterKey::Setpoint, t.setpoint),
            }),
            ControlParameters::Motor(t) => ControlParameters::Motor(MotorTuning {
                speed: clamp(ParameterKey::Speed, t.speed),
                kp: clamp(ParameterKey::Kp, t.kp),
                ki: clamp(ParameterKey::Ki, t.ki),
                kd: clamp(ParameterKey::Kd, t.kd),
            }),
        }
    }

    /// Commands that transmit this record, in send order.
    pub fn commands(&self) -> Vec<Command> {
        match *self {
            ControlParameters::Balance(t) => vec![Command::Tuning {
                kp: t.kp,
                ki: t.ki,
                kd: t.kd,
                setpoint: t.setpoint,
            }],
            ControlParameters::Motor(t) => vec![
                Command::Speed(t.speed),
                Command::Gains {
                    kp: t.kp,
                    ki: t.ki,
                    kd: t.kd,
                },
            ],
        }
    }

    fn check_key(&self, key: ParameterKey) -> Result<(), ValidationError> {
        let profile = self.profile();
        match key.range(profile) {
            Some(_) => Ok(()),
            None => Err(ValidationError::UnsupportedKey { key, profile }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text() -> ControlParameters {
        ControlParameters::defaults(DeviceProfile::Text)
    }

    fn binary() -> ControlParameters {
        ControlParameters::defaults(DeviceProfile::Binary)
    }

    #[test]
    fn test_defaults() {
        assert_eq!(
            text(),
            ControlParameters::Balance(BalanceTuning {
                kp: 60.0,
                ki: 270.0,
                kd: 2.2,
                setpoint: 3.6
            })
        );
        assert_eq!(binary().get(ParameterKey::Speed), Some(0.0));
        assert_eq!(binary().get(ParameterKey::Kp), Some(1.0));
        assert_eq!(binary().get(ParameterKey::Ki), Some(0.1));
        assert_eq!(binary().get(ParameterKey::Kd), Some(0.05));
    }

    #[test]
    fn test_setpoint_clamping() {
        let p = text().set_parameter(ParameterKey::Setpoint, "15").unwrap();
        assert_eq!(p.get(ParameterKey::Setpoint), Some(10.0));

        let p = text().set_parameter(ParameterKey::Setpoint, "-15").unwrap();
        assert_eq!(p.get(ParameterKey::Setpoint), Some(-10.0));
    }

    #[test]
    fn test_gain_clamping() {
        let p = text().set_parameter(ParameterKey::Kp, "-5").unwrap();
        assert_eq!(p.get(ParameterKey::Kp), Some(0.0));

        let p = text().set_parameter(ParameterKey::Ki, "4000").unwrap();
        assert_eq!(p.get(ParameterKey::Ki), Some(3000.0));

        let p = binary().set_parameter(ParameterKey::Kp, "12").unwrap();
        assert_eq!(p.get(ParameterKey::Kp), Some(10.0));

        let p = binary().set_parameter(ParameterKey::Kd, "1.5").unwrap();
        assert_eq!(p.get(ParameterKey::Kd), Some(1.0));

        let p = binary().set_parameter(ParameterKey::Speed, "250").unwrap();
        assert_eq!(p.get(ParameterKey::Speed), Some(100.0));
    }

    #[test]
    fn test_clamp_idempotent() {
        let samples = [-1e9, -15.0, -10.0, -0.5, 0.0, 0.05, 0.7, 3.6, 9.99, 10.0, 42.0, 2999.9, 1e9];
        let keys = [
            ParameterKey::Kp,
            ParameterKey::Ki,
            ParameterKey::Kd,
            ParameterKey::Setpoint,
            ParameterKey::Speed,
        ];
        for profile in [DeviceProfile::Text, DeviceProfile::Binary] {
            for key in keys {
                for x in samples {
                    if let Some(once) = key.clamp(profile, x) {
                        assert_eq!(key.clamp(profile, once), Some(once), "{key} {profile} {x}");
                    }
                }
            }
        }

        let wild = ControlParameters::Motor(MotorTuning {
            speed: 300.0,
            kp: -1.0,
            ki: 0.5,
            kd: 7.0,
        });
        assert_eq!(wild.clamped().clamped(), wild.clamped());
        assert_eq!(wild.clamped().get(ParameterKey::Speed), Some(100.0));
    }

    #[test]
    fn test_unparseable_input_is_discarded() {
        let before = text().set_parameter(ParameterKey::Kd, "5.5").unwrap();
        let after = before.set_parameter(ParameterKey::Kd, "abc").unwrap();
        assert_eq!(after, before);

        let after = before.set_parameter(ParameterKey::Kd, "NaN").unwrap();
        assert_eq!(after, before);

        let after = before.set_parameter(ParameterKey::Kd, "").unwrap();
        assert_eq!(after, before);
    }

    #[test]
    fn test_key_not_in_profile() {
        let err = text().set_parameter(ParameterKey::Speed, "10").unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnsupportedKey {
                key: ParameterKey::Speed,
                profile: DeviceProfile::Text
            }
        );
        assert!(binary().set_value(ParameterKey::Setpoint, 1.0).is_err());
    }

    #[test]
    fn test_parse_key() {
        assert_eq!("KP".parse::<ParameterKey>().unwrap(), ParameterKey::Kp);
        assert_eq!(" setpoint ".parse::<ParameterKey>().unwrap(), ParameterKey::Setpoint);
        assert!(matches!(
            "gain".parse::<ParameterKey>(),
            Err(ValidationError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_commands() {
        assert_eq!(
            text().commands(),
            vec![Command::Tuning {
                kp: 60.0,
                ki: 270.0,
                kd: 2.2,
                setpoint: 3.6
            }]
        );
        let cmds = binary().commands();
        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[0], Command::Speed(0.0));
        assert!(matches!(cmds[1], Command::Gains { .. }));
    }
}

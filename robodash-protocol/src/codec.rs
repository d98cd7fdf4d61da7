//! Frame codecs for the two device profiles.
//!
//! Text profile (balancing robot), ASCII:
//! ```text
//! device → dashboard   accX,accY,accZ,gyroX,gyroY,gyroZ,angle,motorSpeed,mode
//! dashboard → device   PID:<kp>,<ki>,<kd>,<setpoint>   (one decimal each)
//!                      MODE:<int>
//!                      CMD:<FWD|BWD|LEFT|RIGHT|STOP>
//! ```
//!
//! Binary profile (motor controller), big-endian:
//! ```text
//! +------+--------------------------------------------+
//! | Tag  | Payload                                    |
//! +------+--------------------------------------------+
//! | 0x01 | left u16, right u16           (device → ) |
//! | 0x02 | ax ay az gx gy gz u16         (device → ) |
//! | 0x01 | pwm u8                        (→ device) |
//! | 0x02 | kp ki kd u16, each gain*1000  (→ device) |
//! | 0x03 | direction u8                  (→ device) |
//! +------+--------------------------------------------+
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{DecodeError, EncodeError};
use crate::types::*;

/// Field names of a text telemetry frame, in wire order.
const TEXT_FIELDS: [&str; TEXT_FIELD_COUNT] = [
    "accX",
    "accY",
    "accZ",
    "gyroX",
    "gyroY",
    "gyroZ",
    "angle",
    "motorSpeed",
    "mode",
];

/// Translates between wire frames and typed commands/telemetry.
///
/// Implementations are pure: no I/O, no shared state.
pub trait FrameCodec: Send + Sync {
    /// Profile this codec speaks.
    fn profile(&self) -> DeviceProfile;

    /// Encode an outbound command.
    fn encode_command(&self, command: &Command) -> Result<Bytes, EncodeError>;

    /// Decode one inbound notification payload.
    fn decode_frame(&self, frame: &[u8]) -> Result<TelemetryEvent, DecodeError>;

    /// Encode telemetry the way the device firmware does.
    fn encode_telemetry(&self, event: &TelemetryEvent) -> Result<Bytes, EncodeError>;
}

/// Codec for the comma separated text profile.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

/// Codec for the tagged binary profile.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

/// Select the codec for a profile.
pub fn codec_for(profile: DeviceProfile) -> &'static dyn FrameCodec {
    match profile {
        DeviceProfile::Text => &TextCodec,
        DeviceProfile::Binary => &BinaryCodec,
    }
}

impl FrameCodec for TextCodec {
    fn profile(&self) -> DeviceProfile {
        DeviceProfile::Text
    }

    fn encode_command(&self, command: &Command) -> Result<Bytes, EncodeError> {
        let text = match command {
            Command::Tuning {
                kp,
                ki,
                kd,
                setpoint,
            } => format!(
                "PID:{:.1},{:.1},{:.1},{:.1}",
                normalize_zero(*kp),
                normalize_zero(*ki),
                normalize_zero(*kd),
                normalize_zero(*setpoint)
            ),
            Command::Mode(mode) => format!("MODE:{}", mode.as_raw()),
            Command::Move(movement) => format!("CMD:{}", movement.token()),
            Command::Speed(_) | Command::Gains { .. } => {
                return Err(EncodeError::Unsupported {
                    command: command.name(),
                    profile: DeviceProfile::Text,
                })
            }
        };
        Ok(Bytes::from(text))
    }

    fn decode_frame(&self, frame: &[u8]) -> Result<TelemetryEvent, DecodeError> {
        let text = std::str::from_utf8(frame)
            .map_err(|e| DecodeError::MalformedFrame(format!("invalid text: {}", e)))?;
        let text = text.trim_end_matches(['\r', '\n', '\0']);

        let fields: Vec<&str> = text.split(',').collect();
        if fields.len() != TEXT_FIELD_COUNT {
            return Err(DecodeError::MalformedFrame(format!(
                "expected {} fields, got {}",
                TEXT_FIELD_COUNT,
                fields.len()
            )));
        }

        let mut values = [0.0f64; TEXT_FIELD_COUNT];
        for (i, field) in fields.iter().enumerate() {
            values[i] = parse_field(TEXT_FIELDS[i], field)?;
        }

        Ok(TelemetryEvent::Balance(BalanceTelemetry {
            acc: [values[0], values[1], values[2]],
            gyro: [values[3], values[4], values[5]],
            angle: values[6],
            motor_speed: values[7].trunc() as i32,
            mode: values[8].trunc() as i32,
        }))
    }

    fn encode_telemetry(&self, event: &TelemetryEvent) -> Result<Bytes, EncodeError> {
        match event {
            TelemetryEvent::Balance(t) => Ok(Bytes::from(format!(
                "{},{},{},{},{},{},{},{},{}",
                t.acc[0],
                t.acc[1],
                t.acc[2],
                t.gyro[0],
                t.gyro[1],
                t.gyro[2],
                t.angle,
                t.motor_speed,
                t.mode
            ))),
            TelemetryEvent::WheelRpm(_) => Err(EncodeError::Unsupported {
                command: "WheelRpm",
                profile: DeviceProfile::Text,
            }),
            TelemetryEvent::Imu(_) => Err(EncodeError::Unsupported {
                command: "Imu",
                profile: DeviceProfile::Text,
            }),
        }
    }
}

impl FrameCodec for BinaryCodec {
    fn profile(&self) -> DeviceProfile {
        DeviceProfile::Binary
    }

    fn encode_command(&self, command: &Command) -> Result<Bytes, EncodeError> {
        let mut frame = BytesMut::with_capacity(7);

        match command {
            Command::Speed(speed) => {
                frame.put_u8(tag::SPEED);
                frame.put_u8(speed_to_pwm(*speed));
            }
            Command::Gains { kp, ki, kd } => {
                frame.put_u8(tag::GAINS);
                frame.put_u16(scale_gain(*kp));
                frame.put_u16(scale_gain(*ki));
                frame.put_u16(scale_gain(*kd));
            }
            Command::Move(movement) => {
                frame.put_u8(tag::MOVE);
                frame.put_u8(movement.direction_code());
            }
            Command::Tuning { .. } | Command::Mode(_) => {
                return Err(EncodeError::Unsupported {
                    command: command.name(),
                    profile: DeviceProfile::Binary,
                })
            }
        }

        Ok(frame.freeze())
    }

    fn decode_frame(&self, frame: &[u8]) -> Result<TelemetryEvent, DecodeError> {
        let Some(&frame_tag) = frame.first() else {
            return Err(DecodeError::TruncatedFrame {
                tag: None,
                expected: 1,
                actual: 0,
            });
        };

        match frame_tag {
            tag::WHEEL_RPM => {
                let mut buf = require_len(frame, WHEEL_RPM_FRAME_LEN)?;
                Ok(TelemetryEvent::WheelRpm(WheelRpm {
                    left: buf.get_u16(),
                    right: buf.get_u16(),
                }))
            }
            tag::IMU => {
                let mut buf = require_len(frame, IMU_FRAME_LEN)?;
                Ok(TelemetryEvent::Imu(ImuSample {
                    ax: buf.get_u16(),
                    ay: buf.get_u16(),
                    az: buf.get_u16(),
                    gx: buf.get_u16(),
                    gy: buf.get_u16(),
                    gz: buf.get_u16(),
                }))
            }
            other => Err(DecodeError::UnknownFrameTag(other)),
        }
    }

    fn encode_telemetry(&self, event: &TelemetryEvent) -> Result<Bytes, EncodeError> {
        let mut frame = BytesMut::with_capacity(IMU_FRAME_LEN);

        match event {
            TelemetryEvent::WheelRpm(rpm) => {
                frame.put_u8(tag::WHEEL_RPM);
                frame.put_u16(rpm.left);
                frame.put_u16(rpm.right);
            }
            TelemetryEvent::Imu(imu) => {
                frame.put_u8(tag::IMU);
                for v in [imu.ax, imu.ay, imu.az, imu.gx, imu.gy, imu.gz] {
                    frame.put_u16(v);
                }
            }
            TelemetryEvent::Balance(_) => {
                return Err(EncodeError::Unsupported {
                    command: "Balance",
                    profile: DeviceProfile::Binary,
                })
            }
        }

        Ok(frame.freeze())
    }
}

fn parse_field(name: &str, field: &str) -> Result<f64, DecodeError> {
    let value: f64 = field
        .trim()
        .parse()
        .map_err(|_| DecodeError::MalformedFrame(format!("{} is not numeric: {:?}", name, field)))?;

    if !value.is_finite() {
        return Err(DecodeError::MalformedFrame(format!(
            "{} is not finite: {:?}",
            name, field
        )));
    }

    Ok(value)
}

/// Payload after the tag byte, checked against the tag's frame length.
fn require_len(frame: &[u8], expected: usize) -> Result<&[u8], DecodeError> {
    if frame.len() < expected {
        return Err(DecodeError::TruncatedFrame {
            tag: Some(frame[0]),
            expected,
            actual: frame.len(),
        });
    }
    Ok(&frame[1..expected])
}

/// `round(speed / 100 * 255)`.
fn speed_to_pwm(speed: f64) -> u8 {
    (speed / 100.0 * 255.0).round().clamp(0.0, 255.0) as u8
}

/// `round(gain * 1000)` as an unsigned 16-bit value.
fn scale_gain(gain: f64) -> u16 {
    (gain * 1000.0).round().clamp(0.0, f64::from(u16::MAX)) as u16
}

/// Avoid rendering negative zero as "-0.0".
fn normalize_zero(value: f64) -> f64 {
    if value == 0.0 {
        0.0
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_text_frame() {
        let event = TextCodec.decode_frame(b"1,2,3,4,5,6,7,8,0").unwrap();
        assert_eq!(
            event,
            TelemetryEvent::Balance(BalanceTelemetry {
                acc: [1.0, 2.0, 3.0],
                gyro: [4.0, 5.0, 6.0],
                angle: 7.0,
                motor_speed: 8,
                mode: 0,
            })
        );
    }

    #[test]
    fn test_decode_text_frame_with_line_ending() {
        let event = TextCodec
            .decode_frame(b"0.12, -0.98, 0.05, 1.5, -2.25, 0.0, -3.4, 120.7, 1\r\n")
            .unwrap();
        let TelemetryEvent::Balance(t) = event else {
            panic!("expected balance telemetry");
        };
        assert_eq!(t.acc, [0.12, -0.98, 0.05]);
        assert_eq!(t.angle, -3.4);
        assert_eq!(t.motor_speed, 120);
        assert_eq!(t.operating_mode(), Some(OperatingMode::Control));
    }

    #[test]
    fn test_decode_text_wrong_field_count() {
        let result = TextCodec.decode_frame(b"1,2,3,4,5,6,7,8");
        assert!(matches!(result, Err(DecodeError::MalformedFrame(_))));

        let result = TextCodec.decode_frame(b"1,2,3,4,5,6,7,8,0,9");
        assert!(matches!(result, Err(DecodeError::MalformedFrame(_))));
    }

    #[test]
    fn test_decode_text_non_numeric() {
        let result = TextCodec.decode_frame(b"1,2,3,x,5,6,7,8,0");
        assert!(matches!(result, Err(DecodeError::MalformedFrame(_))));

        let result = TextCodec.decode_frame(b"1,2,3,NaN,5,6,7,8,0");
        assert!(matches!(result, Err(DecodeError::MalformedFrame(_))));

        let result = TextCodec.decode_frame(b"1,2,3,4,5,6,7,,0");
        assert!(matches!(result, Err(DecodeError::MalformedFrame(_))));

        let result = TextCodec.decode_frame(&[0xFF, 0xFE, b',']);
        assert!(matches!(result, Err(DecodeError::MalformedFrame(_))));
    }

    #[test]
    fn test_text_telemetry_round_trip() {
        for frame in ["1,2,3,4,5,6,7,8,0", "-0.5,0.25,9.81,12.5,-7.125,0.001,4.2,-200,1"] {
            let decoded = TextCodec.decode_frame(frame.as_bytes()).unwrap();
            let encoded = TextCodec.encode_telemetry(&decoded).unwrap();
            assert_eq!(&encoded[..], frame.as_bytes());
            assert_eq!(TextCodec.decode_frame(&encoded).unwrap(), decoded);
        }
    }

    #[test]
    fn test_encode_text_commands() {
        let tuning = Command::Tuning {
            kp: 60.0,
            ki: 270.0,
            kd: 2.2,
            setpoint: -3.64,
        };
        assert_eq!(&TextCodec.encode_command(&tuning).unwrap()[..], b"PID:60.0,270.0,2.2,-3.6");

        let mode = Command::Mode(OperatingMode::Control);
        assert_eq!(&TextCodec.encode_command(&mode).unwrap()[..], b"MODE:1");

        let tokens: [(Movement, &[u8]); 5] = [
            (Movement::Forward, b"CMD:FWD"),
            (Movement::Backward, b"CMD:BWD"),
            (Movement::Left, b"CMD:LEFT"),
            (Movement::Right, b"CMD:RIGHT"),
            (Movement::Stop, b"CMD:STOP"),
        ];
        for (movement, expected) in tokens {
            assert_eq!(&TextCodec.encode_command(&Command::Move(movement)).unwrap()[..], expected);
        }
    }

    #[test]
    fn test_text_rejects_binary_commands() {
        let result = TextCodec.encode_command(&Command::Speed(50.0));
        assert!(matches!(result, Err(EncodeError::Unsupported { .. })));
    }

    #[test]
    fn test_encode_negative_zero() {
        let tuning = Command::Tuning {
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
            setpoint: -0.0,
        };
        assert_eq!(&TextCodec.encode_command(&tuning).unwrap()[..], b"PID:0.0,0.0,0.0,0.0");
    }

    #[test]
    fn test_decode_rpm_frame() {
        let frame = [0x01, 0x12, 0x34, 0xAB, 0xCD];
        let event = BinaryCodec.decode_frame(&frame).unwrap();
        assert_eq!(
            event,
            TelemetryEvent::WheelRpm(WheelRpm {
                left: (0x12 << 8) | 0x34,
                right: (0xAB << 8) | 0xCD,
            })
        );
    }

    #[test]
    fn test_decode_imu_frame() {
        let frame = [0x02, 0, 1, 0, 2, 0, 3, 0x01, 0x00, 0xFF, 0xFF, 0x04, 0xD2];
        let event = BinaryCodec.decode_frame(&frame).unwrap();
        assert_eq!(
            event,
            TelemetryEvent::Imu(ImuSample {
                ax: 1,
                ay: 2,
                az: 3,
                gx: 256,
                gy: 65535,
                gz: 1234,
            })
        );
    }

    #[test]
    fn test_decode_binary_errors() {
        assert_eq!(
            BinaryCodec.decode_frame(&[0x01, 0x00, 0x10]),
            Err(DecodeError::TruncatedFrame {
                tag: Some(0x01),
                expected: 5,
                actual: 3
            })
        );
        assert!(matches!(
            BinaryCodec.decode_frame(&[0x02; 12]),
            Err(DecodeError::TruncatedFrame { expected: 13, .. })
        ));
        assert_eq!(
            BinaryCodec.decode_frame(&[0x7F, 0, 0, 0, 0]),
            Err(DecodeError::UnknownFrameTag(0x7F))
        );
        assert!(matches!(
            BinaryCodec.decode_frame(&[]),
            Err(DecodeError::TruncatedFrame { tag: None, .. })
        ));
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let event = BinaryCodec.decode_frame(&[0x01, 0, 10, 0, 20, 0xEE]).unwrap();
        assert_eq!(event, TelemetryEvent::WheelRpm(WheelRpm { left: 10, right: 20 }));
    }

    #[test]
    fn test_encode_speed() {
        let frame = BinaryCodec.encode_command(&Command::Speed(50.0)).unwrap();
        assert_eq!(&frame[..], &[0x01, 128]);

        let frame = BinaryCodec.encode_command(&Command::Speed(100.0)).unwrap();
        assert_eq!(&frame[..], &[0x01, 255]);

        let frame = BinaryCodec.encode_command(&Command::Speed(0.0)).unwrap();
        assert_eq!(&frame[..], &[0x01, 0]);
    }

    #[test]
    fn test_encode_gains() {
        let frame = BinaryCodec
            .encode_command(&Command::Gains {
                kp: 1.0,
                ki: 0.1,
                kd: 0.05,
            })
            .unwrap();
        // 1000 = 0x03E8, 100 = 0x0064, 50 = 0x0032
        assert_eq!(&frame[..], &[0x02, 0x03, 0xE8, 0x00, 0x64, 0x00, 0x32]);

        let frame = BinaryCodec
            .encode_command(&Command::Gains {
                kp: 10.0,
                ki: 1.0,
                kd: 0.0,
            })
            .unwrap();
        assert_eq!(&frame[..], &[0x02, 0x27, 0x10, 0x03, 0xE8, 0x00, 0x00]);
    }

    #[test]
    fn test_encode_movement() {
        let frame = BinaryCodec.encode_command(&Command::Move(Movement::Left)).unwrap();
        assert_eq!(&frame[..], &[0x03, 3]);
        let frame = BinaryCodec.encode_command(&Command::Move(Movement::Stop)).unwrap();
        assert_eq!(&frame[..], &[0x03, 0]);
    }

    #[test]
    fn test_binary_rejects_text_commands() {
        let result = BinaryCodec.encode_command(&Command::Mode(OperatingMode::Control));
        assert!(matches!(result, Err(EncodeError::Unsupported { .. })));
    }

    #[test]
    fn test_encode_binary_telemetry() {
        let rpm = TelemetryEvent::WheelRpm(WheelRpm { left: 300, right: 7 });
        let frame = BinaryCodec.encode_telemetry(&rpm).unwrap();
        assert_eq!(&frame[..], &[0x01, 0x01, 0x2C, 0x00, 0x07]);
        assert_eq!(BinaryCodec.decode_frame(&frame).unwrap(), rpm);
    }

    #[test]
    fn test_codec_for() {
        assert_eq!(codec_for(DeviceProfile::Text).profile(), DeviceProfile::Text);
        assert_eq!(codec_for(DeviceProfile::Binary).profile(), DeviceProfile::Binary);
    }
}

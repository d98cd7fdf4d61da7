//! Wire protocol definitions for the robodash robot dashboard.
//!
//! Two firmware profiles talk to the dashboard over a single
//! read/write/notify characteristic:
//!
//! - [`DeviceProfile::Text`]: the self-balancing robot, comma separated
//!   ASCII telemetry and `PID:`/`MODE:`/`CMD:` commands.
//! - [`DeviceProfile::Binary`]: the motor controller, tagged big-endian
//!   frames.
//!
//! Both are served through the [`FrameCodec`] trait so the session layer
//! never branches on the wire format.
//!
//! # Example
//!
//! ```rust
//! use robodash_protocol::{codec_for, Command, DeviceProfile, Movement, TelemetryEvent};
//!
//! let codec = codec_for(DeviceProfile::Text);
//!
//! // Encode a command
//! let frame = codec.encode_command(&Command::Move(Movement::Forward)).unwrap();
//! assert_eq!(&frame[..], b"CMD:FWD");
//!
//! // Decode a telemetry frame
//! let event = codec.decode_frame(b"1,2,3,4,5,6,7,8,0").unwrap();
//! assert!(matches!(event, TelemetryEvent::Balance(_)));
//! ```
//!
//! # Control parameters
//!
//! Operator input is validated and clamped by [`ControlParameters`]:
//!
//! ```rust
//! use robodash_protocol::{ControlParameters, DeviceProfile, ParameterKey};
//!
//! let params = ControlParameters::defaults(DeviceProfile::Text);
//! let params = params.set_parameter(ParameterKey::Setpoint, "15").unwrap();
//! assert_eq!(params.get(ParameterKey::Setpoint), Some(10.0));
//! ```

pub mod codec;
pub mod error;
pub mod params;
pub mod types;

pub use codec::{codec_for, BinaryCodec, FrameCodec, TextCodec};
pub use error::{DecodeError, EncodeError, ValidationError};
pub use params::{BalanceTuning, ControlParameters, MotorTuning, ParameterKey};
pub use types::{
    BalanceTelemetry, Command, DeviceProfile, ImuSample, MotorTelemetry, Movement, OperatingMode,
    TelemetryEvent, TelemetrySnapshot, WheelRpm, DEFAULT_CHARACTERISTIC_UUID,
    DEFAULT_SERVICE_UUID,
};

//! Error types for the robodash wire protocols.

use thiserror::Error;

use crate::params::ParameterKey;
use crate::types::DeviceProfile;

/// Inbound frame could not be decoded.
///
/// Decode errors are never fatal to a connection: the offending frame is
/// dropped and the session keeps running.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Text frame with the wrong field count or an unparseable field.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Binary frame whose first byte is not a known tag.
    #[error("Unknown frame tag: 0x{0:02X}")]
    UnknownFrameTag(u8),

    /// Binary frame shorter than its tag requires.
    #[error("Truncated frame (tag {tag:?}): expected {expected} bytes, got {actual}")]
    TruncatedFrame {
        tag: Option<u8>,
        expected: usize,
        actual: usize,
    },
}

/// Outbound command could not be encoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// The command is not part of the profile's vocabulary.
    #[error("{command} command is not supported by the {profile} profile")]
    Unsupported {
        command: &'static str,
        profile: DeviceProfile,
    },
}

/// Operator input rejected by the command validator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The parameter does not exist in the profile.
    #[error("Parameter {key} is not available in the {profile} profile")]
    UnsupportedKey {
        key: ParameterKey,
        profile: DeviceProfile,
    },

    /// The parameter name is not recognised at all.
    #[error("Unknown parameter: {0}")]
    UnknownKey(String),
}

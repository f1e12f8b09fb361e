//! Centralized error types for lattsim.
//!
//! Uses `thiserror` for ergonomic error definitions and provides the total
//! mapping from internal errors to the wire-level response codes the client
//! SDK understands. Internal details are logged, never sent.

use serde::{Deserialize, Serialize};

/// Response codes surfaced to the client SDK, one byte on the wire.
///
/// This is a closed set — the SDK switches on the exact values, so new
/// conditions must map onto an existing code rather than extend the enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ResponseCode {
    Success = 0x00,
    InvalidMsg = 0x01,
    UnsupportedVersion = 0x02,
    DeviceBusy = 0x03,
    UserTimeout = 0x04,
    UserDeclined = 0x05,
    PairFailed = 0x06,
    PairDisabled = 0x07,
    PermissionDisabled = 0x08,
    InternalError = 0x09,
    GceTimeout = 0x0a,
    WrongWallet = 0x0b,
    DeviceLocked = 0x0c,
    Disabled = 0x0d,
    Already = 0x0e,
    InvalidEphemId = 0x0f,
}

impl ResponseCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Success),
            0x01 => Some(Self::InvalidMsg),
            0x02 => Some(Self::UnsupportedVersion),
            0x03 => Some(Self::DeviceBusy),
            0x04 => Some(Self::UserTimeout),
            0x05 => Some(Self::UserDeclined),
            0x06 => Some(Self::PairFailed),
            0x07 => Some(Self::PairDisabled),
            0x08 => Some(Self::PermissionDisabled),
            0x09 => Some(Self::InternalError),
            0x0a => Some(Self::GceTimeout),
            0x0b => Some(Self::WrongWallet),
            0x0c => Some(Self::DeviceLocked),
            0x0d => Some(Self::Disabled),
            0x0e => Some(Self::Already),
            0x0f => Some(Self::InvalidEphemId),
            _ => None,
        }
    }
}

/// Core application error type used across all lattsim crates.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    // === State preconditions ===
    #[error("Device is locked")]
    DeviceLocked,

    #[error("Session is not paired")]
    NotPaired,

    #[error("Firmware does not support this operation")]
    UnsupportedVersion,

    #[error("Device is busy")]
    DeviceBusy,

    // === Malformed input ===
    #[error("Invalid message: {0}")]
    Invalid(String),

    #[error("Ephemeral id mismatch")]
    InvalidEphemeralId,

    // === User-originated ===
    #[error("User declined the request")]
    UserDeclined,

    #[error("Timed out waiting for user")]
    UserTimeout,

    #[error("Pairing failed")]
    PairFailed,

    #[error("Pairing is disabled")]
    PairDisabled,

    // === Resource state ===
    #[error("A record with this key already exists")]
    AlreadyExists,

    #[error("Request targets a wallet that is not active")]
    WrongWallet,

    #[error("Operation is disabled")]
    Disabled,

    #[error("Permission is disabled")]
    PermissionDisabled,

    // === Infrastructure ===
    #[error("UI channel closed")]
    ChannelClosed,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl SimError {
    /// Map this error to the response code sent back to the client SDK.
    pub fn response_code(&self) -> ResponseCode {
        match self {
            Self::DeviceLocked => ResponseCode::DeviceLocked,
            Self::NotPaired | Self::PairFailed => ResponseCode::PairFailed,
            Self::UnsupportedVersion => ResponseCode::UnsupportedVersion,
            Self::DeviceBusy => ResponseCode::DeviceBusy,
            Self::Invalid(_) => ResponseCode::InvalidMsg,
            Self::InvalidEphemeralId => ResponseCode::InvalidEphemId,
            Self::UserDeclined => ResponseCode::UserDeclined,
            Self::UserTimeout => ResponseCode::UserTimeout,
            Self::PairDisabled => ResponseCode::PairDisabled,
            Self::AlreadyExists => ResponseCode::Already,
            Self::WrongWallet => ResponseCode::WrongWallet,
            Self::Disabled => ResponseCode::Disabled,
            Self::PermissionDisabled => ResponseCode::PermissionDisabled,
            Self::ChannelClosed | Self::Internal(_) => ResponseCode::InternalError,
        }
    }

    /// Map an error string reported by the UI in a `client_response` to the
    /// code the client SDK should see.
    pub fn from_ui_error(error: &str) -> Self {
        match error {
            "userDeclined" => Self::UserDeclined,
            "userTimeout" => Self::UserTimeout,
            "wrongWallet" => Self::WrongWallet,
            "disabled" => Self::Disabled,
            other => Self::Internal(anyhow::anyhow!("UI error: {other}")),
        }
    }
}

/// Convenience type alias for Results using SimError.
pub type SimResult<T> = Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_codes_round_trip() {
        for value in 0x00u8..=0x0f {
            let code = ResponseCode::from_u8(value).expect("defined code");
            assert_eq!(code as u8, value);
        }
        assert!(ResponseCode::from_u8(0x10).is_none());
    }

    #[test]
    fn internal_errors_never_leak_details() {
        let err = SimError::Internal(anyhow::anyhow!("secret stack detail"));
        assert_eq!(err.response_code(), ResponseCode::InternalError);
    }
}

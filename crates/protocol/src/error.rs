//! Error taxonomy shared by the transport mapper and the public API

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every failure the session layer can report
///
/// Transport-specific status codes are translated into one of these members
/// before they leave the session crate. Undocumented codes become `Unknown`
/// rather than being dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
pub enum UsbError {
    /// A handle, index or argument was outside its valid range
    #[error("invalid argument")]
    InvalidArgument,

    /// The host ran out of memory or another finite resource
    #[error("out of memory")]
    ResourceExhausted,

    /// Generic input/output failure on the bus
    #[error("I/O error")]
    Io,

    /// The operation did not complete within its timeout
    #[error("timeout")]
    Timeout,

    /// The device is gone or never matched
    #[error("no such device")]
    NoSuchDevice,

    /// The resource is held by someone else
    #[error("busy")]
    Busy,

    /// Insufficient permissions
    #[error("access denied")]
    AccessDenied,

    /// The operation is not valid in the current state
    #[error("invalid state")]
    InvalidState,

    /// Unrecognized transport status
    #[error("unknown error")]
    Unknown,
}

/// Numeric code reported for success by [`error_str`]
pub const OK: i32 = 0;

impl UsbError {
    /// All taxonomy members, in code order
    pub const ALL: [UsbError; 9] = [
        UsbError::InvalidArgument,
        UsbError::ResourceExhausted,
        UsbError::Io,
        UsbError::Timeout,
        UsbError::NoSuchDevice,
        UsbError::Busy,
        UsbError::AccessDenied,
        UsbError::InvalidState,
        UsbError::Unknown,
    ];

    /// Stable negative numeric code for this error
    pub fn code(self) -> i32 {
        match self {
            UsbError::InvalidArgument => -1,
            UsbError::ResourceExhausted => -2,
            UsbError::Io => -3,
            UsbError::Timeout => -4,
            UsbError::NoSuchDevice => -5,
            UsbError::Busy => -6,
            UsbError::AccessDenied => -7,
            UsbError::InvalidState => -8,
            UsbError::Unknown => -99,
        }
    }

    /// Inverse of [`UsbError::code`]. Codes outside the table yield `Unknown`.
    pub fn from_code(code: i32) -> UsbError {
        Self::ALL
            .into_iter()
            .find(|e| e.code() == code)
            .unwrap_or(UsbError::Unknown)
    }

    /// Short diagnostic string
    pub fn as_str(self) -> &'static str {
        match self {
            UsbError::InvalidArgument => "invalid argument",
            UsbError::ResourceExhausted => "out of memory",
            UsbError::Io => "I/O error",
            UsbError::Timeout => "timeout",
            UsbError::NoSuchDevice => "no such device",
            UsbError::Busy => "busy",
            UsbError::AccessDenied => "access denied",
            UsbError::InvalidState => "invalid state",
            UsbError::Unknown => "unknown error",
        }
    }
}

/// Diagnostic string for a numeric status code
///
/// `0` is success; every other value goes through [`UsbError::from_code`].
pub fn error_str(code: i32) -> &'static str {
    if code == OK {
        return "ok";
    }
    UsbError::from_code(code).as_str()
}

/// Type alias for session results
pub type Result<T> = std::result::Result<T, UsbError>;

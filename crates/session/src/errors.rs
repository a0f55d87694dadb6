//! Transport status mapping
//!
//! Translates libusb/rusb status codes into [`UsbError`]. This is the only
//! place transport errors are interpreted; everything above it speaks the
//! shared taxonomy.

use protocol::UsbError;
use rusb::ffi::constants::{
    LIBUSB_ERROR_ACCESS, LIBUSB_ERROR_BUSY, LIBUSB_ERROR_INTERRUPTED, LIBUSB_ERROR_INVALID_PARAM,
    LIBUSB_ERROR_IO, LIBUSB_ERROR_NO_DEVICE, LIBUSB_ERROR_NO_MEM, LIBUSB_ERROR_NOT_FOUND,
    LIBUSB_ERROR_NOT_SUPPORTED, LIBUSB_ERROR_OTHER, LIBUSB_ERROR_OVERFLOW, LIBUSB_ERROR_PIPE,
    LIBUSB_ERROR_TIMEOUT,
};

/// Map rusb::Error to UsbError
pub fn map_rusb_error(err: rusb::Error) -> UsbError {
    match err {
        rusb::Error::InvalidParam => UsbError::InvalidArgument,
        rusb::Error::NoMem => UsbError::ResourceExhausted,
        rusb::Error::Io => UsbError::Io,
        rusb::Error::Timeout => UsbError::Timeout,
        rusb::Error::NoDevice | rusb::Error::NotFound => UsbError::NoSuchDevice,
        rusb::Error::Busy => UsbError::Busy,
        rusb::Error::Access => UsbError::AccessDenied,
        rusb::Error::NotSupported => UsbError::InvalidState,
        rusb::Error::Pipe
        | rusb::Error::Overflow
        | rusb::Error::Interrupted
        | rusb::Error::BadDescriptor => UsbError::Io,
        // Other, and anything a later rusb adds
        _ => UsbError::Unknown,
    }
}

/// Map a raw libusb return value
///
/// Non-negative values are byte counts and pass through unchanged. Negative
/// values are libusb error constants; anything libusb does not define becomes
/// `Unknown`.
pub fn map_status(code: i32) -> Result<usize, UsbError> {
    if code >= 0 {
        return Ok(code as usize);
    }

    let err = match code {
        LIBUSB_ERROR_IO => rusb::Error::Io,
        LIBUSB_ERROR_INVALID_PARAM => rusb::Error::InvalidParam,
        LIBUSB_ERROR_ACCESS => rusb::Error::Access,
        LIBUSB_ERROR_NO_DEVICE => rusb::Error::NoDevice,
        LIBUSB_ERROR_NOT_FOUND => rusb::Error::NotFound,
        LIBUSB_ERROR_BUSY => rusb::Error::Busy,
        LIBUSB_ERROR_TIMEOUT => rusb::Error::Timeout,
        LIBUSB_ERROR_OVERFLOW => rusb::Error::Overflow,
        LIBUSB_ERROR_PIPE => rusb::Error::Pipe,
        LIBUSB_ERROR_INTERRUPTED => rusb::Error::Interrupted,
        LIBUSB_ERROR_NO_MEM => rusb::Error::NoMem,
        LIBUSB_ERROR_NOT_SUPPORTED => rusb::Error::NotSupported,
        LIBUSB_ERROR_OTHER => rusb::Error::Other,
        _ => return Err(UsbError::Unknown),
    };
    Err(map_rusb_error(err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_map_rusb_error() {
        assert_eq!(map_rusb_error(rusb::Error::Timeout), UsbError::Timeout);
        assert_eq!(map_rusb_error(rusb::Error::Pipe), UsbError::Io);
        assert_eq!(map_rusb_error(rusb::Error::NoDevice), UsbError::NoSuchDevice);
        assert_eq!(map_rusb_error(rusb::Error::NotFound), UsbError::NoSuchDevice);
        assert_eq!(map_rusb_error(rusb::Error::BadDescriptor), UsbError::Io);
        assert_eq!(map_rusb_error(rusb::Error::Overflow), UsbError::Io);
        assert_eq!(map_rusb_error(rusb::Error::Other), UsbError::Unknown);
    }

    #[test]
    fn test_defined_codes_map_to_distinct_members() {
        let defined = [
            LIBUSB_ERROR_INVALID_PARAM,
            LIBUSB_ERROR_NO_MEM,
            LIBUSB_ERROR_IO,
            LIBUSB_ERROR_TIMEOUT,
            LIBUSB_ERROR_NO_DEVICE,
            LIBUSB_ERROR_BUSY,
            LIBUSB_ERROR_ACCESS,
            LIBUSB_ERROR_NOT_SUPPORTED,
        ];

        let mapped: Vec<UsbError> = defined
            .iter()
            .map(|code| map_status(*code).unwrap_err())
            .collect();
        let distinct: HashSet<UsbError> = mapped.iter().copied().collect();

        assert_eq!(distinct.len(), defined.len());
        assert!(!distinct.contains(&UsbError::Unknown));
    }

    #[test]
    fn test_every_libusb_code_is_an_error() {
        for code in [
            LIBUSB_ERROR_IO,
            LIBUSB_ERROR_INVALID_PARAM,
            LIBUSB_ERROR_ACCESS,
            LIBUSB_ERROR_NO_DEVICE,
            LIBUSB_ERROR_NOT_FOUND,
            LIBUSB_ERROR_BUSY,
            LIBUSB_ERROR_TIMEOUT,
            LIBUSB_ERROR_OVERFLOW,
            LIBUSB_ERROR_PIPE,
            LIBUSB_ERROR_INTERRUPTED,
            LIBUSB_ERROR_NO_MEM,
            LIBUSB_ERROR_NOT_SUPPORTED,
        ] {
            let err = map_status(code).unwrap_err();
            assert_ne!(err, UsbError::Unknown, "code {} mapped to Unknown", code);
        }
    }

    #[test]
    fn test_unrecognized_codes_are_unknown() {
        assert_eq!(map_status(LIBUSB_ERROR_OTHER), Err(UsbError::Unknown));
        assert_eq!(map_status(-13), Err(UsbError::Unknown));
        assert_eq!(map_status(-1000), Err(UsbError::Unknown));
        assert_eq!(map_status(i32::MIN), Err(UsbError::Unknown));
    }

    #[test]
    fn test_byte_counts_pass_through() {
        assert_eq!(map_status(0), Ok(0));
        assert_eq!(map_status(64), Ok(64));
        assert_eq!(map_status(i32::MAX), Ok(i32::MAX as usize));
    }
}

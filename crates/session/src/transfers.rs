//! USB transfer execution
//!
//! Synchronous control and bulk transfers over a [`TransportHandle`]. The
//! direction comes from bit 7 of bmRequestType or of the endpoint address, and
//! the transfer length is always exactly the caller's buffer.

use crate::errors::map_rusb_error;
use crate::transport::TransportHandle;
use protocol::{Direction, UsbError};
use std::time::Duration;
use tracing::{debug, warn};

/// Default timeout for descriptor reads and probe transfers (1 second)
pub const DEFAULT_TIMEOUT_MS: u32 = 1000;

/// bmRequestType for a standard device-to-host request addressed to the device
pub const REQUEST_TYPE_STANDARD_IN: u8 = 0x80;
/// bRequest GET_DESCRIPTOR
pub const REQUEST_GET_DESCRIPTOR: u8 = 0x06;

/// wValue of a GET_DESCRIPTOR request: type in the high byte, index in the low byte
pub fn descriptor_value(descriptor_type: u8, index: u8) -> u16 {
    (descriptor_type as u16) << 8 | index as u16
}

pub fn timeout_from_ms(timeout_ms: u32) -> Duration {
    Duration::from_millis(timeout_ms as u64)
}

/// Execute a control transfer
///
/// IN transfers fill `buf`; OUT transfers send it. Returns the number of bytes
/// moved.
pub fn control_transfer<H: TransportHandle>(
    handle: &H,
    request_type: u8,
    request: u8,
    value: u16,
    index: u16,
    buf: &mut [u8],
    timeout: Duration,
) -> Result<usize, UsbError> {
    let direction = Direction::from_bit7(request_type);

    debug!(
        "Control transfer: request_type={:#x}, request={:#x}, value={:#x}, index={:#x}, len={}, {:?}",
        request_type,
        request,
        value,
        index,
        buf.len(),
        direction
    );

    let result = match direction {
        Direction::In => handle.read_control(request_type, request, value, index, buf, timeout),
        Direction::Out => handle.write_control(request_type, request, value, index, buf, timeout),
    };

    match result {
        Ok(len) => {
            debug!("Control transfer succeeded: {} bytes", len);
            Ok(len)
        }
        Err(e) => {
            warn!("Control transfer failed: {}", e);
            Err(map_rusb_error(e))
        }
    }
}

/// Execute a bulk transfer
///
/// A short transfer is reported through the returned length, not as an error.
pub fn bulk_transfer<H: TransportHandle>(
    handle: &H,
    endpoint: u8,
    buf: &mut [u8],
    timeout: Duration,
) -> Result<usize, UsbError> {
    let direction = Direction::from_bit7(endpoint);

    debug!(
        "Bulk transfer: endpoint={:#x}, len={}, timeout={}ms, {:?}",
        endpoint,
        buf.len(),
        timeout.as_millis(),
        direction
    );

    let result = match direction {
        Direction::In => handle.read_bulk(endpoint, buf, timeout),
        Direction::Out => handle.write_bulk(endpoint, buf, timeout),
    };

    match result {
        Ok(len) => {
            if len < buf.len() {
                debug!(
                    "Short bulk transfer on endpoint {:#x}: {} of {} bytes",
                    endpoint,
                    len,
                    buf.len()
                );
            }
            Ok(len)
        }
        Err(e) => {
            warn!("Bulk transfer on endpoint {:#x} failed: {}", endpoint, e);
            Err(map_rusb_error(e))
        }
    }
}

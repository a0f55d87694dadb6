//! Host session
//!
//! Owns one transport context. Enumerates attached devices, opens links and
//! pumps the transport's event loop. Links borrow the session, so a session
//! cannot be destroyed while any of its links is still open.

use crate::errors::map_rusb_error;
use crate::link::DeviceLink;
use crate::transport::{RusbTransport, TransportHandle, UsbTransport};
use protocol::{DeviceDescriptor, DeviceIdentity, Result, UsbError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Initial capacity of a scan result
const SCAN_INITIAL_CAPACITY: usize = 32;

/// One transport context and the devices reachable through it
pub struct HostSession<T: UsbTransport = RusbTransport> {
    transport: T,
}

impl HostSession<RusbTransport> {
    /// Create a session over a fresh libusb context
    ///
    /// Allocation failure is `ResourceExhausted`; any other init failure is `Io`.
    pub fn create() -> Result<Self> {
        let transport = RusbTransport::new().map_err(|e| {
            error!("Failed to initialize USB context: {}", e);
            match e {
                rusb::Error::NoMem => UsbError::ResourceExhausted,
                _ => UsbError::Io,
            }
        })?;

        info!("USB host session created");
        Ok(Self::with_transport(transport))
    }
}

impl<T: UsbTransport> HostSession<T> {
    /// Create a session over an already initialized transport
    pub fn with_transport(transport: T) -> Self {
        Self { transport }
    }

    /// Get the underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// List attached devices matching the filter
    ///
    /// A zero vendor or product id matches any value. Devices whose
    /// descriptor cannot be read are skipped.
    pub fn scan(&self, vendor_id: u16, product_id: u16) -> Result<Vec<DeviceIdentity>> {
        let devices = self.transport.devices().map_err(|e| {
            warn!("Failed to enumerate devices: {}", e);
            map_rusb_error(e)
        })?;

        let mut found = Vec::with_capacity(SCAN_INITIAL_CAPACITY);
        for device in &devices {
            let bus = self.transport.bus_number(device);
            let address = self.transport.address(device);

            let descriptor = match self.transport.device_descriptor(device) {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    debug!(
                        "Skipping device bus={}, addr={}: descriptor unreadable: {}",
                        bus, address, e
                    );
                    continue;
                }
            };

            let identity =
                DeviceIdentity::new(descriptor.vendor_id, descriptor.product_id, bus, address);
            if identity.matches(vendor_id, product_id) {
                found.push(identity);
            }
        }

        debug!(
            "Scan {:04x}:{:04x} matched {} of {} devices",
            vendor_id,
            product_id,
            found.len(),
            devices.len()
        );
        Ok(found)
    }

    /// Open a link to a previously scanned device
    ///
    /// The identity is re-resolved by exact (vendor, product, bus, address)
    /// match, since the address may have been reused after a replug.
    pub fn open(&self, identity: &DeviceIdentity) -> Result<DeviceLink<'_, T>> {
        let devices = self.transport.devices().map_err(map_rusb_error)?;

        let (device, descriptor) = devices
            .iter()
            .find_map(|device| self.resolve(device, identity))
            .ok_or_else(|| {
                warn!("Device {} is no longer attached", identity);
                UsbError::NoSuchDevice
            })?;

        let handle = self.transport.open(device).map_err(|e| {
            warn!("Failed to open device {}: {}", identity, e);
            map_rusb_error(e)
        })?;

        let mut resolved = identity.clone();
        resolved.manufacturer = read_manufacturer(&handle, &descriptor);

        info!(
            "Opened device {} ({})",
            resolved,
            resolved.manufacturer.as_deref().unwrap_or("unknown manufacturer")
        );
        Ok(DeviceLink::new(self, handle, resolved))
    }

    /// Drive pending transport completions
    ///
    /// A negative timeout blocks until an event arrives, zero returns
    /// immediately, and a positive value bounds the wait in milliseconds.
    pub fn poll(&self, timeout_ms: i32) -> Result<()> {
        let timeout = if timeout_ms < 0 {
            None
        } else {
            Some(Duration::from_millis(timeout_ms as u64))
        };

        match self.transport.handle_events(timeout) {
            Ok(()) => Ok(()),
            // A signal woke the event loop; nothing failed
            Err(rusb::Error::Interrupted) => Ok(()),
            Err(e) => {
                warn!("Event handling failed: {}", e);
                Err(map_rusb_error(e))
            }
        }
    }

    /// Release the transport context
    pub fn destroy(self) {
        info!("USB host session destroyed");
    }

    fn resolve<'d>(
        &self,
        device: &'d T::Device,
        identity: &DeviceIdentity,
    ) -> Option<(&'d T::Device, DeviceDescriptor)> {
        if self.transport.bus_number(device) != identity.bus_number
            || self.transport.address(device) != identity.device_address
        {
            return None;
        }

        let descriptor = self.transport.device_descriptor(device).ok()?;
        (descriptor.vendor_id == identity.vendor_id && descriptor.product_id == identity.product_id)
            .then_some((device, descriptor))
    }
}

/// Best-effort manufacturer lookup for diagnostics
fn read_manufacturer<H: TransportHandle>(
    handle: &H,
    descriptor: &DeviceDescriptor,
) -> Option<String> {
    let index = descriptor.manufacturer_string_index()?;
    match handle.read_string_ascii(index) {
        Ok(manufacturer) => Some(manufacturer),
        Err(e) => {
            debug!("Could not read manufacturer string: {}", e);
            None
        }
    }
}

//! Device link
//!
//! One open device. The link owns the transport handle and remembers, per
//! interface, what it has to undo: `claimed` means a release is owed and
//! `detached` means a kernel driver reattach is owed. Nothing else records
//! this, so every path that changes ownership updates these sets first.

use crate::cleanup::{CleanupReport, CleanupStep};
use crate::errors::map_rusb_error;
use crate::interfaces::{InterfaceSet, check_interface};
use crate::session::HostSession;
use crate::transfers::{
    REQUEST_GET_DESCRIPTOR, REQUEST_TYPE_STANDARD_IN, bulk_transfer, control_transfer,
    descriptor_value, timeout_from_ms,
};
use crate::transport::{TransportHandle, UsbTransport};
use protocol::{
    CONFIG_HEADER_LEN, DESCRIPTOR_TYPE_CONFIGURATION, DESCRIPTOR_TYPE_DEVICE,
    DEVICE_DESCRIPTOR_LEN, DeviceDescriptor, DeviceIdentity, Result, UsbError,
    config_total_length,
};
use std::fmt;
use tracing::{debug, info, warn};

/// An open device and the interfaces claimed through it
pub struct DeviceLink<'s, T: UsbTransport> {
    session: &'s HostSession<T>,
    handle: Option<T::Handle>,
    identity: DeviceIdentity,
    claimed: InterfaceSet,
    detached: InterfaceSet,
}

impl<'s, T: UsbTransport> DeviceLink<'s, T> {
    pub(crate) fn new(
        session: &'s HostSession<T>,
        handle: T::Handle,
        identity: DeviceIdentity,
    ) -> Self {
        Self {
            session,
            handle: Some(handle),
            identity,
            claimed: InterfaceSet::empty(),
            detached: InterfaceSet::empty(),
        }
    }

    /// The session this link was opened from
    pub fn session(&self) -> &'s HostSession<T> {
        self.session
    }

    /// Identity as resolved at open time, including the manufacturer if it could be read
    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn manufacturer(&self) -> Option<&str> {
        self.identity.manufacturer.as_deref()
    }

    /// Interfaces with a release owed
    pub fn claimed(&self) -> InterfaceSet {
        self.claimed
    }

    /// Interfaces with a kernel driver reattach owed
    pub fn detached(&self) -> InterfaceSet {
        self.detached
    }

    /// Claim an interface, optionally detaching an active kernel driver first
    ///
    /// Claiming an interface that is already claimed succeeds without touching
    /// the device. A successful detach is recorded before the claim is
    /// attempted, so a failed claim still gets its driver back on release or
    /// close.
    pub fn claim(&mut self, iface: u8, detach_kernel: bool) -> Result<()> {
        let iface = check_interface(iface)?;
        let handle = self.handle.as_mut().ok_or(UsbError::InvalidState)?;

        if self.claimed.contains(iface) {
            debug!("Interface {} on {} already claimed", iface, self.identity);
            return Ok(());
        }

        if detach_kernel && !self.detached.contains(iface) {
            match handle.kernel_driver_active(iface) {
                Ok(true) => match handle.detach_kernel_driver(iface) {
                    Ok(()) => {
                        self.detached.insert(iface);
                        debug!(
                            "Detached kernel driver from interface {} on {}",
                            iface, self.identity
                        );
                    }
                    Err(rusb::Error::NotSupported) => {
                        debug!("Kernel driver detach not supported on this platform");
                    }
                    Err(e) => {
                        warn!(
                            "Failed to detach kernel driver from interface {}: {}",
                            iface, e
                        );
                        return Err(map_rusb_error(e));
                    }
                },
                Ok(false) => {
                    debug!("No kernel driver active on interface {}", iface);
                }
                Err(e) => {
                    debug!(
                        "Could not check kernel driver status for interface {}: {}",
                        iface, e
                    );
                }
            }
        }

        handle.claim_interface(iface).map_err(|e| {
            warn!("Failed to claim interface {}: {}", iface, e);
            map_rusb_error(e)
        })?;
        self.claimed.insert(iface);

        debug!("Claimed interface {} on {}", iface, self.identity);
        Ok(())
    }

    /// Release an interface and hand it back to its kernel driver
    ///
    /// Releasing an interface that holds nothing is a no-op. If the release
    /// itself fails the error is returned and both records are kept, so the
    /// work is still owed on close. A failed reattach is reported in the
    /// returned report and does not keep either record set.
    pub fn release(&mut self, iface: u8) -> Result<CleanupReport> {
        let iface = check_interface(iface)?;
        let handle = self.handle.as_mut().ok_or(UsbError::InvalidState)?;
        let mut report = CleanupReport::default();

        if self.claimed.contains(iface) {
            handle.release_interface(iface).map_err(|e| {
                warn!("Failed to release interface {}: {}", iface, e);
                map_rusb_error(e)
            })?;
            self.claimed.remove(iface);
            debug!("Released interface {} on {}", iface, self.identity);
        }

        reattach_driver(handle, iface, &mut self.detached, &mut report);
        Ok(report)
    }

    /// Select an alternate setting on an interface
    pub fn set_alt(&mut self, iface: u8, alt: u8) -> Result<()> {
        let iface = check_interface(iface)?;
        let handle = self.handle.as_mut().ok_or(UsbError::InvalidState)?;

        handle.set_alternate_setting(iface, alt).map_err(|e| {
            warn!(
                "Failed to select alternate setting {} on interface {}: {}",
                alt, iface, e
            );
            map_rusb_error(e)
        })?;

        debug!("Interface {} switched to alternate setting {}", iface, alt);
        Ok(())
    }

    /// Synchronous control transfer of exactly `buf.len()` bytes
    pub fn control_transfer(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout_ms: u32,
    ) -> Result<usize> {
        let handle = self.handle()?;
        control_transfer(
            handle,
            request_type,
            request,
            value,
            index,
            buf,
            timeout_from_ms(timeout_ms),
        )
    }

    /// Synchronous bulk transfer; the returned count may be short
    pub fn bulk_transfer(&self, endpoint: u8, buf: &mut [u8], timeout_ms: u32) -> Result<usize> {
        let handle = self.handle()?;
        bulk_transfer(handle, endpoint, buf, timeout_from_ms(timeout_ms))
    }

    /// Read and decode the 18-byte device descriptor
    pub fn read_device_descriptor(&self, timeout_ms: u32) -> Result<DeviceDescriptor> {
        let mut buf = [0u8; DEVICE_DESCRIPTOR_LEN];
        let len = self.control_transfer(
            REQUEST_TYPE_STANDARD_IN,
            REQUEST_GET_DESCRIPTOR,
            descriptor_value(DESCRIPTOR_TYPE_DEVICE, 0),
            0,
            &mut buf,
            timeout_ms,
        )?;

        DeviceDescriptor::parse(&buf[..len]).map_err(|_| {
            warn!("Short device descriptor from {}: {} bytes", self.identity, len);
            UsbError::Io
        })
    }

    /// Read a full configuration descriptor block
    ///
    /// The 9-byte header comes first to learn wTotalLength, then the whole
    /// block is requested with exactly that length. A short second read is
    /// returned as-is; the parser stops at the truncation.
    pub fn read_config_descriptor(&self, config_index: u8, timeout_ms: u32) -> Result<Vec<u8>> {
        let value = descriptor_value(DESCRIPTOR_TYPE_CONFIGURATION, config_index);

        let mut header = [0u8; CONFIG_HEADER_LEN];
        let len = self.control_transfer(
            REQUEST_TYPE_STANDARD_IN,
            REQUEST_GET_DESCRIPTOR,
            value,
            0,
            &mut header,
            timeout_ms,
        )?;

        let total_length = config_total_length(&header[..len])
            .map(usize::from)
            .filter(|total| *total >= CONFIG_HEADER_LEN)
            .ok_or_else(|| {
                warn!(
                    "Invalid configuration header from {}: {:02x?}",
                    self.identity,
                    &header[..len]
                );
                UsbError::Io
            })?;

        let mut block = vec![0u8; total_length];
        let len = self.control_transfer(
            REQUEST_TYPE_STANDARD_IN,
            REQUEST_GET_DESCRIPTOR,
            value,
            0,
            &mut block,
            timeout_ms,
        )?;
        block.truncate(len);

        debug!(
            "Read configuration {} of {}: {} of {} bytes",
            config_index, self.identity, len, total_length
        );
        Ok(block)
    }

    /// Restore every interface and release the handle
    ///
    /// Secondary failures are logged and returned in the report; the link is
    /// gone either way.
    pub fn close(mut self) -> CleanupReport {
        self.teardown()
    }

    fn handle(&self) -> Result<&T::Handle> {
        self.handle.as_ref().ok_or(UsbError::InvalidState)
    }

    /// Release-equivalent cleanup for every interface with a record set.
    /// Safe to call repeatedly: once the handle is gone there is nothing to do.
    fn teardown(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();
        let Some(mut handle) = self.handle.take() else {
            return report;
        };

        let owed = self.claimed.union(self.detached);
        for iface in owed.iter() {
            if self.claimed.contains(iface) {
                if let Err(e) = handle.release_interface(iface) {
                    warn!("Failed to release interface {}: {}", iface, e);
                    report.push(iface, CleanupStep::Release, map_rusb_error(e));
                } else {
                    debug!("Released interface {} on {}", iface, self.identity);
                }
                self.claimed.remove(iface);
            }

            reattach_driver(&mut handle, iface, &mut self.detached, &mut report);
        }

        drop(handle);
        info!("Closed device {}", self.identity);
        report
    }
}

impl<T: UsbTransport> Drop for DeviceLink<'_, T> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            debug!("Device link {} dropped without close", self.identity);
            let report = self.teardown();
            for warning in report.warnings() {
                warn!("Cleanup of {}: {}", self.identity, warning);
            }
        }
    }
}

impl<T: UsbTransport> fmt::Debug for DeviceLink<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceLink")
            .field("identity", &self.identity)
            .field("open", &self.handle.is_some())
            .field("claimed", &self.claimed)
            .field("detached", &self.detached)
            .finish()
    }
}

/// Attempt the owed reattach for `iface`, if any
///
/// The record is cleared whether or not the attempt succeeds; a failure other
/// than "not supported" becomes a warning.
fn reattach_driver<H: TransportHandle>(
    handle: &mut H,
    iface: u8,
    detached: &mut InterfaceSet,
    report: &mut CleanupReport,
) {
    if !detached.contains(iface) {
        return;
    }

    match handle.attach_kernel_driver(iface) {
        Ok(()) => debug!("Reattached kernel driver to interface {}", iface),
        Err(rusb::Error::NotSupported) => {
            debug!("Kernel driver reattach not supported on this platform");
        }
        Err(e) => {
            warn!(
                "Could not reattach kernel driver to interface {}: {}",
                iface, e
            );
            report.push(iface, CleanupStep::Reattach, map_rusb_error(e));
        }
    }
    detached.remove(iface);
}

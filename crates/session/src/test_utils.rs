//! Test utilities for the session layer
//!
//! An in-memory bus that implements the transport traits. It models kernel
//! driver ownership and interface claims the way libusb reports them, records
//! every call, and can fail any operation on demand.
//!
//! # Example
//!
//! ```
//! use session::HostSession;
//! use session::test_utils::{MockCall, MockDevice, MockTransport};
//!
//! let transport = MockTransport::new()
//!     .with_device(MockDevice::new(1, 4, 0x1234, 0x5678).with_kernel_driver(0));
//! let session = HostSession::with_transport(transport.clone());
//!
//! let ids = session.scan(0x1234, 0).unwrap();
//! let mut link = session.open(&ids[0]).unwrap();
//! link.claim(0, true).unwrap();
//! assert!(link.close().is_clean());
//!
//! assert!(transport.calls().contains(&MockCall::Attach(0)));
//! ```

use crate::interfaces::InterfaceSet;
use crate::transfers::{REQUEST_GET_DESCRIPTOR, REQUEST_TYPE_STANDARD_IN};
use crate::transport::{TransportHandle, UsbTransport};
use protocol::{
    DESCRIPTOR_TYPE_CONFIGURATION, DESCRIPTOR_TYPE_DEVICE, DeviceDescriptor, Direction,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

/// Bus location of a mock device
pub type MockKey = (u8, u8);

/// Operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Enumerate,
    DeviceDescriptor,
    Open,
    HandleEvents,
    KernelDriverActive(u8),
    Detach(u8),
    Attach(u8),
    Claim(u8),
    Release(u8),
    SetAlt(u8),
    Control,
    Bulk,
    ReadString,
}

/// A call that reached the mock bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Open(MockKey),
    Close(MockKey),
    HandleEvents(Option<Duration>),
    KernelDriverActive(u8),
    Detach(u8),
    Attach(u8),
    Claim(u8),
    Release(u8),
    SetAlt(u8, u8),
    Control {
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        length: usize,
    },
    Bulk {
        endpoint: u8,
        length: usize,
    },
    ReadString(u8),
}

/// One simulated device
#[derive(Debug, Clone)]
pub struct MockDevice {
    pub bus_number: u8,
    pub address: u8,
    pub descriptor: DeviceDescriptor,
    pub manufacturer: Option<String>,
    /// Interfaces currently bound to a kernel driver
    pub kernel_drivers: InterfaceSet,
    /// Interfaces currently claimed through any handle
    pub claimed: InterfaceSet,
    /// Alternate setting per interface
    pub alt_settings: HashMap<u8, u8>,
    pub config_descriptor: Vec<u8>,
    /// Data returned by bulk IN reads, drained as it is read
    pub bulk_in: Vec<u8>,
    /// Data written by bulk OUT transfers
    pub bulk_out: Vec<u8>,
    /// Upper bound on a single bulk OUT write, to simulate short writes
    pub bulk_out_limit: Option<usize>,
    pub open_handles: usize,
    failures: HashMap<MockOp, rusb::Error>,
}

impl MockDevice {
    pub fn new(bus_number: u8, address: u8, vendor_id: u16, product_id: u16) -> Self {
        Self {
            bus_number,
            address,
            descriptor: DeviceDescriptor {
                usb_version: 0x0200,
                class: 0,
                subclass: 0,
                protocol: 0,
                max_packet_size0: 64,
                vendor_id,
                product_id,
                device_version: 0x0100,
                manufacturer_index: 0,
                product_index: 0,
                serial_number_index: 0,
                num_configurations: 1,
            },
            manufacturer: None,
            kernel_drivers: InterfaceSet::empty(),
            claimed: InterfaceSet::empty(),
            alt_settings: HashMap::new(),
            config_descriptor: Vec::new(),
            bulk_in: Vec::new(),
            bulk_out: Vec::new(),
            bulk_out_limit: None,
            open_handles: 0,
            failures: HashMap::new(),
        }
    }

    pub fn with_manufacturer(mut self, manufacturer: &str) -> Self {
        self.descriptor.manufacturer_index = 1;
        self.manufacturer = Some(manufacturer.to_string());
        self
    }

    /// Bind a kernel driver to `iface`
    pub fn with_kernel_driver(mut self, iface: u8) -> Self {
        self.kernel_drivers.insert(iface);
        self
    }

    pub fn with_config_descriptor(mut self, block: Vec<u8>) -> Self {
        self.config_descriptor = block;
        self
    }

    pub fn with_bulk_in(mut self, data: Vec<u8>) -> Self {
        self.bulk_in = data;
        self
    }

    pub fn with_bulk_out_limit(mut self, limit: usize) -> Self {
        self.bulk_out_limit = Some(limit);
        self
    }

    /// Make `op` fail with `err` until cleared
    pub fn failing(mut self, op: MockOp, err: rusb::Error) -> Self {
        self.failures.insert(op, err);
        self
    }

    fn key(&self) -> MockKey {
        (self.bus_number, self.address)
    }

    fn check(&self, op: MockOp) -> rusb::Result<()> {
        match self.failures.get(&op) {
            Some(err) => Err(*err),
            None => Ok(()),
        }
    }

    fn answer_standard_request(&self, value: u16, buf: &mut [u8]) -> rusb::Result<usize> {
        let source: Vec<u8> = match (value >> 8) as u8 {
            DESCRIPTOR_TYPE_DEVICE => self.descriptor.to_bytes().to_vec(),
            DESCRIPTOR_TYPE_CONFIGURATION if !self.config_descriptor.is_empty() => {
                self.config_descriptor.clone()
            }
            _ => return Err(rusb::Error::Pipe),
        };

        let len = source.len().min(buf.len());
        buf[..len].copy_from_slice(&source[..len]);
        Ok(len)
    }
}

#[derive(Debug, Default)]
struct MockBus {
    devices: Vec<MockDevice>,
    calls: Vec<MockCall>,
    failures: HashMap<MockOp, rusb::Error>,
}

impl MockBus {
    fn device_mut(&mut self, key: MockKey) -> rusb::Result<&mut MockDevice> {
        self.devices
            .iter_mut()
            .find(|d| d.key() == key)
            .ok_or(rusb::Error::NoDevice)
    }

    fn check(&self, op: MockOp) -> rusb::Result<()> {
        match self.failures.get(&op) {
            Some(err) => Err(*err),
            None => Ok(()),
        }
    }
}

/// In-memory transport
///
/// Clones share the same bus, so a test can keep one clone for inspection
/// while the session owns another.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    bus: Rc<RefCell<MockBus>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(self, device: MockDevice) -> Self {
        self.plug(device);
        self
    }

    /// Attach a device to the bus
    pub fn plug(&self, device: MockDevice) {
        self.bus.borrow_mut().devices.push(device);
    }

    /// Remove a device from the bus. Open handles start failing with `NoDevice`.
    pub fn unplug(&self, bus_number: u8, address: u8) {
        self.bus
            .borrow_mut()
            .devices
            .retain(|d| d.key() != (bus_number, address));
    }

    /// Make a bus-wide operation fail with `err`
    pub fn fail(&self, op: MockOp, err: rusb::Error) {
        self.bus.borrow_mut().failures.insert(op, err);
    }

    /// Make an operation on one device fail with `err`
    pub fn fail_device(&self, bus_number: u8, address: u8, op: MockOp, err: rusb::Error) {
        if let Ok(device) = self.bus.borrow_mut().device_mut((bus_number, address)) {
            device.failures.insert(op, err);
        }
    }

    /// Remove every injected failure
    pub fn clear_failures(&self) {
        let mut bus = self.bus.borrow_mut();
        bus.failures.clear();
        for device in &mut bus.devices {
            device.failures.clear();
        }
    }

    /// Snapshot of a device's current state
    pub fn device(&self, bus_number: u8, address: u8) -> Option<MockDevice> {
        self.bus
            .borrow()
            .devices
            .iter()
            .find(|d| d.key() == (bus_number, address))
            .cloned()
    }

    /// Every call recorded so far, in order
    pub fn calls(&self) -> Vec<MockCall> {
        self.bus.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.bus.borrow_mut().calls.clear();
    }
}

impl UsbTransport for MockTransport {
    type Device = MockKey;
    type Handle = MockHandle;

    fn devices(&self) -> rusb::Result<Vec<MockKey>> {
        let bus = self.bus.borrow();
        bus.check(MockOp::Enumerate)?;
        Ok(bus.devices.iter().map(MockDevice::key).collect())
    }

    fn bus_number(&self, device: &MockKey) -> u8 {
        device.0
    }

    fn address(&self, device: &MockKey) -> u8 {
        device.1
    }

    fn device_descriptor(&self, device: &MockKey) -> rusb::Result<DeviceDescriptor> {
        let mut bus = self.bus.borrow_mut();
        let device = bus.device_mut(*device)?;
        device.check(MockOp::DeviceDescriptor)?;
        Ok(device.descriptor)
    }

    fn open(&self, device: &MockKey) -> rusb::Result<MockHandle> {
        let mut bus = self.bus.borrow_mut();
        bus.calls.push(MockCall::Open(*device));
        bus.check(MockOp::Open)?;
        let state = bus.device_mut(*device)?;
        state.check(MockOp::Open)?;
        state.open_handles += 1;

        Ok(MockHandle {
            bus: Rc::clone(&self.bus),
            key: *device,
            claimed: InterfaceSet::empty(),
        })
    }

    fn handle_events(&self, timeout: Option<Duration>) -> rusb::Result<()> {
        let mut bus = self.bus.borrow_mut();
        bus.calls.push(MockCall::HandleEvents(timeout));
        bus.check(MockOp::HandleEvents)
    }
}

/// Open handle on a [`MockDevice`]
#[derive(Debug)]
pub struct MockHandle {
    bus: Rc<RefCell<MockBus>>,
    key: MockKey,
    /// Claims made through this handle, dropped when it closes
    claimed: InterfaceSet,
}

impl MockHandle {
    /// Record `call`, then run `f` against the device unless `op` is set to fail
    fn with_device<R>(
        &self,
        call: MockCall,
        op: MockOp,
        f: impl FnOnce(&mut MockDevice) -> rusb::Result<R>,
    ) -> rusb::Result<R> {
        let mut bus = self.bus.borrow_mut();
        bus.calls.push(call);
        let device = bus.device_mut(self.key)?;
        device.check(op)?;
        f(device)
    }
}

impl TransportHandle for MockHandle {
    fn claim_interface(&mut self, iface: u8) -> rusb::Result<()> {
        let owned = self.claimed;
        self.with_device(MockCall::Claim(iface), MockOp::Claim(iface), |device| {
            if device.kernel_drivers.contains(iface)
                || (device.claimed.contains(iface) && !owned.contains(iface))
            {
                return Err(rusb::Error::Busy);
            }
            device.claimed.insert(iface);
            Ok(())
        })?;
        self.claimed.insert(iface);
        Ok(())
    }

    fn release_interface(&mut self, iface: u8) -> rusb::Result<()> {
        let owned = self.claimed;
        self.with_device(MockCall::Release(iface), MockOp::Release(iface), |device| {
            if !owned.contains(iface) {
                return Err(rusb::Error::NotFound);
            }
            device.claimed.remove(iface);
            Ok(())
        })?;
        self.claimed.remove(iface);
        Ok(())
    }

    fn kernel_driver_active(&self, iface: u8) -> rusb::Result<bool> {
        self.with_device(
            MockCall::KernelDriverActive(iface),
            MockOp::KernelDriverActive(iface),
            |device| Ok(device.kernel_drivers.contains(iface)),
        )
    }

    fn detach_kernel_driver(&mut self, iface: u8) -> rusb::Result<()> {
        self.with_device(MockCall::Detach(iface), MockOp::Detach(iface), |device| {
            if !device.kernel_drivers.contains(iface) {
                return Err(rusb::Error::NotFound);
            }
            device.kernel_drivers.remove(iface);
            Ok(())
        })
    }

    fn attach_kernel_driver(&mut self, iface: u8) -> rusb::Result<()> {
        self.with_device(MockCall::Attach(iface), MockOp::Attach(iface), |device| {
            if device.kernel_drivers.contains(iface) || device.claimed.contains(iface) {
                return Err(rusb::Error::Busy);
            }
            device.kernel_drivers.insert(iface);
            Ok(())
        })
    }

    fn set_alternate_setting(&mut self, iface: u8, setting: u8) -> rusb::Result<()> {
        let owned = self.claimed;
        self.with_device(
            MockCall::SetAlt(iface, setting),
            MockOp::SetAlt(iface),
            |device| {
                if !owned.contains(iface) {
                    return Err(rusb::Error::NotFound);
                }
                device.alt_settings.insert(iface, setting);
                Ok(())
            },
        )
    }

    fn read_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> rusb::Result<usize> {
        let call = MockCall::Control {
            request_type,
            request,
            value,
            index,
            length: buf.len(),
        };
        self.with_device(call, MockOp::Control, |device| {
            if request_type == REQUEST_TYPE_STANDARD_IN && request == REQUEST_GET_DESCRIPTOR {
                device.answer_standard_request(value, buf)
            } else {
                // Unknown requests stall
                Err(rusb::Error::Pipe)
            }
        })
    }

    fn write_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &[u8],
        _timeout: Duration,
    ) -> rusb::Result<usize> {
        let call = MockCall::Control {
            request_type,
            request,
            value,
            index,
            length: buf.len(),
        };
        self.with_device(call, MockOp::Control, |_| Ok(buf.len()))
    }

    fn read_bulk(&self, endpoint: u8, buf: &mut [u8], _timeout: Duration) -> rusb::Result<usize> {
        debug_assert_eq!(Direction::from_bit7(endpoint), Direction::In);
        let call = MockCall::Bulk {
            endpoint,
            length: buf.len(),
        };
        self.with_device(call, MockOp::Bulk, |device| {
            if device.bulk_in.is_empty() {
                return Err(rusb::Error::Timeout);
            }
            let len = device.bulk_in.len().min(buf.len());
            buf[..len].copy_from_slice(&device.bulk_in[..len]);
            device.bulk_in = device.bulk_in.split_off(len);
            Ok(len)
        })
    }

    fn write_bulk(&self, endpoint: u8, buf: &[u8], _timeout: Duration) -> rusb::Result<usize> {
        debug_assert_eq!(Direction::from_bit7(endpoint), Direction::Out);
        let call = MockCall::Bulk {
            endpoint,
            length: buf.len(),
        };
        self.with_device(call, MockOp::Bulk, |device| {
            let len = device.bulk_out_limit.unwrap_or(buf.len()).min(buf.len());
            device.bulk_out.extend_from_slice(&buf[..len]);
            Ok(len)
        })
    }

    fn read_string_ascii(&self, index: u8) -> rusb::Result<String> {
        self.with_device(MockCall::ReadString(index), MockOp::ReadString, |device| {
            if index != 0 && index == device.descriptor.manufacturer_index {
                device.manufacturer.clone().ok_or(rusb::Error::InvalidParam)
            } else {
                Err(rusb::Error::InvalidParam)
            }
        })
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        let mut bus = self.bus.borrow_mut();
        bus.calls.push(MockCall::Close(self.key));
        if let Ok(device) = bus.device_mut(self.key) {
            // Closing the handle drops its claims, as the kernel does on fd close
            for iface in self.claimed.iter() {
                device.claimed.remove(iface);
            }
            device.open_handles = device.open_handles.saturating_sub(1);
        }
    }
}

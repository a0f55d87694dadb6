//! Bus transport capability
//!
//! The session layer only needs a handful of operations from the host
//! controller stack. They are collected in two traits so that any backend can
//! drive a [`HostSession`](crate::HostSession): the libusb backend below for
//! real hardware, or [`MockTransport`](crate::test_utils::MockTransport) in tests.
//!
//! Context teardown and handle close are expressed through `Drop`.

use protocol::DeviceDescriptor;
use rusb::{Context, Device, DeviceHandle, UsbContext};
use std::time::Duration;

/// Context-level operations: enumeration, open and the event pump
pub trait UsbTransport {
    /// A device reference from the enumeration list
    type Device;
    /// An open device
    type Handle: TransportHandle;

    /// Snapshot of currently attached devices
    fn devices(&self) -> rusb::Result<Vec<Self::Device>>;

    fn bus_number(&self, device: &Self::Device) -> u8;

    fn address(&self, device: &Self::Device) -> u8;

    /// Read the device descriptor of an enumerated device
    fn device_descriptor(&self, device: &Self::Device) -> rusb::Result<DeviceDescriptor>;

    fn open(&self, device: &Self::Device) -> rusb::Result<Self::Handle>;

    /// Drive pending completions. `None` blocks until an event arrives.
    fn handle_events(&self, timeout: Option<Duration>) -> rusb::Result<()>;
}

/// Per-handle operations
pub trait TransportHandle {
    fn claim_interface(&mut self, iface: u8) -> rusb::Result<()>;

    fn release_interface(&mut self, iface: u8) -> rusb::Result<()>;

    fn kernel_driver_active(&self, iface: u8) -> rusb::Result<bool>;

    fn detach_kernel_driver(&mut self, iface: u8) -> rusb::Result<()>;

    fn attach_kernel_driver(&mut self, iface: u8) -> rusb::Result<()>;

    fn set_alternate_setting(&mut self, iface: u8, setting: u8) -> rusb::Result<()>;

    fn read_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout: Duration,
    ) -> rusb::Result<usize>;

    fn write_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &[u8],
        timeout: Duration,
    ) -> rusb::Result<usize>;

    fn read_bulk(&self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> rusb::Result<usize>;

    fn write_bulk(&self, endpoint: u8, buf: &[u8], timeout: Duration) -> rusb::Result<usize>;

    /// Read a string descriptor, decoded as ASCII
    fn read_string_ascii(&self, index: u8) -> rusb::Result<String>;
}

/// libusb-backed transport
pub struct RusbTransport {
    context: Context,
}

impl RusbTransport {
    /// Initialize a fresh libusb context
    pub fn new() -> rusb::Result<Self> {
        Ok(Self {
            context: Context::new()?,
        })
    }

    pub fn context(&self) -> &Context {
        &self.context
    }
}

impl UsbTransport for RusbTransport {
    type Device = Device<Context>;
    type Handle = DeviceHandle<Context>;

    fn devices(&self) -> rusb::Result<Vec<Self::Device>> {
        Ok(self.context.devices()?.iter().collect())
    }

    fn bus_number(&self, device: &Self::Device) -> u8 {
        device.bus_number()
    }

    fn address(&self, device: &Self::Device) -> u8 {
        device.address()
    }

    fn device_descriptor(&self, device: &Self::Device) -> rusb::Result<DeviceDescriptor> {
        let desc = device.device_descriptor()?;

        Ok(DeviceDescriptor {
            usb_version: version_to_bcd(desc.usb_version()),
            class: desc.class_code(),
            subclass: desc.sub_class_code(),
            protocol: desc.protocol_code(),
            max_packet_size0: desc.max_packet_size(),
            vendor_id: desc.vendor_id(),
            product_id: desc.product_id(),
            device_version: version_to_bcd(desc.device_version()),
            manufacturer_index: desc.manufacturer_string_index().unwrap_or(0),
            product_index: desc.product_string_index().unwrap_or(0),
            serial_number_index: desc.serial_number_string_index().unwrap_or(0),
            num_configurations: desc.num_configurations(),
        })
    }

    fn open(&self, device: &Self::Device) -> rusb::Result<Self::Handle> {
        device.open()
    }

    fn handle_events(&self, timeout: Option<Duration>) -> rusb::Result<()> {
        self.context.handle_events(timeout)
    }
}

impl<C: UsbContext> TransportHandle for DeviceHandle<C> {
    fn claim_interface(&mut self, iface: u8) -> rusb::Result<()> {
        DeviceHandle::claim_interface(self, iface)
    }

    fn release_interface(&mut self, iface: u8) -> rusb::Result<()> {
        DeviceHandle::release_interface(self, iface)
    }

    fn kernel_driver_active(&self, iface: u8) -> rusb::Result<bool> {
        DeviceHandle::kernel_driver_active(self, iface)
    }

    fn detach_kernel_driver(&mut self, iface: u8) -> rusb::Result<()> {
        DeviceHandle::detach_kernel_driver(self, iface)
    }

    fn attach_kernel_driver(&mut self, iface: u8) -> rusb::Result<()> {
        DeviceHandle::attach_kernel_driver(self, iface)
    }

    fn set_alternate_setting(&mut self, iface: u8, setting: u8) -> rusb::Result<()> {
        DeviceHandle::set_alternate_setting(self, iface, setting)
    }

    fn read_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout: Duration,
    ) -> rusb::Result<usize> {
        DeviceHandle::read_control(self, request_type, request, value, index, buf, timeout)
    }

    fn write_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &[u8],
        timeout: Duration,
    ) -> rusb::Result<usize> {
        DeviceHandle::write_control(self, request_type, request, value, index, buf, timeout)
    }

    fn read_bulk(&self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> rusb::Result<usize> {
        DeviceHandle::read_bulk(self, endpoint, buf, timeout)
    }

    fn write_bulk(&self, endpoint: u8, buf: &[u8], timeout: Duration) -> rusb::Result<usize> {
        DeviceHandle::write_bulk(self, endpoint, buf, timeout)
    }

    fn read_string_ascii(&self, index: u8) -> rusb::Result<String> {
        self.read_string_descriptor_ascii(index)
    }
}

/// Convert rusb's decoded version back into the BCD form of the descriptor
fn version_to_bcd(version: rusb::Version) -> u16 {
    let major = version.major() as u16;
    ((major / 10) << 12)
        | ((major % 10) << 8)
        | ((version.minor() as u16 & 0x0f) << 4)
        | (version.sub_minor() as u16 & 0x0f)
}

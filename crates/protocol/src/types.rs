//! Device identity and endpoint type definitions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Snapshot of a device taken at scan time
///
/// The (bus, address) pair can be reused by the host after a replug, so an
/// identity must be re-resolved against the live device list before opening.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// USB Vendor ID
    pub vendor_id: u16,
    /// USB Product ID
    pub product_id: u16,
    /// Bus number on the host
    pub bus_number: u8,
    /// Device address on the bus
    pub device_address: u8,
    /// Manufacturer string, if it has been read
    #[serde(default)]
    pub manufacturer: Option<String>,
}

impl DeviceIdentity {
    pub fn new(vendor_id: u16, product_id: u16, bus_number: u8, device_address: u8) -> Self {
        Self {
            vendor_id,
            product_id,
            bus_number,
            device_address,
            manufacturer: None,
        }
    }

    /// Check the vendor/product filter, where 0 matches anything
    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        (vendor_id == 0 || self.vendor_id == vendor_id)
            && (product_id == 0 || self.product_id == product_id)
    }

    /// Exact match on ids and bus location. The cached manufacturer is ignored.
    pub fn same_device(&self, other: &DeviceIdentity) -> bool {
        self.vendor_id == other.vendor_id
            && self.product_id == other.product_id
            && self.bus_number == other.bus_number
            && self.device_address == other.device_address
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:03}:{:03} {:04x}:{:04x}",
            self.bus_number, self.device_address, self.vendor_id, self.product_id
        )
    }
}

/// Transfer direction relative to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Host to device
    Out,
    /// Device to host
    In,
}

impl Direction {
    /// Direction encoded in bit 7 of an endpoint address or bmRequestType
    pub fn from_bit7(byte: u8) -> Self {
        if byte & 0x80 != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }
}

/// Endpoint transfer type, bits 1..0 of bmAttributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferType {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

impl TransferType {
    /// Mask selecting the transfer type from an endpoint's bmAttributes
    pub const MASK: u8 = 0x03;

    pub fn from_attributes(attributes: u8) -> Self {
        match attributes & Self::MASK {
            0 => TransferType::Control,
            1 => TransferType::Isochronous,
            2 => TransferType::Bulk,
            _ => TransferType::Interrupt,
        }
    }
}

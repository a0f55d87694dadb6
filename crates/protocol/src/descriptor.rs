//! USB descriptor formats
//!
//! Decodes the fixed 18-byte device descriptor and walks the variable-length
//! configuration descriptor chain. The chain comes straight from the device,
//! so the walker never trusts a declared length beyond the buffer it was given.

use crate::error::{Result, UsbError};
use crate::types::{Direction, TransferType};
use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

/// bDescriptorType of a device descriptor
pub const DESCRIPTOR_TYPE_DEVICE: u8 = 1;
/// bDescriptorType of a configuration descriptor
pub const DESCRIPTOR_TYPE_CONFIGURATION: u8 = 2;
/// bDescriptorType of an interface descriptor
pub const DESCRIPTOR_TYPE_INTERFACE: u8 = 4;
/// bDescriptorType of an endpoint descriptor
pub const DESCRIPTOR_TYPE_ENDPOINT: u8 = 5;

/// Size of a device descriptor
pub const DEVICE_DESCRIPTOR_LEN: usize = 18;
/// Size of the configuration header that carries wTotalLength
pub const CONFIG_HEADER_LEN: usize = 9;

const INTERFACE_MIN_LEN: usize = 9;
const ENDPOINT_MIN_LEN: usize = 7;

/// Decoded standard device descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// bcdUSB
    pub usb_version: u16,
    pub class: u8,
    pub subclass: u8,
    pub protocol: u8,
    /// Max packet size for endpoint 0
    pub max_packet_size0: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    /// bcdDevice
    pub device_version: u16,
    pub manufacturer_index: u8,
    pub product_index: u8,
    pub serial_number_index: u8,
    pub num_configurations: u8,
}

impl DeviceDescriptor {
    /// Decode an 18-byte device descriptor
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < DEVICE_DESCRIPTOR_LEN || bytes[1] != DESCRIPTOR_TYPE_DEVICE {
            return Err(UsbError::InvalidArgument);
        }

        Ok(Self {
            usb_version: LittleEndian::read_u16(&bytes[2..4]),
            class: bytes[4],
            subclass: bytes[5],
            protocol: bytes[6],
            max_packet_size0: bytes[7],
            vendor_id: LittleEndian::read_u16(&bytes[8..10]),
            product_id: LittleEndian::read_u16(&bytes[10..12]),
            device_version: LittleEndian::read_u16(&bytes[12..14]),
            manufacturer_index: bytes[14],
            product_index: bytes[15],
            serial_number_index: bytes[16],
            num_configurations: bytes[17],
        })
    }

    /// Encode back into the on-wire layout
    pub fn to_bytes(&self) -> [u8; DEVICE_DESCRIPTOR_LEN] {
        let mut out = [0u8; DEVICE_DESCRIPTOR_LEN];
        out[0] = DEVICE_DESCRIPTOR_LEN as u8;
        out[1] = DESCRIPTOR_TYPE_DEVICE;
        LittleEndian::write_u16(&mut out[2..4], self.usb_version);
        out[4] = self.class;
        out[5] = self.subclass;
        out[6] = self.protocol;
        out[7] = self.max_packet_size0;
        LittleEndian::write_u16(&mut out[8..10], self.vendor_id);
        LittleEndian::write_u16(&mut out[10..12], self.product_id);
        LittleEndian::write_u16(&mut out[12..14], self.device_version);
        out[14] = self.manufacturer_index;
        out[15] = self.product_index;
        out[16] = self.serial_number_index;
        out[17] = self.num_configurations;
        out
    }

    /// String index of the manufacturer, if the device has one
    pub fn manufacturer_string_index(&self) -> Option<u8> {
        (self.manufacturer_index != 0).then_some(self.manufacturer_index)
    }
}

/// wTotalLength from a configuration header, or `None` if the header is short
/// or is not a configuration descriptor
pub fn config_total_length(header: &[u8]) -> Option<u16> {
    if header.len() < 4 || header[1] != DESCRIPTOR_TYPE_CONFIGURATION {
        return None;
    }
    Some(LittleEndian::read_u16(&header[2..4]))
}

/// One record of a configuration descriptor chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigDescriptorRecord {
    Configuration {
        total_length: u16,
        num_interfaces: u8,
    },
    Interface {
        number: u8,
        alt_setting: u8,
        num_endpoints: u8,
        class: u8,
        subclass: u8,
        protocol: u8,
    },
    Endpoint {
        address: u8,
        direction: Direction,
        transfer_type: TransferType,
        max_packet_size: u16,
        interval: u8,
    },
    /// A descriptor this parser does not decode, or one too short for its type
    Unknown { descriptor_type: u8, length: u8 },
}

impl ConfigDescriptorRecord {
    fn decode(descriptor_type: u8, record: &[u8]) -> Self {
        let length = record.len();
        match descriptor_type {
            DESCRIPTOR_TYPE_CONFIGURATION if length >= CONFIG_HEADER_LEN => {
                ConfigDescriptorRecord::Configuration {
                    total_length: LittleEndian::read_u16(&record[2..4]),
                    num_interfaces: record[4],
                }
            }
            DESCRIPTOR_TYPE_INTERFACE if length >= INTERFACE_MIN_LEN => {
                ConfigDescriptorRecord::Interface {
                    number: record[2],
                    alt_setting: record[3],
                    num_endpoints: record[4],
                    class: record[5],
                    subclass: record[6],
                    protocol: record[7],
                }
            }
            DESCRIPTOR_TYPE_ENDPOINT if length >= ENDPOINT_MIN_LEN => {
                let address = record[2];
                ConfigDescriptorRecord::Endpoint {
                    address,
                    direction: Direction::from_bit7(address),
                    transfer_type: TransferType::from_attributes(record[3]),
                    max_packet_size: LittleEndian::read_u16(&record[4..6]),
                    interval: record[6],
                }
            }
            _ => ConfigDescriptorRecord::Unknown {
                descriptor_type,
                length: length as u8,
            },
        }
    }
}

/// Walks a configuration descriptor block record by record
///
/// Stops at the first zero length or at a record that would run past the end
/// of the buffer; everything decoded up to that point has already been
/// yielded. Each step advances by a non-zero length, so the walk ends within
/// `bytes.len()` steps.
#[derive(Debug, Clone)]
pub struct ConfigDescriptorIter<'a> {
    bytes: &'a [u8],
    offset: usize,
    truncated: bool,
}

impl<'a> ConfigDescriptorIter<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            offset: 0,
            truncated: false,
        }
    }

    /// Bytes consumed by the records yielded so far
    pub fn consumed(&self) -> usize {
        self.offset
    }

    /// Whether the walk stopped on a zero or overrunning length
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

impl Iterator for ConfigDescriptorIter<'_> {
    type Item = ConfigDescriptorRecord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.truncated || self.offset + 2 > self.bytes.len() {
            return None;
        }

        let length = self.bytes[self.offset] as usize;
        let descriptor_type = self.bytes[self.offset + 1];

        if length == 0 || self.offset + length > self.bytes.len() {
            self.truncated = true;
            return None;
        }

        let record = &self.bytes[self.offset..self.offset + length];
        self.offset += length;
        Some(ConfigDescriptorRecord::decode(descriptor_type, record))
    }
}

/// Decode a full configuration descriptor block
pub fn parse_config_descriptor(bytes: &[u8]) -> Vec<ConfigDescriptorRecord> {
    ConfigDescriptorIter::new(bytes).collect()
}

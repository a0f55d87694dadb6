//! Text and JSON rendering of probe results

use anyhow::Result;
use protocol::{ConfigDescriptorIter, ConfigDescriptorRecord, DeviceDescriptor, DeviceIdentity};
use serde::Serialize;
use std::io::Write;

/// Everything learned about one opened device
#[derive(Debug, Serialize)]
pub struct ProbeReport {
    pub device: DeviceIdentity,
    pub descriptor: DeviceDescriptor,
    pub config_index: u8,
    /// Raw length of the configuration block as read from the device
    pub config_length: usize,
    pub configuration: Vec<ConfigDescriptorRecord>,
    /// The walk stopped on a malformed record before the end of the block
    pub truncated: bool,
    pub claimed_interface: Option<u8>,
    /// Secondary failures from release and close
    pub warnings: Vec<String>,
}

impl ProbeReport {
    pub fn new(
        device: DeviceIdentity,
        descriptor: DeviceDescriptor,
        config_index: u8,
        block: &[u8],
    ) -> Self {
        let mut walker = ConfigDescriptorIter::new(block);
        let configuration: Vec<_> = walker.by_ref().collect();

        Self {
            device,
            descriptor,
            config_index,
            config_length: block.len(),
            configuration,
            truncated: walker.is_truncated(),
            claimed_interface: None,
            warnings: Vec::new(),
        }
    }
}

/// Print the scan result
pub fn write_devices<W: Write>(out: &mut W, devices: &[DeviceIdentity], json: bool) -> Result<()> {
    if json {
        serde_json::to_writer_pretty(&mut *out, devices)?;
        writeln!(out)?;
        return Ok(());
    }

    if devices.is_empty() {
        writeln!(out, "No USB devices found.")?;
        return Ok(());
    }

    writeln!(out, "Found {} USB device(s):", devices.len())?;
    for device in devices {
        writeln!(
            out,
            "  Bus {:03} Device {:03}: ID {:04x}:{:04x}",
            device.bus_number, device.device_address, device.vendor_id, device.product_id
        )?;
    }
    Ok(())
}

/// Print a full probe report
pub fn write_report<W: Write>(out: &mut W, report: &ProbeReport, json: bool) -> Result<()> {
    if json {
        serde_json::to_writer_pretty(&mut *out, report)?;
        writeln!(out)?;
        return Ok(());
    }

    writeln!(
        out,
        "Device {} - {}",
        report.device,
        report
            .device
            .manufacturer
            .as_deref()
            .unwrap_or("Unknown Manufacturer")
    )?;
    write_device_descriptor(out, &report.descriptor)?;

    writeln!(
        out,
        "Configuration {} ({} bytes):",
        report.config_index, report.config_length
    )?;
    for record in &report.configuration {
        write_record(out, record)?;
    }
    if report.truncated {
        writeln!(out, "  (descriptor chain truncated)")?;
    }

    if let Some(iface) = report.claimed_interface {
        writeln!(out, "Claimed and released interface {}", iface)?;
    }
    for warning in &report.warnings {
        writeln!(out, "warning: {}", warning)?;
    }
    Ok(())
}

fn write_device_descriptor<W: Write>(out: &mut W, d: &DeviceDescriptor) -> Result<()> {
    writeln!(out, "Device Descriptor:")?;
    writeln!(out, "  bcdUSB          {}", bcd(d.usb_version))?;
    writeln!(
        out,
        "  class/sub/proto {:02x}/{:02x}/{:02x}",
        d.class, d.subclass, d.protocol
    )?;
    writeln!(out, "  bMaxPacketSize0 {}", d.max_packet_size0)?;
    writeln!(out, "  idVendor        0x{:04x}", d.vendor_id)?;
    writeln!(out, "  idProduct       0x{:04x}", d.product_id)?;
    writeln!(out, "  bcdDevice       {}", bcd(d.device_version))?;
    writeln!(out, "  bNumConfigs     {}", d.num_configurations)?;
    Ok(())
}

fn write_record<W: Write>(out: &mut W, record: &ConfigDescriptorRecord) -> Result<()> {
    match record {
        ConfigDescriptorRecord::Configuration {
            total_length,
            num_interfaces,
        } => writeln!(
            out,
            "  CONFIG: wTotalLength={}, bNumInterfaces={}",
            total_length, num_interfaces
        )?,
        ConfigDescriptorRecord::Interface {
            number,
            alt_setting,
            num_endpoints,
            class,
            subclass,
            protocol,
        } => writeln!(
            out,
            "  INTERFACE {}: alt={}, endpoints={}, class={:02x}/{:02x}/{:02x}",
            number, alt_setting, num_endpoints, class, subclass, protocol
        )?,
        ConfigDescriptorRecord::Endpoint {
            address,
            direction,
            transfer_type,
            max_packet_size,
            interval,
        } => writeln!(
            out,
            "    ENDPOINT 0x{:02x}: {:?} {:?}, wMaxPacketSize={}, bInterval={}",
            address, direction, transfer_type, max_packet_size, interval
        )?,
        ConfigDescriptorRecord::Unknown {
            descriptor_type,
            length,
        } => writeln!(
            out,
            "  DESCRIPTOR type=0x{:02x}, length={}",
            descriptor_type, length
        )?,
    }
    Ok(())
}

fn bcd(value: u16) -> String {
    format!("{:x}.{:02x}", value >> 8, value & 0xff)
}

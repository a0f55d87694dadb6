//! Protocol library for hostlink
//!
//! This crate defines the pieces of the USB wire format the session layer
//! consumes, plus the error taxonomy every session operation reports:
//! - [`UsbError`], the single error enum shared by the transport mapper and the public API
//! - [`DeviceIdentity`], the scan-time snapshot of an attached device
//! - [`DeviceDescriptor`] and the configuration descriptor walker
//!
//! # Example
//!
//! ```
//! use protocol::{ConfigDescriptorRecord, parse_config_descriptor};
//!
//! let block = [9, 2, 9, 0, 0, 1, 0, 0x80, 50];
//! let records = parse_config_descriptor(&block);
//!
//! assert_eq!(
//!     records,
//!     vec![ConfigDescriptorRecord::Configuration { total_length: 9, num_interfaces: 0 }]
//! );
//! ```

pub mod descriptor;
pub mod error;
pub mod types;

pub use descriptor::{
    CONFIG_HEADER_LEN, ConfigDescriptorIter, ConfigDescriptorRecord, DESCRIPTOR_TYPE_CONFIGURATION,
    DESCRIPTOR_TYPE_DEVICE, DESCRIPTOR_TYPE_ENDPOINT, DESCRIPTOR_TYPE_INTERFACE,
    DEVICE_DESCRIPTOR_LEN, DeviceDescriptor, config_total_length, parse_config_descriptor,
};
pub use error::{Result, UsbError, error_str};
pub use types::{DeviceIdentity, Direction, TransferType};

//! Integration tests for configuration descriptor parsing
//!
//! Covers well-formed chains, truncation, undecoded descriptor types and the
//! device descriptor layout.

use protocol::{
    ConfigDescriptorIter, ConfigDescriptorRecord, DeviceDescriptor, Direction, TransferType,
    parse_config_descriptor,
};

/// Configuration (wTotalLength 25, one interface), vendor interface 0, bulk IN endpoint 0x81
fn bulk_in_config() -> Vec<u8> {
    vec![
        // configuration
        9, 2, 25, 0, 1, 1, 0, 0x80, 50, //
        // interface
        9, 4, 0, 0, 1, 255, 0, 0, 0, //
        // endpoint
        7, 5, 0x81, 0x02, 64, 0, 0,
    ]
}

mod well_formed {
    use super::*;

    #[test]
    fn test_empty_block() {
        assert!(parse_config_descriptor(&[]).is_empty());
    }

    #[test]
    fn test_configuration_interface_endpoint() {
        let block = bulk_in_config();
        let mut iter = ConfigDescriptorIter::new(&block);
        let records: Vec<_> = iter.by_ref().collect();

        assert_eq!(
            records,
            vec![
                ConfigDescriptorRecord::Configuration {
                    total_length: 25,
                    num_interfaces: 1,
                },
                ConfigDescriptorRecord::Interface {
                    number: 0,
                    alt_setting: 0,
                    num_endpoints: 1,
                    class: 255,
                    subclass: 0,
                    protocol: 0,
                },
                ConfigDescriptorRecord::Endpoint {
                    address: 0x81,
                    direction: Direction::In,
                    transfer_type: TransferType::Bulk,
                    max_packet_size: 64,
                    interval: 0,
                },
            ]
        );
        assert_eq!(iter.consumed(), 25);
        assert!(!iter.is_truncated());
    }

    #[test]
    fn test_out_interrupt_endpoint_with_large_packet() {
        let block = [7, 5, 0x02, 0x03, 0x00, 0x02, 10];
        assert_eq!(
            parse_config_descriptor(&block),
            vec![ConfigDescriptorRecord::Endpoint {
                address: 0x02,
                direction: Direction::Out,
                transfer_type: TransferType::Interrupt,
                max_packet_size: 512,
                interval: 10,
            }]
        );
    }

    #[test]
    fn test_unknown_descriptor_is_reported() {
        // HID class descriptor between interface and endpoint
        let mut block = bulk_in_config();
        let hid = [9, 0x21, 0x11, 0x01, 0, 1, 0x22, 0x3f, 0];
        block.splice(18..18, hid);

        let records = parse_config_descriptor(&block);
        assert_eq!(records.len(), 4);
        assert_eq!(
            records[2],
            ConfigDescriptorRecord::Unknown {
                descriptor_type: 0x21,
                length: 9,
            }
        );
        assert!(matches!(
            records[3],
            ConfigDescriptorRecord::Endpoint { address: 0x81, .. }
        ));
    }

    #[test]
    fn test_short_endpoint_is_unknown() {
        let block = [6, 5, 0x81, 0x02, 64, 0];
        assert_eq!(
            parse_config_descriptor(&block),
            vec![ConfigDescriptorRecord::Unknown {
                descriptor_type: 5,
                length: 6,
            }]
        );
    }
}

mod truncation {
    use super::*;

    #[test]
    fn test_zero_length_stops_walk() {
        let mut block = bulk_in_config();
        // Corrupt the interface record's length byte
        block[9] = 0;

        let mut iter = ConfigDescriptorIter::new(&block);
        let records: Vec<_> = iter.by_ref().collect();
        assert_eq!(records.len(), 1);
        assert!(matches!(
            records[0],
            ConfigDescriptorRecord::Configuration { .. }
        ));
        assert!(iter.is_truncated());
        assert_eq!(iter.consumed(), 9);
    }

    #[test]
    fn test_overrunning_length_stops_before_record() {
        let block = bulk_in_config();
        // Drop the last byte of the endpoint
        let short = &block[..24];

        let mut iter = ConfigDescriptorIter::new(short);
        let records: Vec<_> = iter.by_ref().collect();
        assert_eq!(records.len(), 2);
        assert!(iter.is_truncated());
        assert_eq!(iter.consumed(), 18);
    }

    #[test]
    fn test_declared_length_larger_than_block() {
        let block = [200, 2, 9, 0, 1, 1, 0, 0x80, 50];
        assert!(parse_config_descriptor(&block).is_empty());
    }

    #[test]
    fn test_iterator_is_fused_after_truncation() {
        let block = [0, 2, 9, 0];
        let mut iter = ConfigDescriptorIter::new(&block);
        assert_eq!(iter.next(), None);
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn test_walk_terminates_on_garbage() {
        let garbage: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let mut iter = ConfigDescriptorIter::new(&garbage);
        let mut steps = 0;
        while iter.next().is_some() {
            steps += 1;
            assert!(steps <= garbage.len());
        }
        assert!(iter.consumed() <= garbage.len());
    }
}

mod device_descriptor {
    use super::*;

    #[test]
    fn test_little_endian_ids() {
        let bytes = [
            18, 1, 0x10, 0x02, 0xef, 0x02, 0x01, 64, 0xf9, 0x04, 0x42, 0x00, 0x00, 0x01, 1, 2,
            3, 1,
        ];
        let desc = DeviceDescriptor::parse(&bytes).unwrap();
        assert_eq!(desc.usb_version, 0x0210);
        assert_eq!(desc.class, 0xef);
        assert_eq!(desc.subclass, 0x02);
        assert_eq!(desc.protocol, 0x01);
        assert_eq!(desc.vendor_id, 0x04f9);
        assert_eq!(desc.product_id, 0x0042);
        assert_eq!(desc.device_version, 0x0100);
        assert_eq!(desc.serial_number_index, 3);
    }

    #[test]
    fn test_no_manufacturer_string() {
        let mut bytes = [0u8; 18];
        bytes[0] = 18;
        bytes[1] = 1;
        let desc = DeviceDescriptor::parse(&bytes).unwrap();
        assert_eq!(desc.manufacturer_string_index(), None);
    }
}

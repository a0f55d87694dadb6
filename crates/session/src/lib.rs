//! Host-side USB session layer
//!
//! This crate handles everything between "which devices are attached" and
//! "bytes on an endpoint":
//! - Device enumeration with vendor/product filtering ([`HostSession::scan`])
//! - Opening an exclusive link to one device ([`HostSession::open`])
//! - Interface claims with kernel driver detach and guaranteed reattach ([`DeviceLink`])
//! - Synchronous control and bulk transfers
//! - Mapping transport status codes into [`protocol::UsbError`]
//!
//! Every call blocks until the transport completes or its timeout elapses.
//! There is no background worker and no internal locking.
//!
//! # Example
//!
//! ```no_run
//! use session::HostSession;
//!
//! # fn main() -> Result<(), protocol::UsbError> {
//! let session = HostSession::create()?;
//! for identity in session.scan(0x1234, 0)? {
//!     let mut link = session.open(&identity)?;
//!     link.claim(0, true)?;
//!     let block = link.read_config_descriptor(0, 1000)?;
//!     println!("{:?}", protocol::parse_config_descriptor(&block));
//!     for warning in link.close().warnings() {
//!         eprintln!("{}", warning);
//!     }
//! }
//! session.destroy();
//! # Ok(())
//! # }
//! ```

pub mod cleanup;
pub mod errors;
pub mod interfaces;
pub mod link;
pub mod session;
pub mod test_utils;
pub mod transfers;
pub mod transport;

pub use cleanup::{CleanupReport, CleanupStep, CleanupWarning};
pub use errors::{map_rusb_error, map_status};
pub use interfaces::{InterfaceSet, MAX_INTERFACES};
pub use link::DeviceLink;
pub use session::HostSession;
pub use transfers::DEFAULT_TIMEOUT_MS;
pub use transport::{RusbTransport, TransportHandle, UsbTransport};

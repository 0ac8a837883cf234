//! skyportal: find, open and drive USB toy portals
//!
//! The crate is layered the same way a session is built:
//!
//! - [`transport`]: the USB interface everything else is written against
//! - [`discovery`]: pick portals out of the attached devices
//! - [`session`]: open/reset/claim/activate handshake and framed transfers
//! - [`usb`]: the libusb transport and the worker thread owning sessions
//! - [`client`]: async front end for code on the Tokio runtime
//!
//! # Example
//!
//! ```
//! use portal::discovery;
//! use portal::session::{self, SessionSettings};
//! use portal::test_utils::{StubDevice, StubTransport};
//! use protocol::{DeviceRegistry, PortalCommands};
//!
//! let transport = StubTransport::new(vec![StubDevice::new(0x1430, 0x1f17)]);
//! let registry = DeviceRegistry::builtin();
//!
//! let descriptor = discovery::find(&transport, &registry, 0).unwrap().unwrap();
//! let live = session::open(descriptor, &PortalCommands, SessionSettings::default()).unwrap();
//! live.send(&PortalCommands.color(0xff, 0x00, 0x00)).unwrap();
//! live.close().unwrap();
//! ```

pub mod client;
pub mod config;
pub mod discovery;
pub mod session;
pub mod test_utils;
pub mod transport;
pub mod usb;

pub use client::{PortalClient, SessionHandle};
pub use config::PortalConfig;
pub use session::{LiveSession, PortalDescriptor, SessionSettings};

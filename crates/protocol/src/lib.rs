//! Protocol library for skyportal
//!
//! This crate holds everything about talking to a portal that does not
//! depend on a live USB stack: the device registry (which vendor/product
//! pairs are portals and how each product frames its commands), frame
//! construction, the default command builder, and the error type shared
//! by the session layer and the async client.
//!
//! # Example
//!
//! ```
//! use protocol::{DeviceRegistry, PORTAL_VENDOR_ID, WIRED_PRODUCT_ID};
//!
//! let registry = DeviceRegistry::builtin();
//! assert!(registry.accepts(PORTAL_VENDOR_ID, WIRED_PRODUCT_ID));
//!
//! let params = registry.resolve(WIRED_PRODUCT_ID);
//! let frame = params.frame(&[0x01, 0x02]);
//! assert_eq!(&frame[..], &[0x0B, 0x14, 0x01, 0x02]);
//! ```

pub mod commands;
pub mod error;
pub mod frame;
pub mod registry;
pub mod types;

pub use commands::{CommandBuilder, PortalCommands};
pub use error::{PortalError, Result};
pub use frame::{build_frame, format_hex};
pub use registry::{
    DEFAULT_INPUT_ENDPOINT, DEFAULT_OUTPUT_ENDPOINT, DeviceRegistry, PORTAL_VENDOR_ID,
    ProductProfile, WIRED_COMMAND_PREFIX, WIRED_PRODUCT_ID, WIRELESS_PRODUCT_ID,
};
pub use types::{PortalInfo, ProtocolParams, SessionId};

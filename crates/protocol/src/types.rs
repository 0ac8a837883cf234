//! Portal type definitions
//!
//! Types shared between the worker thread, the async client and the CLI.

use crate::registry::{DEFAULT_INPUT_ENDPOINT, DEFAULT_OUTPUT_ENDPOINT};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Session identifier (worker-assigned)
///
/// Names a live session owned by the USB worker thread. Only valid until
/// the session is closed or the worker shuts down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u32);

/// Resolved per-product protocol parameters
///
/// Produced by [`DeviceRegistry::resolve`](crate::DeviceRegistry::resolve).
/// `command_prefix` is never absent; an unknown product resolves to an
/// empty prefix with `using_defaults` set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolParams {
    /// Bytes prepended to every outgoing command
    pub command_prefix: Vec<u8>,
    /// Endpoint address responses are read from
    pub input_endpoint: u8,
    /// Endpoint address commands are written to
    pub output_endpoint: u8,
    /// True when any field fell back to the built-in defaults
    pub using_defaults: bool,
}

impl ProtocolParams {
    /// Parameters used for products the registry has no profile for
    pub fn defaults() -> Self {
        Self {
            command_prefix: Vec::new(),
            input_endpoint: DEFAULT_INPUT_ENDPOINT,
            output_endpoint: DEFAULT_OUTPUT_ENDPOINT,
            using_defaults: true,
        }
    }

    /// Build the outgoing buffer for `payload` (prefix first, then payload)
    pub fn frame(&self, payload: &[u8]) -> Bytes {
        crate::frame::build_frame(&self.command_prefix, payload)
    }
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self::defaults()
    }
}

/// Portal information returned by discovery
///
/// A serializable summary of a discovered portal. It carries enough of the
/// device identity (bus and address) for the worker to locate the same
/// device again when a session is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalInfo {
    /// Position among matching portals, in enumeration order
    pub index: usize,
    /// USB Vendor ID
    pub vendor_id: u16,
    /// USB Product ID
    pub product_id: u16,
    /// Bus number
    pub bus_number: u8,
    /// Device address on the bus
    pub device_address: u8,
    /// Product name from the registry (if known)
    pub product_name: Option<String>,
    /// Resolved protocol parameters
    pub params: ProtocolParams,
}

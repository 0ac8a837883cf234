//! USB subsystem
//!
//! libusb-backed implementation of the transport traits, plus the
//! dedicated worker thread that owns the transport and every live session.
//!
//! All blocking USB calls happen on the worker thread so the Tokio runtime
//! is never blocked by a hardware round trip.

pub mod device;
pub mod transfers;
pub mod worker;

// Re-export public types
pub use device::{RusbDevice, RusbHandle, RusbTransport};
pub use worker::{PortalWorkerThread, spawn_portal_worker};

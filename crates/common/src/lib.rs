//! Common utilities for skyportal
//!
//! This crate provides shared functionality for the portal library and
//! binary: the async channel bridge between the Tokio runtime and the USB
//! worker thread, error handling, logging setup and test helpers.

pub mod channel;
pub mod error;
pub mod logging;
pub mod test_utils;

pub use channel::{PortalBridge, PortalCommand, PortalWorker, create_portal_bridge};
pub use error::{Error, Result};
pub use logging::setup_logging;

//! Portal error types

use crate::types::SessionId;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while discovering, opening or talking to a portal
///
/// Variants that come from the USB transport keep the transport's error
/// unchanged; see [`PortalError::transport_error`].
#[derive(Debug, Error)]
pub enum PortalError {
    /// The descriptor handed to open carries no device
    #[error("No device in portal descriptor")]
    NoDeviceHandle,

    /// Listing attached USB devices failed
    #[error("Failed to enumerate USB devices: {0}")]
    Enumeration(#[source] rusb::Error),

    /// Opening the device failed (permissions, device removed, ...)
    #[error("Failed to open device: {0}")]
    DeviceOpen(#[source] rusb::Error),

    /// Resetting the device failed
    #[error("Failed to reset device: {0}")]
    DeviceReset(#[source] rusb::Error),

    /// Detaching the active kernel driver failed
    #[error("Failed to detach kernel driver from interface {interface}: {source}")]
    KernelDriverDetach {
        interface: u8,
        #[source]
        source: rusb::Error,
    },

    /// Claiming the interface failed
    #[error("Failed to claim interface {interface}: {source}")]
    InterfaceClaim {
        interface: u8,
        #[source]
        source: rusb::Error,
    },

    /// Releasing the interface on close failed
    #[error("Failed to release interface {interface}: {source}")]
    InterfaceRelease {
        interface: u8,
        #[source]
        source: rusb::Error,
    },

    /// A transfer on a bound endpoint failed
    #[error("Transfer on endpoint {endpoint:#04x} failed: {source}")]
    Transfer {
        endpoint: u8,
        #[source]
        source: rusb::Error,
    },

    /// The transport accepted fewer bytes than the frame holds
    #[error("Short write on endpoint {endpoint:#04x}: wrote {written} of {expected} bytes")]
    ShortWrite {
        endpoint: u8,
        written: usize,
        expected: usize,
    },

    /// No live session with this id
    #[error("Unknown session {0:?}")]
    UnknownSession(SessionId),

    /// The operation did not complete in time
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The USB worker thread is gone
    #[error("Channel error: {0}")]
    Channel(String),
}

impl PortalError {
    /// The underlying transport error, if this error wraps one
    pub fn transport_error(&self) -> Option<rusb::Error> {
        match self {
            Self::Enumeration(e) | Self::DeviceOpen(e) | Self::DeviceReset(e) => Some(*e),
            Self::KernelDriverDetach { source, .. }
            | Self::InterfaceClaim { source, .. }
            | Self::InterfaceRelease { source, .. }
            | Self::Transfer { source, .. } => Some(*source),
            _ => None,
        }
    }
}

/// Type alias for portal results
pub type Result<T> = std::result::Result<T, PortalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_passthrough() {
        let err = PortalError::DeviceReset(rusb::Error::NoDevice);
        assert_eq!(err.transport_error(), Some(rusb::Error::NoDevice));

        let err = PortalError::InterfaceClaim {
            interface: 0,
            source: rusb::Error::Busy,
        };
        assert_eq!(err.transport_error(), Some(rusb::Error::Busy));

        assert_eq!(PortalError::NoDeviceHandle.transport_error(), None);
    }

    #[test]
    fn test_error_display() {
        let err = PortalError::Transfer {
            endpoint: 0x02,
            source: rusb::Error::Timeout,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("0x02"));

        let err = PortalError::ShortWrite {
            endpoint: 0x02,
            written: 32,
            expected: 40,
        };
        assert!(format!("{}", err).contains("wrote 32 of 40"));
    }
}

//! USB transport interface
//!
//! The session layer only talks to USB through these traits. The libusb
//! implementation lives in [`crate::usb`]; tests use
//! [`crate::test_utils::StubTransport`]. Transport errors are plain
//! [`rusb::Error`] values so they can be passed up without translation.

use std::time::Duration;

/// Transfer kind of a bound endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// Interrupt endpoint (HID reports)
    Interrupt,
    /// Bulk endpoint
    Bulk,
}

/// An endpoint bound to a live session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    /// Endpoint address, including the direction bit
    pub address: u8,
    /// Transfer kind used for this endpoint
    pub kind: EndpointKind,
}

impl Endpoint {
    /// Bit 7 set means IN (device to host)
    pub fn is_in(&self) -> bool {
        (self.address & 0x80) != 0
    }
}

/// Source of attached USB devices
pub trait Transport {
    /// Device type produced by enumeration
    type Device: PortalDevice;

    /// List attached devices in enumeration order
    fn enumerate(&self) -> Result<Vec<Self::Device>, rusb::Error>;
}

/// An enumerated (not yet opened) USB device
pub trait PortalDevice {
    /// Handle type produced by [`PortalDevice::open`]
    type Handle: PortalHandle;

    fn vendor_id(&self) -> u16;
    fn product_id(&self) -> u16;
    fn bus_number(&self) -> u8;
    fn address(&self) -> u8;

    /// Open the device for I/O
    fn open(&self) -> Result<Self::Handle, rusb::Error>;
}

/// An opened USB device
pub trait PortalHandle {
    /// Reset the device
    fn reset(&mut self) -> Result<(), rusb::Error>;

    fn kernel_driver_active(&self, interface: u8) -> Result<bool, rusb::Error>;
    fn detach_kernel_driver(&mut self, interface: u8) -> Result<(), rusb::Error>;
    fn attach_kernel_driver(&mut self, interface: u8) -> Result<(), rusb::Error>;
    fn claim_interface(&mut self, interface: u8) -> Result<(), rusb::Error>;
    fn release_interface(&mut self, interface: u8) -> Result<(), rusb::Error>;

    /// Transfer kind of `address` on `interface`, if the device describes it
    fn endpoint_kind(&self, interface: u8, address: u8) -> Option<EndpointKind>;

    /// Write `data` in a single transfer, returning the bytes written
    fn write(&self, endpoint: Endpoint, data: &[u8], timeout: Duration)
    -> Result<usize, rusb::Error>;

    /// Read one transfer into `buf`, returning the bytes read
    fn read(&self, endpoint: Endpoint, buf: &mut [u8], timeout: Duration)
    -> Result<usize, rusb::Error>;
}

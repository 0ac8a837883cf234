//! Test utilities for the portal crate
//!
//! [`StubTransport`] is an in-memory transport that records every call it
//! receives and can be told to fail at any handshake step. Tests use the
//! recorded [`Call`] list to check ordering and that nothing unexpected
//! touched the device.
//!
//! # Example
//!
//! ```
//! use portal::discovery;
//! use portal::test_utils::{Call, StubDevice, StubTransport};
//! use protocol::DeviceRegistry;
//!
//! let transport = StubTransport::new(vec![StubDevice::new(0x1430, 0x0150)]);
//! let found = discovery::find(&transport, &DeviceRegistry::builtin(), 0).unwrap();
//!
//! assert!(found.is_some());
//! assert_eq!(transport.log().calls(), vec![Call::Enumerate]);
//! ```

use crate::transport::{Endpoint, EndpointKind, PortalDevice, PortalHandle, Transport};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A transport call recorded by the stub
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Enumerate,
    Open { bus: u8, address: u8 },
    Reset,
    KernelDriverActive(u8),
    DetachKernelDriver(u8),
    AttachKernelDriver(u8),
    ClaimInterface(u8),
    ReleaseInterface(u8),
    EndpointKind(u8),
    Write { endpoint: u8, data: Vec<u8> },
    Read { endpoint: u8 },
}

/// Shared, ordered record of transport calls
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    fn record(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    /// All calls so far, in order
    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    /// Writes so far as (endpoint, data)
    pub fn writes(&self) -> Vec<(u8, Vec<u8>)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Write { endpoint, data } => Some((endpoint, data)),
                _ => None,
            })
            .collect()
    }

    /// Number of times `call` was recorded
    pub fn count(&self, call: &Call) -> usize {
        self.0.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    /// Index of the first occurrence of `call`
    pub fn position(&self, call: &Call) -> Option<usize> {
        self.0.lock().unwrap().iter().position(|c| c == call)
    }

    /// Whether any call touched a device (anything but enumeration)
    pub fn touched_device(&self) -> bool {
        self.0.lock().unwrap().iter().any(|c| *c != Call::Enumerate)
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

/// Failure injection and canned data for a stub device
#[derive(Debug, Clone, Default)]
pub struct StubBehavior {
    pub open_error: Option<rusb::Error>,
    pub reset_error: Option<rusb::Error>,
    /// Report a kernel driver bound to every interface
    pub kernel_driver_active: bool,
    pub kernel_driver_query_error: Option<rusb::Error>,
    pub detach_error: Option<rusb::Error>,
    pub attach_error: Option<rusb::Error>,
    pub claim_error: Option<rusb::Error>,
    pub release_error: Option<rusb::Error>,
    /// Fail the n-th write (0-based) with the given error
    pub fail_write_at: Option<(usize, rusb::Error)>,
    /// Report this many fewer bytes written than requested
    pub short_write_by: usize,
    /// Sleep before completing each write
    pub write_delay: Option<Duration>,
    /// Data returned by every read (truncated to the buffer)
    pub read_data: Vec<u8>,
    pub read_error: Option<rusb::Error>,
    /// Endpoint kinds the device describes; others are undescribed
    pub endpoint_kinds: Vec<(u8, EndpointKind)>,
}

/// An enumerated stub device
#[derive(Debug, Clone)]
pub struct StubDevice {
    vendor_id: u16,
    product_id: u16,
    bus_number: u8,
    address: u8,
    behavior: StubBehavior,
    log: CallLog,
}

impl StubDevice {
    /// Create a well-behaved device on bus 1
    ///
    /// The address is left at 0; [`StubTransport::new`] numbers unaddressed
    /// devices by position.
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
            bus_number: 1,
            address: 0,
            behavior: StubBehavior::default(),
            log: CallLog::default(),
        }
    }

    pub fn with_behavior(mut self, behavior: StubBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn at(mut self, bus_number: u8, address: u8) -> Self {
        self.bus_number = bus_number;
        self.address = address;
        self
    }

    /// Call log shared with every handle opened from this device
    pub fn log(&self) -> CallLog {
        self.log.clone()
    }
}

impl PortalDevice for StubDevice {
    type Handle = StubHandle;

    fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    fn product_id(&self) -> u16 {
        self.product_id
    }

    fn bus_number(&self) -> u8 {
        self.bus_number
    }

    fn address(&self) -> u8 {
        self.address
    }

    fn open(&self) -> Result<StubHandle, rusb::Error> {
        self.log.record(Call::Open {
            bus: self.bus_number,
            address: self.address,
        });
        if let Some(e) = self.behavior.open_error {
            return Err(e);
        }

        Ok(StubHandle {
            behavior: self.behavior.clone(),
            log: self.log.clone(),
            writes: AtomicUsize::new(0),
        })
    }
}

/// An opened stub device
#[derive(Debug)]
pub struct StubHandle {
    behavior: StubBehavior,
    log: CallLog,
    writes: AtomicUsize,
}

fn fail_with(error: Option<rusb::Error>) -> Result<(), rusb::Error> {
    match error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

impl PortalHandle for StubHandle {
    fn reset(&mut self) -> Result<(), rusb::Error> {
        self.log.record(Call::Reset);
        fail_with(self.behavior.reset_error)
    }

    fn kernel_driver_active(&self, interface: u8) -> Result<bool, rusb::Error> {
        self.log.record(Call::KernelDriverActive(interface));
        match self.behavior.kernel_driver_query_error {
            Some(e) => Err(e),
            None => Ok(self.behavior.kernel_driver_active),
        }
    }

    fn detach_kernel_driver(&mut self, interface: u8) -> Result<(), rusb::Error> {
        self.log.record(Call::DetachKernelDriver(interface));
        fail_with(self.behavior.detach_error)
    }

    fn attach_kernel_driver(&mut self, interface: u8) -> Result<(), rusb::Error> {
        self.log.record(Call::AttachKernelDriver(interface));
        fail_with(self.behavior.attach_error)
    }

    fn claim_interface(&mut self, interface: u8) -> Result<(), rusb::Error> {
        self.log.record(Call::ClaimInterface(interface));
        fail_with(self.behavior.claim_error)
    }

    fn release_interface(&mut self, interface: u8) -> Result<(), rusb::Error> {
        self.log.record(Call::ReleaseInterface(interface));
        fail_with(self.behavior.release_error)
    }

    fn endpoint_kind(&self, _interface: u8, address: u8) -> Option<EndpointKind> {
        self.log.record(Call::EndpointKind(address));
        self.behavior
            .endpoint_kinds
            .iter()
            .find(|(a, _)| *a == address)
            .map(|(_, kind)| *kind)
    }

    fn write(
        &self,
        endpoint: Endpoint,
        data: &[u8],
        _timeout: Duration,
    ) -> Result<usize, rusb::Error> {
        self.log.record(Call::Write {
            endpoint: endpoint.address,
            data: data.to_vec(),
        });

        if let Some(delay) = self.behavior.write_delay {
            std::thread::sleep(delay);
        }

        let n = self.writes.fetch_add(1, Ordering::SeqCst);
        if let Some((at, e)) = self.behavior.fail_write_at
            && at == n
        {
            return Err(e);
        }

        Ok(data.len().saturating_sub(self.behavior.short_write_by))
    }

    fn read(
        &self,
        endpoint: Endpoint,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, rusb::Error> {
        self.log.record(Call::Read {
            endpoint: endpoint.address,
        });
        if let Some(e) = self.behavior.read_error {
            return Err(e);
        }

        let len = self.behavior.read_data.len().min(buf.len());
        buf[..len].copy_from_slice(&self.behavior.read_data[..len]);
        Ok(len)
    }
}

/// In-memory transport over a fixed device list
#[derive(Debug, Clone)]
pub struct StubTransport {
    devices: Vec<StubDevice>,
    enumerate_error: Option<rusb::Error>,
    log: CallLog,
}

impl StubTransport {
    /// Create a transport whose devices share one call log
    ///
    /// Devices without an address are numbered 1, 2, ... by position.
    pub fn new(devices: Vec<StubDevice>) -> Self {
        let log = CallLog::default();
        let devices = devices
            .into_iter()
            .enumerate()
            .map(|(i, mut device)| {
                if device.address == 0 {
                    device.address = (i + 1) as u8;
                }
                device.log = log.clone();
                device
            })
            .collect();

        Self {
            devices,
            enumerate_error: None,
            log,
        }
    }

    /// A transport whose enumeration always fails
    pub fn failing(error: rusb::Error) -> Self {
        Self {
            devices: Vec::new(),
            enumerate_error: Some(error),
            log: CallLog::default(),
        }
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }
}

impl Transport for StubTransport {
    type Device = StubDevice;

    fn enumerate(&self) -> Result<Vec<StubDevice>, rusb::Error> {
        self.log.record(Call::Enumerate);
        if let Some(e) = self.enumerate_error {
            return Err(e);
        }
        Ok(self.devices.clone())
    }
}

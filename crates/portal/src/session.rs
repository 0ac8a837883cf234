//! Portal sessions
//!
//! A [`PortalDescriptor`] describes a discovered portal; [`open`] turns it
//! into a [`LiveSession`] by running the handshake:
//!
//! 1. check the descriptor carries a device
//! 2. open the device
//! 3. reset it
//! 4. select interface 0
//! 5. detach the kernel driver if one is active
//! 6. claim the interface
//! 7. bind the input and output endpoints
//! 8. send the reset frame
//! 9. send the activate frame
//!
//! Steps run strictly in order and the first failure is returned as-is.
//! Nothing is retried. Only a [`LiveSession`] can send, so a portal whose
//! handshake failed can never be written to.

use crate::transport::{Endpoint, EndpointKind, PortalDevice, PortalHandle};
use protocol::{CommandBuilder, DeviceRegistry, PortalError, PortalInfo, ProtocolParams, format_hex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Interface every portal exposes its endpoints on
pub const PORTAL_INTERFACE: u8 = 0;

/// Default timeout for a single transfer
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default read length (one portal report)
pub const DEFAULT_READ_LENGTH: usize = 32;

/// Per-session tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Timeout applied to every transfer
    pub transfer_timeout: Duration,
    /// Buffer length for reads from the input endpoint
    pub read_length: usize,
    /// Reattach a kernel driver we detached when the session is closed
    pub reattach_kernel_driver: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            transfer_timeout: DEFAULT_TRANSFER_TIMEOUT,
            read_length: DEFAULT_READ_LENGTH,
            reattach_kernel_driver: true,
        }
    }
}

/// A discovered portal that has not been opened
pub struct PortalDescriptor<D> {
    device: Option<D>,
    index: usize,
    vendor_id: u16,
    product_id: u16,
    bus_number: u8,
    device_address: u8,
    product_name: Option<String>,
    params: ProtocolParams,
}

impl<D: PortalDevice> PortalDescriptor<D> {
    /// Describe `device`, resolving its parameters through `registry`
    pub fn new(device: D, index: usize, registry: &DeviceRegistry) -> Self {
        let product_id = device.product_id();

        Self {
            index,
            vendor_id: device.vendor_id(),
            product_id,
            bus_number: device.bus_number(),
            device_address: device.address(),
            product_name: registry.product_name(product_id).map(str::to_string),
            params: registry.resolve(product_id),
            device: Some(device),
        }
    }
}

impl<D> PortalDescriptor<D> {
    /// Rebuild a descriptor from a [`PortalInfo`]
    ///
    /// With `device: None` the descriptor still carries identity and
    /// parameters, but [`open`] rejects it with
    /// [`PortalError::NoDeviceHandle`].
    pub fn from_info(info: &PortalInfo, device: Option<D>) -> Self {
        Self {
            device,
            index: info.index,
            vendor_id: info.vendor_id,
            product_id: info.product_id,
            bus_number: info.bus_number,
            device_address: info.device_address,
            product_name: info.product_name.clone(),
            params: info.params.clone(),
        }
    }

    /// Serializable summary of this descriptor
    pub fn info(&self) -> PortalInfo {
        PortalInfo {
            index: self.index,
            vendor_id: self.vendor_id,
            product_id: self.product_id,
            bus_number: self.bus_number,
            device_address: self.device_address,
            product_name: self.product_name.clone(),
            params: self.params.clone(),
        }
    }

    pub fn params(&self) -> &ProtocolParams {
        &self.params
    }

    pub fn has_device(&self) -> bool {
        self.device.is_some()
    }
}

/// An opened, claimed and activated portal
///
/// Dropping a session without calling [`LiveSession::close`] releases the
/// interface on a best-effort basis.
pub struct LiveSession<H: PortalHandle> {
    info: PortalInfo,
    handle: H,
    input: Endpoint,
    output: Endpoint,
    kernel_driver_detached: bool,
    settings: SessionSettings,
    released: bool,
}

/// Open a portal and run the activation handshake
pub fn open<D: PortalDevice>(
    descriptor: PortalDescriptor<D>,
    commands: &dyn CommandBuilder,
    settings: SessionSettings,
) -> Result<LiveSession<D::Handle>, PortalError> {
    let info = descriptor.info();
    let device = descriptor.device.ok_or(PortalError::NoDeviceHandle)?;

    debug!(
        "Opening portal {:04x}:{:04x} at bus={}, addr={}",
        info.vendor_id, info.product_id, info.bus_number, info.device_address
    );

    let mut handle = device.open().map_err(|e| {
        warn!("Failed to open device: {}", e);
        PortalError::DeviceOpen(e)
    })?;

    handle.reset().map_err(|e| {
        warn!("Failed to reset device: {}", e);
        PortalError::DeviceReset(e)
    })?;
    debug!("Reset portal");

    let kernel_driver_detached = detach_kernel_driver(&mut handle, PORTAL_INTERFACE)?;

    if let Err(source) = handle.claim_interface(PORTAL_INTERFACE) {
        warn!("Failed to claim interface {}: {}", PORTAL_INTERFACE, source);
        if kernel_driver_detached
            && settings.reattach_kernel_driver
            && let Err(e) = handle.attach_kernel_driver(PORTAL_INTERFACE)
        {
            warn!(
                "Could not reattach kernel driver to interface {}: {}",
                PORTAL_INTERFACE, e
            );
        }
        return Err(PortalError::InterfaceClaim {
            interface: PORTAL_INTERFACE,
            source,
        });
    }
    debug!("Claimed interface {}", PORTAL_INTERFACE);

    let input = bind_endpoint(&handle, info.params.input_endpoint);
    let output = bind_endpoint(&handle, info.params.output_endpoint);
    if info.params.using_defaults {
        debug!(
            "Product {:04x} has no full profile, using default endpoints",
            info.product_id
        );
    }

    // From here on a failure drops the session, which releases the interface
    let session = LiveSession {
        info,
        handle,
        input,
        output,
        kernel_driver_detached,
        settings,
        released: false,
    };

    session.send(&commands.reset())?;
    session.send(&commands.activate())?;

    info!(
        "Portal {:04x}:{:04x} active (in={:#04x}, out={:#04x})",
        session.info.vendor_id, session.info.product_id, input.address, output.address
    );
    Ok(session)
}

/// Detach the kernel driver from `interface` if one is bound
///
/// Returns whether a driver was detached. A transport that cannot report
/// driver state is treated as having none.
fn detach_kernel_driver<H: PortalHandle>(
    handle: &mut H,
    interface: u8,
) -> Result<bool, PortalError> {
    match handle.kernel_driver_active(interface) {
        Ok(true) => {
            debug!("Detaching kernel driver from interface {}", interface);
            handle
                .detach_kernel_driver(interface)
                .map_err(|source| PortalError::KernelDriverDetach { interface, source })?;
            Ok(true)
        }
        Ok(false) => {
            debug!("No kernel driver active on interface {}", interface);
            Ok(false)
        }
        Err(e) => {
            debug!(
                "Could not check kernel driver status for interface {}: {}",
                interface, e
            );
            Ok(false)
        }
    }
}

fn bind_endpoint<H: PortalHandle>(handle: &H, address: u8) -> Endpoint {
    let kind = handle
        .endpoint_kind(PORTAL_INTERFACE, address)
        .unwrap_or_else(|| {
            debug!(
                "Endpoint {:#04x} not described, assuming interrupt transfers",
                address
            );
            EndpointKind::Interrupt
        });

    Endpoint { address, kind }
}

impl<H: PortalHandle> LiveSession<H> {
    /// Send a command: the product's prefix followed by `payload`
    ///
    /// One transfer on the output endpoint. The frame is never split; a
    /// transfer that accepts fewer bytes than the frame holds fails with
    /// [`PortalError::ShortWrite`].
    pub fn send(&self, payload: &[u8]) -> Result<(), PortalError> {
        let frame = self.info.params.frame(payload);
        debug!(
            "Sending frame [{}] on endpoint {:#04x}",
            format_hex(&frame),
            self.output.address
        );

        let written = self
            .handle
            .write(self.output, &frame, self.settings.transfer_timeout)
            .map_err(|source| PortalError::Transfer {
                endpoint: self.output.address,
                source,
            })?;

        if written != frame.len() {
            return Err(PortalError::ShortWrite {
                endpoint: self.output.address,
                written,
                expected: frame.len(),
            });
        }

        Ok(())
    }

    /// Read one report from the input endpoint
    pub fn read(&self) -> Result<Vec<u8>, PortalError> {
        let mut buf = vec![0u8; self.settings.read_length];

        let len = self
            .handle
            .read(self.input, &mut buf, self.settings.transfer_timeout)
            .map_err(|source| PortalError::Transfer {
                endpoint: self.input.address,
                source,
            })?;

        buf.truncate(len);
        debug!("Read frame [{}]", format_hex(&buf));
        Ok(buf)
    }

    /// Release the interface and, if we detached it, reattach the kernel driver
    pub fn close(mut self) -> Result<(), PortalError> {
        self.teardown()
    }

    pub fn info(&self) -> &PortalInfo {
        &self.info
    }

    pub fn params(&self) -> &ProtocolParams {
        &self.info.params
    }

    pub fn input_endpoint(&self) -> Endpoint {
        self.input
    }

    pub fn output_endpoint(&self) -> Endpoint {
        self.output
    }

    /// Whether the handshake detached a kernel driver
    pub fn kernel_driver_detached(&self) -> bool {
        self.kernel_driver_detached
    }

    fn teardown(&mut self) -> Result<(), PortalError> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let released = self
            .handle
            .release_interface(PORTAL_INTERFACE)
            .map_err(|source| PortalError::InterfaceRelease {
                interface: PORTAL_INTERFACE,
                source,
            });

        if self.kernel_driver_detached && self.settings.reattach_kernel_driver {
            match self.handle.attach_kernel_driver(PORTAL_INTERFACE) {
                Ok(()) => debug!("Reattached kernel driver to interface {}", PORTAL_INTERFACE),
                Err(e) => warn!(
                    "Could not reattach kernel driver to interface {}: {}",
                    PORTAL_INTERFACE, e
                ),
            }
        }

        debug!(
            "Closed portal {:04x}:{:04x}",
            self.info.vendor_id, self.info.product_id
        );
        released
    }
}

impl<H: PortalHandle> Drop for LiveSession<H> {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            warn!("Failed to release portal on drop: {}", e);
        }
    }
}

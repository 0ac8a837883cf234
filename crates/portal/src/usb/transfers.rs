//! USB transfer execution
//!
//! Synchronous single-transfer helpers used by [`RusbHandle`](super::RusbHandle).
//! Errors are returned exactly as libusb reported them.

use crate::transport::{Endpoint, EndpointKind};
use rusb::{Context, DeviceHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Write `data` to an OUT endpoint in a single transfer
pub fn write_endpoint(
    handle: &DeviceHandle<Context>,
    endpoint: Endpoint,
    data: &[u8],
    timeout: Duration,
) -> Result<usize, rusb::Error> {
    debug!(
        "{:?} OUT transfer: endpoint={:#x}, data_len={}, timeout={}ms",
        endpoint.kind,
        endpoint.address,
        data.len(),
        timeout.as_millis()
    );

    let result = match endpoint.kind {
        EndpointKind::Interrupt => handle.write_interrupt(endpoint.address, data, timeout),
        EndpointKind::Bulk => handle.write_bulk(endpoint.address, data, timeout),
    };

    match result {
        Ok(len) => {
            debug!("OUT transfer succeeded: {} bytes", len);
            Ok(len)
        }
        Err(e) => {
            warn!("OUT transfer on endpoint {:#x} failed: {}", endpoint.address, e);
            Err(e)
        }
    }
}

/// Read one transfer from an IN endpoint into `buf`
pub fn read_endpoint(
    handle: &DeviceHandle<Context>,
    endpoint: Endpoint,
    buf: &mut [u8],
    timeout: Duration,
) -> Result<usize, rusb::Error> {
    debug!(
        "{:?} IN transfer: endpoint={:#x}, buf_len={}, timeout={}ms",
        endpoint.kind,
        endpoint.address,
        buf.len(),
        timeout.as_millis()
    );

    let result = match endpoint.kind {
        EndpointKind::Interrupt => handle.read_interrupt(endpoint.address, buf, timeout),
        EndpointKind::Bulk => handle.read_bulk(endpoint.address, buf, timeout),
    };

    match result {
        Ok(len) => {
            debug!("IN transfer succeeded: {} bytes", len);
            Ok(len)
        }
        Err(e) => {
            warn!("IN transfer on endpoint {:#x} failed: {}", endpoint.address, e);
            Err(e)
        }
    }
}

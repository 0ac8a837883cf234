//! Portal discovery
//!
//! Scans attached USB devices for portals. Discovery never opens, resets
//! or claims a device; it only reads identifiers the transport already
//! has.

use crate::session::PortalDescriptor;
use crate::transport::{PortalDevice, Transport};
use protocol::{DeviceRegistry, PortalError, PortalInfo};
use tracing::debug;

/// Find the `index`-th attached portal (0-based, enumeration order)
///
/// Returns `Ok(None)` when fewer than `index + 1` portals are attached.
/// Only a failing enumeration is an error.
pub fn find<T: Transport>(
    transport: &T,
    registry: &DeviceRegistry,
    index: usize,
) -> Result<Option<PortalDescriptor<T::Device>>, PortalError> {
    let devices = transport.enumerate().map_err(PortalError::Enumeration)?;

    let found = devices
        .into_iter()
        .filter(|device| registry.accepts(device.vendor_id(), device.product_id()))
        .nth(index)
        .map(|device| PortalDescriptor::new(device, index, registry));

    match &found {
        Some(descriptor) => {
            let info = descriptor.info();
            debug!(
                "Found portal #{} {:04x}:{:04x} at bus={}, addr={}",
                index, info.vendor_id, info.product_id, info.bus_number, info.device_address
            );
        }
        None => debug!("No portal at index {}", index),
    }

    Ok(found)
}

/// List every attached portal in enumeration order
pub fn list<T: Transport>(
    transport: &T,
    registry: &DeviceRegistry,
) -> Result<Vec<PortalDescriptor<T::Device>>, PortalError> {
    let devices = transport.enumerate().map_err(PortalError::Enumeration)?;

    let portals: Vec<_> = devices
        .into_iter()
        .filter(|device| registry.accepts(device.vendor_id(), device.product_id()))
        .enumerate()
        .map(|(index, device)| PortalDescriptor::new(device, index, registry))
        .collect();

    debug!("Found {} portals", portals.len());
    Ok(portals)
}

/// Locate the device a [`PortalInfo`] was created from
///
/// Matches on bus, address, vendor and product id. When the device has
/// gone away the returned descriptor carries no device, so opening it
/// fails with [`PortalError::NoDeviceHandle`].
pub fn locate<T: Transport>(
    transport: &T,
    info: &PortalInfo,
) -> Result<PortalDescriptor<T::Device>, PortalError> {
    let devices = transport.enumerate().map_err(PortalError::Enumeration)?;

    let device = devices.into_iter().find(|device| {
        device.bus_number() == info.bus_number
            && device.address() == info.device_address
            && device.vendor_id() == info.vendor_id
            && device.product_id() == info.product_id
    });

    if device.is_none() {
        debug!(
            "Portal {:04x}:{:04x} no longer at bus={}, addr={}",
            info.vendor_id, info.product_id, info.bus_number, info.device_address
        );
    }

    Ok(PortalDescriptor::from_info(info, device))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{Call, StubDevice, StubTransport};

    #[test]
    fn test_find_skips_non_portals() {
        let transport = StubTransport::new(vec![
            StubDevice::new(0x046d, 0xc52b),
            StubDevice::new(0x1430, 0x1234), // right vendor, unknown product
            StubDevice::new(0x046d, 0x1f17), // known product, wrong vendor
            StubDevice::new(0x1430, 0x0150),
        ]);
        let registry = DeviceRegistry::builtin();

        let found = find(&transport, &registry, 0).unwrap().expect("no portal");
        let info = found.info();
        assert_eq!(info.product_id, 0x0150);
        assert_eq!(info.device_address, 4);

        assert!(find(&transport, &registry, 1).unwrap().is_none());
    }

    #[test]
    fn test_list_assigns_indices() {
        let transport = StubTransport::new(vec![
            StubDevice::new(0x1430, 0x1f17),
            StubDevice::new(0x05e3, 0x0608),
            StubDevice::new(0x1430, 0x0150),
        ]);

        let portals = list(&transport, &DeviceRegistry::builtin()).unwrap();
        let infos: Vec<_> = portals.iter().map(|p| p.info()).collect();

        assert_eq!(infos.len(), 2);
        assert_eq!((infos[0].index, infos[0].product_id), (0, 0x1f17));
        assert_eq!((infos[1].index, infos[1].product_id), (1, 0x0150));
    }

    #[test]
    fn test_enumeration_failure_is_error() {
        let transport = StubTransport::failing(rusb::Error::NoMem);

        let result = find(&transport, &DeviceRegistry::builtin(), 0);
        assert!(matches!(
            result,
            Err(PortalError::Enumeration(rusb::Error::NoMem))
        ));
    }

    #[test]
    fn test_locate_vanished_device() {
        let transport = StubTransport::new(vec![StubDevice::new(0x1430, 0x1f17)]);
        let registry = DeviceRegistry::builtin();

        let mut info = find(&transport, &registry, 0).unwrap().unwrap().info();
        let located = locate(&transport, &info).unwrap();
        assert!(located.has_device());

        info.device_address = 99;
        let located = locate(&transport, &info).unwrap();
        assert!(!located.has_device());
        assert_eq!(located.params(), &info.params);

        let calls = transport.log().calls();
        assert!(calls.iter().all(|c| *c == Call::Enumerate));
    }
}

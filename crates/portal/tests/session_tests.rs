//! Session handshake and transfer tests
//!
//! Drives `session::open` / `LiveSession` against the recording stub
//! transport and checks call order, framing and error pass-through.
//!
//! Run with: `cargo test -p portal --test session_tests`

use portal::discovery;
use portal::session::{self, LiveSession, PortalDescriptor, SessionSettings};
use portal::test_utils::{Call, CallLog, StubBehavior, StubDevice, StubHandle, StubTransport};
use protocol::{CommandBuilder, DeviceRegistry, PortalCommands, PortalError};

// ============================================================================
// Helpers
// ============================================================================

fn descriptor_for(device: StubDevice) -> (PortalDescriptor<StubDevice>, CallLog) {
    let transport = StubTransport::new(vec![device]);
    let descriptor = discovery::find(&transport, &DeviceRegistry::builtin(), 0)
        .expect("enumeration failed")
        .expect("no portal");
    let log = transport.log();
    log.clear();
    (descriptor, log)
}

type OpenResult = Result<LiveSession<StubHandle>, PortalError>;

fn open_with(behavior: StubBehavior, product_id: u16) -> (OpenResult, CallLog) {
    let (descriptor, log) =
        descriptor_for(StubDevice::new(0x1430, product_id).with_behavior(behavior));
    let result = session::open(descriptor, &PortalCommands, SessionSettings::default());
    (result, log)
}

// ============================================================================
// Handshake Ordering
// ============================================================================

#[test]
fn test_open_runs_handshake_in_order() {
    let (result, log) = open_with(StubBehavior::default(), 0x0150);
    let live = result.expect("open failed");

    assert_eq!(
        log.calls(),
        vec![
            Call::Open { bus: 1, address: 1 },
            Call::Reset,
            Call::KernelDriverActive(0),
            Call::ClaimInterface(0),
            Call::EndpointKind(0x81),
            Call::EndpointKind(0x02),
            Call::Write {
                endpoint: 0x02,
                data: PortalCommands.reset(),
            },
            Call::Write {
                endpoint: 0x02,
                data: PortalCommands.activate(),
            },
        ]
    );

    assert_eq!(live.input_endpoint().address, 0x81);
    assert_eq!(live.output_endpoint().address, 0x02);
}

#[test]
fn test_bootstrap_frames_carry_prefix() {
    let (result, log) = open_with(StubBehavior::default(), 0x1f17);
    result.expect("open failed");

    assert_eq!(
        log.writes(),
        vec![
            (0x02, vec![0x0B, 0x14, b'R']),
            (0x02, vec![0x0B, 0x14, b'A', 0x01]),
        ]
    );
}

#[test]
fn test_open_without_device_makes_no_transport_calls() {
    let transport = StubTransport::new(vec![StubDevice::new(0x1430, 0x1f17)]);
    let info = discovery::find(&transport, &DeviceRegistry::builtin(), 0)
        .unwrap()
        .unwrap()
        .info();
    let log = transport.log();
    log.clear();

    let descriptor = PortalDescriptor::<StubDevice>::from_info(&info, None);
    let result = session::open(descriptor, &PortalCommands, SessionSettings::default());

    assert!(matches!(result, Err(PortalError::NoDeviceHandle)));
    assert!(log.calls().is_empty());
}

// ============================================================================
// Fail-fast
// ============================================================================

#[test]
fn test_open_failure_is_passed_through() {
    let (result, log) = open_with(
        StubBehavior {
            open_error: Some(rusb::Error::Access),
            ..Default::default()
        },
        0x1f17,
    );

    let err = result.err().expect("open should fail");
    assert!(matches!(err, PortalError::DeviceOpen(rusb::Error::Access)));
    assert_eq!(err.transport_error(), Some(rusb::Error::Access));
    assert_eq!(log.calls(), vec![Call::Open { bus: 1, address: 1 }]);
}

#[test]
fn test_reset_failure_skips_claim_and_binding() {
    let (result, log) = open_with(
        StubBehavior {
            reset_error: Some(rusb::Error::NoDevice),
            kernel_driver_active: true,
            ..Default::default()
        },
        0x1f17,
    );

    assert!(matches!(
        result,
        Err(PortalError::DeviceReset(rusb::Error::NoDevice))
    ));
    assert_eq!(log.calls(), vec![Call::Open { bus: 1, address: 1 }, Call::Reset]);
    assert_eq!(log.count(&Call::ClaimInterface(0)), 0);
    assert!(log.writes().is_empty());
}

#[test]
fn test_detach_failure_stops_before_claim() {
    let (result, log) = open_with(
        StubBehavior {
            kernel_driver_active: true,
            detach_error: Some(rusb::Error::NotSupported),
            ..Default::default()
        },
        0x1f17,
    );

    assert!(matches!(
        result,
        Err(PortalError::KernelDriverDetach {
            interface: 0,
            source: rusb::Error::NotSupported
        })
    ));
    assert_eq!(log.count(&Call::ClaimInterface(0)), 0);
}

#[test]
fn test_claim_failure_is_passed_through() {
    let (result, log) = open_with(
        StubBehavior {
            claim_error: Some(rusb::Error::Busy),
            ..Default::default()
        },
        0x1f17,
    );

    let err = result.err().expect("open should fail");
    assert_eq!(err.transport_error(), Some(rusb::Error::Busy));
    assert!(log.writes().is_empty());
    assert_eq!(log.count(&Call::ReleaseInterface(0)), 0);
}

#[test]
fn test_claim_failure_survives_failed_reattach() {
    let (result, log) = open_with(
        StubBehavior {
            kernel_driver_active: true,
            claim_error: Some(rusb::Error::Busy),
            attach_error: Some(rusb::Error::NoDevice),
            ..Default::default()
        },
        0x1f17,
    );

    // The claim error is reported, not the reattach error
    assert!(matches!(
        result,
        Err(PortalError::InterfaceClaim {
            interface: 0,
            source: rusb::Error::Busy
        })
    ));
    assert_eq!(log.count(&Call::AttachKernelDriver(0)), 1);
    assert!(log.writes().is_empty());
}

#[test]
fn test_reset_frame_failure_aborts_before_activate() {
    let (result, log) = open_with(
        StubBehavior {
            fail_write_at: Some((0, rusb::Error::Pipe)),
            ..Default::default()
        },
        0x1f17,
    );

    assert!(matches!(
        result,
        Err(PortalError::Transfer {
            endpoint: 0x02,
            source: rusb::Error::Pipe
        })
    ));
    assert_eq!(log.writes().len(), 1);
    // The claimed interface is given back
    assert_eq!(log.count(&Call::ReleaseInterface(0)), 1);
}

#[test]
fn test_activate_failure_fails_open() {
    let (result, log) = open_with(
        StubBehavior {
            fail_write_at: Some((1, rusb::Error::Timeout)),
            ..Default::default()
        },
        0x0150,
    );

    assert!(matches!(
        result,
        Err(PortalError::Transfer {
            source: rusb::Error::Timeout,
            ..
        })
    ));
    assert_eq!(log.writes().len(), 2);
}

// ============================================================================
// Kernel Driver Handling
// ============================================================================

#[test]
fn test_inactive_kernel_driver_is_not_detached() {
    let (result, log) = open_with(StubBehavior::default(), 0x1f17);
    let live = result.expect("open failed");

    assert_eq!(log.count(&Call::DetachKernelDriver(0)), 0);
    assert!(!live.kernel_driver_detached());
}

#[test]
fn test_active_kernel_driver_detached_once_before_claim() {
    let (result, log) = open_with(
        StubBehavior {
            kernel_driver_active: true,
            ..Default::default()
        },
        0x1f17,
    );
    let live = result.expect("open failed");

    assert_eq!(log.count(&Call::DetachKernelDriver(0)), 1);
    let detach = log.position(&Call::DetachKernelDriver(0)).unwrap();
    let claim = log.position(&Call::ClaimInterface(0)).unwrap();
    assert!(detach < claim);
    assert!(live.kernel_driver_detached());
}

#[test]
fn test_kernel_driver_query_error_treated_as_inactive() {
    let (result, log) = open_with(
        StubBehavior {
            kernel_driver_query_error: Some(rusb::Error::NotSupported),
            ..Default::default()
        },
        0x1f17,
    );

    assert!(result.is_ok());
    assert_eq!(log.count(&Call::DetachKernelDriver(0)), 0);
}

// ============================================================================
// Framed Sends
// ============================================================================

#[test]
fn test_wired_send_prepends_prefix() {
    let (result, log) = open_with(StubBehavior::default(), 0x1f17);
    let live = result.unwrap();
    log.clear();

    live.send(&[0x01, 0x02]).unwrap();
    assert_eq!(log.writes(), vec![(0x02, vec![0x0B, 0x14, 0x01, 0x02])]);
}

#[test]
fn test_wireless_send_has_no_prefix() {
    let (result, log) = open_with(StubBehavior::default(), 0x0150);
    let live = result.unwrap();
    log.clear();

    live.send(&[0x01, 0x02]).unwrap();
    assert_eq!(log.writes(), vec![(0x02, vec![0x01, 0x02])]);
}

#[test]
fn test_empty_payload_is_valid() {
    let (result, log) = open_with(StubBehavior::default(), 0x1f17);
    let live = result.unwrap();
    log.clear();

    live.send(&[]).unwrap();
    assert_eq!(log.writes(), vec![(0x02, vec![0x0B, 0x14])]);
}

#[test]
fn test_repeated_send_is_independent() {
    let (result, log) = open_with(StubBehavior::default(), 0x1f17);
    let live = result.unwrap();
    log.clear();

    live.send(&[0x43, 0x10, 0x20, 0x30]).unwrap();
    live.send(&[0x43, 0x10, 0x20, 0x30]).unwrap();

    let writes = log.writes();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0], writes[1]);
    assert_eq!(writes[0].1, vec![0x0B, 0x14, 0x43, 0x10, 0x20, 0x30]);
}

#[test]
fn test_short_write_fails() {
    // The reset frame is the first write: prefix plus 'R'
    let (result, _log) = open_with(
        StubBehavior {
            short_write_by: 1,
            ..Default::default()
        },
        0x1f17,
    );
    assert!(matches!(
        result,
        Err(PortalError::ShortWrite {
            endpoint: 0x02,
            written: 2,
            expected: 3
        })
    ));
}

#[test]
fn test_read_uses_input_endpoint() {
    let (result, log) = open_with(
        StubBehavior {
            read_data: vec![b'S', 0x01, 0x00, 0x00, 0x00],
            ..Default::default()
        },
        0x1f17,
    );
    let live = result.unwrap();
    log.clear();

    let report = live.read().unwrap();
    assert_eq!(report, vec![b'S', 0x01, 0x00, 0x00, 0x00]);
    assert_eq!(log.calls(), vec![Call::Read { endpoint: 0x81 }]);
}

#[test]
fn test_read_failure_is_passed_through() {
    let (result, _log) = open_with(
        StubBehavior {
            read_error: Some(rusb::Error::Overflow),
            ..Default::default()
        },
        0x1f17,
    );
    let live = result.unwrap();

    let err = live.read().err().expect("read should fail");
    assert!(matches!(
        err,
        PortalError::Transfer {
            endpoint: 0x81,
            source: rusb::Error::Overflow
        }
    ));
}

// ============================================================================
// Teardown
// ============================================================================

#[test]
fn test_close_releases_and_reattaches() {
    let (result, log) = open_with(
        StubBehavior {
            kernel_driver_active: true,
            ..Default::default()
        },
        0x1f17,
    );
    let live = result.unwrap();
    log.clear();

    live.close().unwrap();
    assert_eq!(
        log.calls(),
        vec![Call::ReleaseInterface(0), Call::AttachKernelDriver(0)]
    );
}

#[test]
fn test_close_without_detach_does_not_reattach() {
    let (result, log) = open_with(StubBehavior::default(), 0x1f17);
    let live = result.unwrap();
    log.clear();

    live.close().unwrap();
    assert_eq!(log.calls(), vec![Call::ReleaseInterface(0)]);
}

#[test]
fn test_close_respects_reattach_setting() {
    let (descriptor, log) = descriptor_for(StubDevice::new(0x1430, 0x1f17).with_behavior(
        StubBehavior {
            kernel_driver_active: true,
            ..Default::default()
        },
    ));
    let settings = SessionSettings {
        reattach_kernel_driver: false,
        ..Default::default()
    };
    let live = session::open(descriptor, &PortalCommands, settings).unwrap();
    log.clear();

    live.close().unwrap();
    assert_eq!(log.calls(), vec![Call::ReleaseInterface(0)]);
}

#[test]
fn test_close_reports_release_failure() {
    let (result, _log) = open_with(
        StubBehavior {
            release_error: Some(rusb::Error::NoDevice),
            ..Default::default()
        },
        0x1f17,
    );

    let err = result.unwrap().close().err().expect("close should fail");
    assert!(matches!(
        err,
        PortalError::InterfaceRelease {
            interface: 0,
            source: rusb::Error::NoDevice
        }
    ));
}

// ============================================================================
// End-to-end
// ============================================================================

#[test]
fn test_wireless_portal_end_to_end() {
    let transport = StubTransport::new(vec![
        StubDevice::new(0x046d, 0xc52b),
        StubDevice::new(0x1430, 0x0150),
    ]);
    let log = transport.log();

    let descriptor = discovery::find(&transport, &DeviceRegistry::builtin(), 0)
        .unwrap()
        .expect("portal not found");
    let params = descriptor.params().clone();
    assert!(params.command_prefix.is_empty());
    assert_eq!(params.input_endpoint, 0x81);
    assert_eq!(params.output_endpoint, 0x02);
    assert!(params.using_defaults);
    assert!(!log.touched_device());

    let live = session::open(descriptor, &PortalCommands, SessionSettings::default()).unwrap();
    let handshake = log.calls();
    assert_eq!(handshake[0], Call::Enumerate);
    assert_eq!(handshake[1], Call::Open { bus: 1, address: 2 });
    assert_eq!(handshake[2], Call::Reset);

    log.clear();
    live.send(&[0xAA]).unwrap();
    assert_eq!(log.writes(), vec![(0x02, vec![0xAA])]);
}

#[test]
fn test_custom_command_builder() {
    struct Silent;

    impl CommandBuilder for Silent {
        fn reset(&self) -> Vec<u8> {
            Vec::new()
        }

        fn activate(&self) -> Vec<u8> {
            vec![0xFF]
        }
    }

    let (descriptor, log) = descriptor_for(StubDevice::new(0x1430, 0x1f17));
    session::open(descriptor, &Silent, SessionSettings::default()).unwrap();

    assert_eq!(
        log.writes(),
        vec![(0x02, vec![0x0B, 0x14]), (0x02, vec![0x0B, 0x14, 0xFF])]
    );
}

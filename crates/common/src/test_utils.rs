//! Test utilities for skyportal
//!
//! Provides mock values and helper functions for testing across crates.
//!
//! # Example
//!
//! ```
//! use common::test_utils::create_mock_portal_info;
//!
//! let portal = create_mock_portal_info(0, 0x1f17);
//! assert_eq!(portal.vendor_id, 0x1430);
//! assert_eq!(portal.params.command_prefix, vec![0x0B, 0x14]);
//! ```

use protocol::{DeviceRegistry, PORTAL_VENDOR_ID, PortalInfo, SessionId};
use std::future::Future;
use std::time::Duration;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a mock PortalInfo for testing
///
/// Parameters are resolved through the built-in registry, so the prefix and
/// endpoints match what discovery would report for `product_id`.
pub fn create_mock_portal_info(index: usize, product_id: u16) -> PortalInfo {
    let registry = DeviceRegistry::builtin();

    PortalInfo {
        index,
        vendor_id: PORTAL_VENDOR_ID,
        product_id,
        bus_number: 1,
        device_address: (index % 127) as u8 + 1,
        product_name: registry.product_name(product_id).map(str::to_string),
        params: registry.resolve(product_id),
    }
}

/// Create a list of mock portals alternating wired and wireless products
pub fn create_mock_portal_list(count: usize) -> Vec<PortalInfo> {
    (0..count)
        .map(|i| {
            let product_id = if i % 2 == 0 {
                protocol::WIRED_PRODUCT_ID
            } else {
                protocol::WIRELESS_PRODUCT_ID
            };
            create_mock_portal_info(i, product_id)
        })
        .collect()
}

/// Create a mock SessionId for testing
pub fn create_mock_session_id(id: u32) -> SessionId {
    SessionId(id)
}

/// Timeout wrapper for async tests
///
/// Wraps an async operation with a timeout to prevent tests from hanging.
///
/// # Example
/// ```ignore
/// use common::test_utils::{with_timeout, DEFAULT_TEST_TIMEOUT};
///
/// #[tokio::test]
/// async fn test_with_timeout() {
///     let result = with_timeout(DEFAULT_TEST_TIMEOUT, async { 42 }).await.unwrap();
///     assert_eq!(result, 42);
/// }
/// ```
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError { duration })
}

/// Error returned when a test times out
#[derive(Debug)]
pub struct TimeoutError {
    /// The timeout duration that was exceeded
    pub duration: Duration,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Test timed out after {:?}", self.duration)
    }
}

impl std::error::Error for TimeoutError {}

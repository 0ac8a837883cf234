//! Device registry
//!
//! Maps USB vendor/product identifiers to the per-product parameters a
//! session needs: the command prefix and the endpoint pair. Products are
//! keyed by product id, so adding a product never shifts another one's
//! parameters.

use crate::types::ProtocolParams;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Vendor ID shared by every known portal
pub const PORTAL_VENDOR_ID: u16 = 0x1430;

/// Wired portal (PC, Xbox)
pub const WIRED_PRODUCT_ID: u16 = 0x1f17;

/// Wireless portal (Wii, PS3)
pub const WIRELESS_PRODUCT_ID: u16 = 0x0150;

/// Command prefix the wired portal expects in front of every command
pub const WIRED_COMMAND_PREFIX: [u8; 2] = [0x0B, 0x14];

/// Input endpoint used when a product does not specify one
pub const DEFAULT_INPUT_ENDPOINT: u8 = 0x81;

/// Output endpoint used when a product does not specify one
pub const DEFAULT_OUTPUT_ENDPOINT: u8 = 0x02;

/// Per-product protocol profile
///
/// Endpoints left as `None` resolve to [`DEFAULT_INPUT_ENDPOINT`] and
/// [`DEFAULT_OUTPUT_ENDPOINT`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductProfile {
    /// Human-readable product name
    #[serde(default)]
    pub name: Option<String>,
    /// Bytes prepended to every command
    #[serde(default)]
    pub command_prefix: Vec<u8>,
    /// Input endpoint address
    #[serde(default)]
    pub input_endpoint: Option<u8>,
    /// Output endpoint address
    #[serde(default)]
    pub output_endpoint: Option<u8>,
}

/// Registry of accepted portals
///
/// A device is a portal only when both its vendor id and its product id
/// are accepted. A product may be accepted without a profile, in which case
/// it resolves to the defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRegistry {
    vendors: BTreeSet<u16>,
    products: BTreeSet<u16>,
    profiles: BTreeMap<u16, ProductProfile>,
}

impl DeviceRegistry {
    /// Create a registry that accepts nothing
    pub fn empty() -> Self {
        Self {
            vendors: BTreeSet::new(),
            products: BTreeSet::new(),
            profiles: BTreeMap::new(),
        }
    }

    /// The built-in portal tables
    pub fn builtin() -> Self {
        Self::empty()
            .with_vendor(PORTAL_VENDOR_ID)
            .with_product(
                WIRED_PRODUCT_ID,
                ProductProfile {
                    name: Some("usb wired (pc, xbox)".to_string()),
                    command_prefix: WIRED_COMMAND_PREFIX.to_vec(),
                    input_endpoint: Some(DEFAULT_INPUT_ENDPOINT),
                    output_endpoint: Some(DEFAULT_OUTPUT_ENDPOINT),
                },
            )
            .with_product(
                WIRELESS_PRODUCT_ID,
                ProductProfile {
                    name: Some("wii wireless".to_string()),
                    ..Default::default()
                },
            )
    }

    /// Accept an additional vendor id
    pub fn with_vendor(mut self, vendor_id: u16) -> Self {
        self.vendors.insert(vendor_id);
        self
    }

    /// Accept a product id and register (or replace) its profile
    pub fn with_product(mut self, product_id: u16, profile: ProductProfile) -> Self {
        self.products.insert(product_id);
        self.profiles.insert(product_id, profile);
        self
    }

    /// Accept a product id without registering a profile
    pub fn with_product_id(mut self, product_id: u16) -> Self {
        self.products.insert(product_id);
        self
    }

    /// Check whether a vendor/product pair identifies a portal
    pub fn accepts(&self, vendor_id: u16, product_id: u16) -> bool {
        self.vendors.contains(&vendor_id) && self.products.contains(&product_id)
    }

    /// Look up the registered profile for a product
    pub fn lookup(&self, product_id: u16) -> Option<&ProductProfile> {
        self.profiles.get(&product_id)
    }

    /// Resolve protocol parameters for a product
    ///
    /// Never fails: unregistered products and unset endpoints fall back to
    /// the defaults, which keeps untested product variants usable.
    pub fn resolve(&self, product_id: u16) -> ProtocolParams {
        match self.lookup(product_id) {
            Some(profile) => ProtocolParams {
                command_prefix: profile.command_prefix.clone(),
                input_endpoint: profile.input_endpoint.unwrap_or(DEFAULT_INPUT_ENDPOINT),
                output_endpoint: profile.output_endpoint.unwrap_or(DEFAULT_OUTPUT_ENDPOINT),
                using_defaults: profile.input_endpoint.is_none()
                    || profile.output_endpoint.is_none(),
            },
            None => ProtocolParams::defaults(),
        }
    }

    /// Product name for a product id, if registered
    pub fn product_name(&self, product_id: u16) -> Option<&str> {
        self.lookup(product_id)?.name.as_deref()
    }

    /// Accepted vendor ids
    pub fn vendors(&self) -> impl Iterator<Item = u16> + '_ {
        self.vendors.iter().copied()
    }

    /// Accepted product ids
    pub fn products(&self) -> impl Iterator<Item = u16> + '_ {
        self.products.iter().copied()
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_accepts_known_portals() {
        let registry = DeviceRegistry::builtin();

        assert!(registry.accepts(0x1430, 0x1f17));
        assert!(registry.accepts(0x1430, 0x0150));

        // Vendor alone or product alone is not enough
        assert!(!registry.accepts(0x1430, 0x1234));
        assert!(!registry.accepts(0x046d, 0x1f17));
        assert!(!registry.accepts(0x046d, 0x0150));
    }

    #[test]
    fn test_resolve_wired() {
        let params = DeviceRegistry::builtin().resolve(WIRED_PRODUCT_ID);

        assert_eq!(params.command_prefix, vec![0x0B, 0x14]);
        assert_eq!(params.input_endpoint, 0x81);
        assert_eq!(params.output_endpoint, 0x02);
        assert!(!params.using_defaults);
    }

    #[test]
    fn test_resolve_wireless_uses_default_endpoints() {
        let params = DeviceRegistry::builtin().resolve(WIRELESS_PRODUCT_ID);

        assert!(params.command_prefix.is_empty());
        assert_eq!(params.input_endpoint, 0x81);
        assert_eq!(params.output_endpoint, 0x02);
        assert!(params.using_defaults);
    }

    #[test]
    fn test_resolve_unregistered_product() {
        let registry = DeviceRegistry::builtin().with_product_id(0x9999);

        assert!(registry.accepts(PORTAL_VENDOR_ID, 0x9999));
        assert!(registry.lookup(0x9999).is_none());
        assert_eq!(registry.resolve(0x9999), ProtocolParams::defaults());
    }

    #[test]
    fn test_with_product_overrides_profile() {
        let registry = DeviceRegistry::builtin().with_product(
            WIRELESS_PRODUCT_ID,
            ProductProfile {
                name: None,
                command_prefix: vec![0x01],
                input_endpoint: Some(0x83),
                output_endpoint: Some(0x04),
            },
        );

        let params = registry.resolve(WIRELESS_PRODUCT_ID);
        assert_eq!(params.command_prefix, vec![0x01]);
        assert_eq!(params.input_endpoint, 0x83);
        assert_eq!(params.output_endpoint, 0x04);
        assert!(!params.using_defaults);
        assert_eq!(registry.product_name(WIRELESS_PRODUCT_ID), None);
    }

    #[test]
    fn test_empty_registry() {
        let registry = DeviceRegistry::empty();
        assert!(!registry.accepts(PORTAL_VENDOR_ID, WIRED_PRODUCT_ID));
        assert_eq!(registry.vendors().count(), 0);
        assert_eq!(registry.products().count(), 0);
    }

    #[test]
    fn test_product_names() {
        let registry = DeviceRegistry::builtin();
        assert_eq!(
            registry.product_name(WIRED_PRODUCT_ID),
            Some("usb wired (pc, xbox)")
        );
        assert_eq!(registry.product_name(0x4242), None);
    }
}

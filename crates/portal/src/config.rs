//! Portal configuration management

use crate::client::DEFAULT_OPERATION_TIMEOUT;
use crate::session::{DEFAULT_READ_LENGTH, DEFAULT_TRANSFER_TIMEOUT, SessionSettings};
use anyhow::{Context, Result, anyhow};
use protocol::{DeviceRegistry, ProductProfile};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortalConfig {
    pub general: GeneralSettings,
    pub usb: UsbSettings,
    /// Additional portals beyond the built-in ones
    #[serde(default)]
    pub registry: RegistrySettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralSettings {
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsbSettings {
    /// Which portal to use when several are attached (0-based)
    #[serde(default)]
    pub index: usize,
    /// Timeout for a single USB transfer
    #[serde(default = "UsbSettings::default_transfer_timeout_ms")]
    pub transfer_timeout_ms: u64,
    /// Timeout for a whole worker command (open, send, read, ...)
    #[serde(default = "UsbSettings::default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
    /// Buffer length for reads from the portal
    #[serde(default = "UsbSettings::default_read_length")]
    pub read_length: usize,
    /// Give the interface back to the kernel driver on close
    #[serde(default = "UsbSettings::default_reattach")]
    pub reattach_kernel_driver: bool,
}

impl UsbSettings {
    fn default_transfer_timeout_ms() -> u64 {
        DEFAULT_TRANSFER_TIMEOUT.as_millis() as u64
    }

    fn default_operation_timeout_ms() -> u64 {
        DEFAULT_OPERATION_TIMEOUT.as_millis() as u64
    }

    fn default_read_length() -> usize {
        DEFAULT_READ_LENGTH
    }

    fn default_reattach() -> bool {
        true
    }
}

impl Default for UsbSettings {
    fn default() -> Self {
        Self {
            index: 0,
            transfer_timeout_ms: Self::default_transfer_timeout_ms(),
            operation_timeout_ms: Self::default_operation_timeout_ms(),
            read_length: Self::default_read_length(),
            reattach_kernel_driver: Self::default_reattach(),
        }
    }
}

/// Registry extensions
///
/// # Example Configuration
/// ```toml
/// [registry]
/// extra_vendors = ["0x1430"]
///
/// [[registry.products]]
/// product_id = "0x1f17"
/// name = "usb wired"
/// command_prefix = [11, 20]
/// input_endpoint = 129
/// output_endpoint = 2
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// Vendor ids accepted in addition to the built-in one ("0x1430")
    #[serde(default)]
    pub extra_vendors: Vec<String>,
    /// Products to accept; an entry for a built-in product replaces its profile
    #[serde(default)]
    pub products: Vec<ProductSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSettings {
    /// Product id as hex ("0x0150")
    pub product_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub command_prefix: Vec<u8>,
    #[serde(default)]
    pub input_endpoint: Option<u8>,
    #[serde(default)]
    pub output_endpoint: Option<u8>,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            general: GeneralSettings {
                log_level: "info".to_string(),
            },
            usb: UsbSettings::default(),
            registry: RegistrySettings::default(),
        }
    }
}

impl PortalConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/skyportal/portal.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: PortalConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("skyportal").join("portal.toml")
        } else {
            PathBuf::from(".config/skyportal/portal.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.general.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.usb.transfer_timeout_ms == 0 {
            return Err(anyhow!("transfer_timeout_ms must be greater than 0"));
        }
        if self.usb.operation_timeout_ms == 0 {
            return Err(anyhow!("operation_timeout_ms must be greater than 0"));
        }
        if self.usb.read_length == 0 {
            return Err(anyhow!("read_length must be greater than 0"));
        }

        for vendor in &self.registry.extra_vendors {
            parse_hex_id(vendor, "vendor id")?;
        }
        for product in &self.registry.products {
            parse_hex_id(&product.product_id, "product id")?;
        }

        Ok(())
    }

    /// Build the device registry: built-in portals plus configured extensions
    pub fn registry(&self) -> Result<DeviceRegistry> {
        let mut registry = DeviceRegistry::builtin();

        for vendor in &self.registry.extra_vendors {
            registry = registry.with_vendor(parse_hex_id(vendor, "vendor id")?);
        }

        for product in &self.registry.products {
            let product_id = parse_hex_id(&product.product_id, "product id")?;
            registry = registry.with_product(
                product_id,
                ProductProfile {
                    name: product.name.clone(),
                    command_prefix: product.command_prefix.clone(),
                    input_endpoint: product.input_endpoint,
                    output_endpoint: product.output_endpoint,
                },
            );
        }

        Ok(registry)
    }

    /// Session tunables derived from the `[usb]` section
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            transfer_timeout: Duration::from_millis(self.usb.transfer_timeout_ms),
            read_length: self.usb.read_length,
            reattach_kernel_driver: self.usb.reattach_kernel_driver,
        }
    }

    /// How long the async client waits for each worker command
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.usb.operation_timeout_ms)
    }
}

/// Expand a user-supplied path (`~/...`)
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

/// Parse a hex id such as `0x1430`
fn parse_hex_id(id: &str, name: &str) -> Result<u16> {
    let hex_part = id
        .strip_prefix("0x")
        .or_else(|| id.strip_prefix("0X"))
        .ok_or_else(|| {
            anyhow!(
                "Invalid {} '{}', must start with '0x' (e.g., '0x1430')",
                name,
                id
            )
        })?;

    if hex_part.is_empty() || hex_part.len() > 4 {
        return Err(anyhow!(
            "Invalid {} '{}', hex part must be 1-4 digits",
            name,
            id
        ));
    }

    u16::from_str_radix(hex_part, 16)
        .map_err(|_| anyhow!("Invalid {} '{}', not a valid hex number", name, id))
}

//! Probe configuration management

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use session::{DEFAULT_TIMEOUT_MS, MAX_INTERFACES};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub probe: ProbeSettings,
    #[serde(default)]
    pub usb: UsbSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeSettings {
    pub log_level: String,
    /// Print JSON instead of text
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsbSettings {
    /// Device filters in VID:PID form, e.g. "0x1234:0x5678" or "0x1234:*"
    #[serde(default)]
    pub filters: Vec<String>,
    /// Timeout for every control transfer, in milliseconds
    #[serde(default = "UsbSettings::default_timeout_ms")]
    pub timeout_ms: u32,
    /// Interface to claim and release while probing
    #[serde(default)]
    pub interface: Option<u8>,
    /// Detach a bound kernel driver before claiming
    #[serde(default)]
    pub detach_kernel_driver: bool,
    /// Configuration descriptor to read
    #[serde(default)]
    pub config_index: u8,
}

impl Default for UsbSettings {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            timeout_ms: Self::default_timeout_ms(),
            interface: None,
            detach_kernel_driver: false,
            config_index: 0,
        }
    }
}

impl UsbSettings {
    fn default_timeout_ms() -> u32 {
        DEFAULT_TIMEOUT_MS
    }

    /// Parse every configured filter
    pub fn device_filters(&self) -> Result<Vec<DeviceFilter>> {
        self.filters.iter().map(|f| DeviceFilter::parse(f)).collect()
    }
}

/// Vendor/product filter where 0 matches any id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceFilter {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl DeviceFilter {
    /// Parse a VID:PID pattern (`0x1234:0x5678`, `0x1234:*`, `*:*`)
    pub fn parse(filter: &str) -> Result<Self> {
        let parts: Vec<&str> = filter.split(':').collect();
        if parts.len() != 2 {
            return Err(anyhow!(
                "Invalid filter format '{}', expected VID:PID (e.g., '0x1234:0x5678' or '0x1234:*')",
                filter
            ));
        }

        Ok(Self {
            vendor_id: Self::parse_part(parts[0], "VID")?,
            product_id: Self::parse_part(parts[1], "PID")?,
        })
    }

    fn parse_part(part: &str, name: &str) -> Result<u16> {
        if part == "*" {
            return Ok(0);
        }
        parse_config_hex_id(part, name)
    }
}

/// Parse a config hex id, which must carry the `0x` prefix
fn parse_config_hex_id(id: &str, name: &str) -> Result<u16> {
    let hex_part = id
        .strip_prefix("0x")
        .or_else(|| id.strip_prefix("0X"))
        .ok_or_else(|| {
            anyhow!(
                "Invalid {} '{}', must start with '0x' (e.g., '0x1234')",
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

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            probe: ProbeSettings {
                log_level: "info".to_string(),
                json: false,
            },
            usb: UsbSettings::default(),
        }
    }
}

impl ProbeConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            expand_path(&p)
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/hostlink/probe.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: ProbeConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!("Failed to load config: {}, using defaults", e);
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
            config_dir.join("hostlink").join("probe.toml")
        } else {
            PathBuf::from(".config/hostlink/probe.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.probe.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.probe.log_level,
                valid_levels.join(", ")
            ));
        }

        self.usb.device_filters()?;

        if let Some(iface) = self.usb.interface {
            if iface >= MAX_INTERFACES {
                return Err(anyhow!(
                    "Invalid interface {}, must be below {}",
                    iface,
                    MAX_INTERFACES
                ));
            }
        }

        if self.usb.timeout_ms == 0 {
            return Err(anyhow!("timeout_ms must be greater than zero"));
        }

        Ok(())
    }
}

fn expand_path(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(s) => PathBuf::from(shellexpand::tilde(s).as_ref()),
        None => path.to_path_buf(),
    }
}

/// Parse a vendor or product id from the command line; the `0x` prefix is optional
pub fn parse_hex_id(s: &str) -> std::result::Result<u16, String> {
    let hex_part = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u16::from_str_radix(hex_part, 16).map_err(|_| format!("'{}' is not a 16-bit hex id", s))
}

/// Parse a `BUS:ADDR` device location in decimal
pub fn parse_bus_address(s: &str) -> std::result::Result<(u8, u8), String> {
    let (bus, address) = s
        .split_once(':')
        .ok_or_else(|| format!("'{}' is not in BUS:ADDR form", s))?;

    let bus = bus
        .parse::<u8>()
        .map_err(|_| format!("Invalid bus number '{}'", bus))?;
    let address = address
        .parse::<u8>()
        .map_err(|_| format!("Invalid device address '{}'", address))?;
    Ok((bus, address))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = ProbeConfig::default();
        assert_eq!(config.probe.log_level, "info");
        assert!(!config.probe.json);
        assert_eq!(config.usb.timeout_ms, 1000);
        assert_eq!(config.usb.interface, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_filter_valid() {
        assert_eq!(
            DeviceFilter::parse("0x1234:0x5678").unwrap(),
            DeviceFilter {
                vendor_id: 0x1234,
                product_id: 0x5678
            }
        );
        assert_eq!(DeviceFilter::parse("0x1234:*").unwrap().product_id, 0);
        assert_eq!(DeviceFilter::parse("*:0x5678").unwrap().vendor_id, 0);
        assert_eq!(DeviceFilter::parse("*:*").unwrap(), DeviceFilter::default());
        assert_eq!(DeviceFilter::parse("0xABCD:0xEF01").unwrap().vendor_id, 0xabcd);
    }

    #[test]
    fn test_filter_invalid() {
        assert!(DeviceFilter::parse("1234:5678").is_err());
        assert!(DeviceFilter::parse("0x1234").is_err());
        assert!(DeviceFilter::parse("0x1234:0x5678:0x9abc").is_err());
        assert!(DeviceFilter::parse("0xGHIJ:0x5678").is_err());
        assert!(DeviceFilter::parse("0x12345:0x5678").is_err());
        assert!(DeviceFilter::parse("0x:0x5678").is_err());
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = ProbeConfig::default();
        config.probe.log_level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.probe.log_level = "debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_interface_and_timeout() {
        let mut config = ProbeConfig::default();
        config.usb.interface = Some(31);
        assert!(config.validate().is_ok());

        config.usb.interface = Some(32);
        assert!(config.validate().is_err());

        config.usb.interface = None;
        config.usb.timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("probe.toml");

        let mut config = ProbeConfig::default();
        config.usb.filters = vec!["0x0403:*".to_string()];
        config.usb.interface = Some(2);
        config.usb.detach_kernel_driver = true;
        config.save(&path).unwrap();

        let loaded = ProbeConfig::load(Some(path)).unwrap();
        assert_eq!(loaded.usb.filters, vec!["0x0403:*".to_string()]);
        assert_eq!(loaded.usb.interface, Some(2));
        assert!(loaded.usb.detach_kernel_driver);
        assert_eq!(loaded.usb.timeout_ms, config.usb.timeout_ms);
    }

    #[test]
    fn test_load_minimal_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("probe.toml");
        fs::write(&path, "[probe]\nlog_level = \"warn\"\n").unwrap();

        let config = ProbeConfig::load(Some(path)).unwrap();
        assert_eq!(config.probe.log_level, "warn");
        assert!(config.usb.filters.is_empty());
        assert_eq!(config.usb.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(config.usb.config_index, 0);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("probe.toml");
        fs::write(
            &path,
            "[probe]\nlog_level = \"info\"\n[usb]\nfilters = [\"04f9:*\"]\n",
        )
        .unwrap();

        assert!(ProbeConfig::load(Some(path)).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        assert!(ProbeConfig::load(Some(dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_parse_hex_id() {
        assert_eq!(parse_hex_id("0x04f9"), Ok(0x04f9));
        assert_eq!(parse_hex_id("04F9"), Ok(0x04f9));
        assert!(parse_hex_id("0x10000").is_err());
        assert!(parse_hex_id("xyz").is_err());
    }

    #[test]
    fn test_parse_bus_address() {
        assert_eq!(parse_bus_address("1:7"), Ok((1, 7)));
        assert_eq!(parse_bus_address("003:012"), Ok((3, 12)));
        assert!(parse_bus_address("1").is_err());
        assert!(parse_bus_address("1:256").is_err());
        assert!(parse_bus_address("a:1").is_err());
    }
}

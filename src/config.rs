//! Node configuration file
//!
//! Every section and key is optional:
//!
//! ```toml
//! [identity]
//! target = "blade"
//! firmware = "0.1.0"
//!
//! [flash]
//! size = "16 MiB"
//! page_size = 256
//! jedec_manufacturer = 0x01
//! jedec_device = 0x2018
//! verify_writes = true
//! erase_timeout_ms = 500
//! program_timeout_ms = 10
//!
//! [scheduler]
//! slice_degrees = 3
//! max_rpm = 3000        # 0 disables the bound
//!
//! [rotor]
//! rpm = 600.0
//!
//! [link]
//! baud = 115200
//! poll_timeout_ms = 1
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use synchron_core::flash::{FlashGeometry, FlashTimings, JedecId};
use synchron_core::slice::SchedulerConfig;
use synchron_core::wire::{Identity, DEFAULT_TARGET};
use thiserror::Error;

/// Errors loading the node configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The file is not valid TOML or has unknown keys
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// The effective configuration could not be printed
    #[error("cannot serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value is out of range
    #[error("invalid [{section}] settings: {source}")]
    Invalid {
        section: &'static str,
        source: synchron_core::Error,
    },
}

/// Whole configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    pub identity: IdentityConfig,
    pub flash: FlashConfig,
    pub scheduler: SchedulerSection,
    pub rotor: RotorConfig,
    pub link: LinkConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IdentityConfig {
    pub target: String,
    pub firmware: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET.into(),
            firmware: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlashConfig {
    #[serde(deserialize_with = "deserialize_size")]
    pub size: u32,
    #[serde(deserialize_with = "deserialize_size")]
    pub sector_size: u32,
    #[serde(deserialize_with = "deserialize_size")]
    pub page_size: u32,
    #[serde(deserialize_with = "deserialize_hex_u32")]
    pub jedec_manufacturer: u32,
    #[serde(deserialize_with = "deserialize_hex_u32")]
    pub jedec_device: u32,
    pub verify_writes: bool,
    pub erase_timeout_ms: u32,
    pub program_timeout_ms: u32,
}

impl Default for FlashConfig {
    fn default() -> Self {
        let geometry = FlashGeometry::default();
        Self {
            size: geometry.total_size,
            sector_size: geometry.sector_size,
            page_size: geometry.page_size,
            jedec_manufacturer: 0x01,
            jedec_device: 0x2018,
            verify_writes: true,
            erase_timeout_ms: 500,
            program_timeout_ms: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerSection {
    pub slice_degrees: u16,
    pub max_rpm: u32,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        let defaults = SchedulerConfig::default();
        Self {
            slice_degrees: defaults.slice_degrees,
            max_rpm: defaults.max_rpm.unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RotorConfig {
    /// Speed of the simulated rotor
    pub rpm: f32,
}

impl Default for RotorConfig {
    fn default() -> Self {
        Self { rpm: 600.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkConfig {
    pub baud: u32,
    pub poll_timeout_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            baud: synchron_serial::DEFAULT_BAUD,
            poll_timeout_ms: 1,
        }
    }
}

/// Deserialize a u32 that can be hex (0x...) or decimal
fn deserialize_hex_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match HexOrInt::deserialize(deserializer)? {
        HexOrInt::Int(n) => Ok(n),
        HexOrInt::Str(s) => parse_number(&s).map_err(serde::de::Error::custom),
    }
}

/// Deserialize a byte count: a number, or a string like "16 MiB"
fn deserialize_size<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match HexOrInt::deserialize(deserializer)? {
        HexOrInt::Int(n) => Ok(n),
        HexOrInt::Str(s) => parse_size(&s).map_err(serde::de::Error::custom),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HexOrInt {
    Int(u32),
    Str(String),
}

/// Parse a number that can be hex (0x...) or decimal
fn parse_number(s: &str) -> Result<u32, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("invalid hex: {}", e))
    } else {
        s.parse().map_err(|e| format!("invalid number: {}", e))
    }
}

/// Parse a size string like "16 MiB", "4 KiB" or "0x1000"
fn parse_size(s: &str) -> Result<u32, String> {
    if let Ok(n) = parse_number(s) {
        return Ok(n);
    }

    let lower = s.trim().to_lowercase();
    let (num, multiplier) = if let Some(n) = lower.strip_suffix("mib") {
        (n, 1024 * 1024)
    } else if let Some(n) = lower.strip_suffix("kib") {
        (n, 1024)
    } else if let Some(n) = lower.strip_suffix('b') {
        (n, 1)
    } else {
        return Err(format!("invalid size: {}", s));
    };

    let num: u32 = num
        .trim()
        .parse()
        .map_err(|_| format!("invalid size: {}", s))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| format!("size too large: {}", s))
}

impl NodeConfig {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check every section converts into a usable core setting
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.identity()?;
        self.geometry()?;
        self.expected_id()?;
        self.scheduler()?;
        Ok(())
    }

    /// Identity reported by HELLO
    pub fn identity(&self) -> Result<Identity, ConfigError> {
        Identity::new(&self.identity.target, &self.identity.firmware).map_err(|source| {
            ConfigError::Invalid {
                section: "identity",
                source,
            }
        })
    }

    /// Flash layout
    pub fn geometry(&self) -> Result<FlashGeometry, ConfigError> {
        let geometry = FlashGeometry {
            total_size: self.flash.size,
            sector_size: self.flash.sector_size,
            page_size: self.flash.page_size,
        };
        geometry.validate().map_err(|source| ConfigError::Invalid {
            section: "flash",
            source,
        })?;
        Ok(geometry)
    }

    /// Chip the node expects to find
    pub fn expected_id(&self) -> Result<JedecId, ConfigError> {
        let manufacturer = u8::try_from(self.flash.jedec_manufacturer);
        let device = u16::try_from(self.flash.jedec_device);
        match (manufacturer, device) {
            (Ok(manufacturer), Ok(device)) => Ok(JedecId::new(manufacturer, device)),
            _ => Err(ConfigError::Invalid {
                section: "flash",
                source: synchron_core::Error::JedecIdMismatch,
            }),
        }
    }

    /// Busy polling bounds derived from the timeouts
    pub fn timings(&self) -> FlashTimings {
        FlashTimings {
            page_program_timeout_us: self.flash.program_timeout_ms.saturating_mul(1000),
            sector_erase_timeout_us: self.flash.erase_timeout_ms.saturating_mul(1000),
            ..FlashTimings::default()
        }
    }

    /// Slice layout and speed bound
    pub fn scheduler(&self) -> Result<SchedulerConfig, ConfigError> {
        let config = SchedulerConfig {
            slice_degrees: self.scheduler.slice_degrees,
            max_rpm: (self.scheduler.max_rpm > 0).then_some(self.scheduler.max_rpm),
        };
        config.validate().map_err(|source| ConfigError::Invalid {
            section: "scheduler",
            source,
        })?;
        Ok(config)
    }

    /// Link poll timeout
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.link.poll_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = NodeConfig::from_toml_str("").unwrap();
        assert_eq!(config, NodeConfig::default());
        assert_eq!(config.geometry().unwrap(), FlashGeometry::default());
        assert_eq!(config.expected_id().unwrap(), JedecId::new(0x01, 0x2018));
        assert_eq!(config.scheduler().unwrap(), SchedulerConfig::default());
    }

    #[test]
    fn test_full_file() {
        let config = NodeConfig::from_toml_str(
            r#"
            [identity]
            target = "blade"
            firmware = "2.1.0-rc1"

            [flash]
            size = "4 MiB"
            sector_size = "4 KiB"
            page_size = 256
            jedec_manufacturer = "0xEF"
            jedec_device = 0x4016
            verify_writes = false
            erase_timeout_ms = 400

            [scheduler]
            slice_degrees = 6
            max_rpm = 0

            [rotor]
            rpm = 1200.0

            [link]
            poll_timeout_ms = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.geometry().unwrap().total_size, 4 * 1024 * 1024);
        assert_eq!(config.expected_id().unwrap(), JedecId::new(0xEF, 0x4016));
        assert!(!config.flash.verify_writes);
        assert_eq!(config.timings().sector_erase_timeout_us, 400_000);
        assert_eq!(config.timings().page_program_timeout_us, 10_000);
        assert_eq!(config.scheduler().unwrap().max_rpm, None);
        assert_eq!(config.scheduler().unwrap().slices_per_rev(), 60);
        assert_eq!(config.identity().unwrap().firmware(), "2.1.0-rc1");
        assert_eq!(config.poll_timeout(), Duration::ZERO);
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let err = NodeConfig::from_toml_str("[scheduler]\nslice_degrees = 7\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                section: "scheduler",
                ..
            }
        ));

        let err = NodeConfig::from_toml_str("[flash]\npage_size = 300\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { section: "flash", .. }));

        let err = NodeConfig::from_toml_str("[flash]\njedec_manufacturer = 0x1FF\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { section: "flash", .. }));

        let err = NodeConfig::from_toml_str("[identity]\ntarget = \"a\\\"b\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { section: "identity", .. }));
    }

    #[test]
    fn test_rejects_unknown_keys() {
        let err = NodeConfig::from_toml_str("[flash]\nchip = \"W25Q128\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_printed_config_reloads() {
        let config = NodeConfig::default();
        let text = config.to_toml_string().unwrap();
        assert_eq!(NodeConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("4096"), Ok(4096));
        assert_eq!(parse_size("0x1000"), Ok(4096));
        assert_eq!(parse_size("16 MiB"), Ok(16 * 1024 * 1024));
        assert_eq!(parse_size("4kib"), Ok(4096));
        assert!(parse_size("16 furlongs").is_err());
        assert!(parse_size("8192 MiB").is_err());
    }
}

//! Configuration module

use crate::interactive::OverwriteMode;
use crate::strategy::{CompressionLevel, LARGE_PAYLOAD_THRESHOLD};
use crate::{Error, Result};
use dirs::config_dir;
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Packing defaults
    #[serde(default)]
    pub package: PackageConfig,
    /// Extraction defaults
    #[serde(default)]
    pub extract: ExtractConfig,
    /// Identity written into generated bundle manifests
    #[serde(default)]
    pub bundle: BundleConfig,
}

/// Packing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageConfig {
    /// Default compression level
    pub compression: CompressionLevel,
    /// Aggregate size above which entries are stored uncompressed
    #[serde(deserialize_with = "deserialize_size")]
    pub large_payload_threshold: u64,
    /// Require AppxManifest.xml at the root of packed directories
    pub require_manifest: bool,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            compression: CompressionLevel::Normal,
            large_payload_threshold: LARGE_PAYLOAD_THRESHOLD,
            require_manifest: true,
        }
    }
}

/// Extraction configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// What to do when a destination file already exists
    pub overwrite: OverwriteMode,
}

/// Bundle identity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleConfig {
    /// Bundle identity name
    pub name: String,
    /// Bundle publisher
    pub publisher: String,
    /// Bundle version (four-part)
    pub version: String,
    /// Architecture recorded for each contained package
    pub architecture: String,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            name: "BundleIdentity".to_string(),
            publisher: "CN=Publisher".to_string(),
            version: "1.0.0.0".to_string(),
            architecture: "x64".to_string(),
        }
    }
}

/// Accept either a byte count or a size string like "10GiB"
fn deserialize_size<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SizeValue {
        Numeric(u64),
        String(String),
    }

    match SizeValue::deserialize(deserializer)? {
        SizeValue::Numeric(bytes) => Ok(bytes),
        SizeValue::String(s) => {
            parse_size(&s).map_err(|e| D::Error::custom(format!("Failed to parse size: {}", e)))
        }
    }
}

/// Parse size string like "100MiB" to bytes
pub fn parse_size(size_str: &str) -> Result<u64> {
    let size_str = size_str.trim();

    if let Ok(bytes) = size_str.parse::<u64>() {
        return Ok(bytes);
    }

    let split_pos = size_str
        .chars()
        .position(|c| !c.is_ascii_digit() && c != '.')
        .unwrap_or(size_str.len());

    if split_pos == 0 {
        return Err(Error::Config(format!("Invalid size format: {}", size_str)));
    }

    let (number_part, unit_part) = size_str.split_at(split_pos);
    let number: f64 = number_part
        .parse()
        .map_err(|_| Error::Config(format!("Invalid number in size: {}", number_part)))?;

    let multiplier: u64 = match unit_part.trim().to_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" => 1_000,
        "m" | "mb" => 1_000_000,
        "g" | "gb" => 1_000_000_000,
        "t" | "tb" => 1_000_000_000_000,
        "ki" | "kib" => 1_024,
        "mi" | "mib" => 1_048_576,
        "gi" | "gib" => 1_073_741_824,
        "ti" | "tib" => 1_099_511_627_776,
        _ => {
            return Err(Error::Config(format!(
                "Unknown size unit: {}",
                unit_part
            )))
        }
    };

    Ok((number * multiplier as f64) as u64)
}

impl Config {
    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = config_dir()
            .ok_or_else(|| Error::Config("Unable to determine config directory".to_string()))?;

        let appx_dir = config_dir.join("appx");
        if !appx_dir.exists() {
            fs::create_dir_all(&appx_dir)?;
        }

        Ok(appx_dir.join("config.toml"))
    }

    /// Get default configuration content with comments
    pub fn default_config_content() -> String {
        r#"# appx configuration file

[package]
# Default compression level: none, fast, normal, maximum
compression = "normal"
# Payloads larger than this are stored without compression so that
# finalizing the package stays bounded. Bytes or a size string.
large_payload_threshold = "10GiB"
# Refuse to pack directories without an AppxManifest.xml at their root
require_manifest = true

[extract]
# What to do when a file already exists: ask, yes, no
overwrite = "ask"

[bundle]
# Identity written into generated AppxBundleManifest.xml files
name = "BundleIdentity"
publisher = "CN=Publisher"
version = "1.0.0.0"
architecture = "x64"
"#
        .to_string()
    }

    /// Load configuration from file, writing the default file if missing
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            fs::write(&path, Self::default_config_content())?;
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)?;
        Self::from_toml(&contents)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(&path, contents)?;
        Ok(())
    }

    /// Load configuration or use defaults if loading fails
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}

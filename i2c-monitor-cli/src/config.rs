//! Configuration loading and parsing

use crate::aardvark::AdapterOptions;
use crate::output::OutputFormat;
use anyhow::{Context, Result};
use i2c_monitor_decoder::DEFAULT_READ_BUFFER_SIZE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from an optional TOML file)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub adapter: AdapterConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdapterConfig {
    /// Path to the vendor shared library (aardvark.so / aardvark.dll)
    pub library: Option<PathBuf>,
    /// Enable the adapter's 2.2k I2C pull-up resistors
    #[serde(default)]
    pub i2c_pullups: bool,
    /// Enable the adapter's target power pins
    #[serde(default)]
    pub target_power: bool,
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: u16,
}

fn default_read_buffer_size() -> u16 {
    DEFAULT_READ_BUFFER_SIZE
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            library: None,
            i2c_pullups: false,
            target_power: false,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl AdapterConfig {
    pub fn options(&self) -> AdapterOptions {
        AdapterOptions {
            i2c_pullups: self.i2c_pullups,
            target_power: self.target_power,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    Ok(config)
}

//! Configuration file support for cpapnight.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/cpapnight/config.toml`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub integrity: IntegrityConfig,

    #[serde(default)]
    pub decode: DecodeConfig,
}

/// Location of the SD card dump
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Session reconstruction parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Morning segments shorter than this are treated as separate short
    /// sessions and left out of the night. 0 disables the filter.
    #[serde(default)]
    pub min_segment_secs: u32,

    /// Nights with at least this many hours count as compliant
    #[serde(default = "default_compliance_hours")]
    pub compliance_hours: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_segment_secs: 0,
            compliance_hours: default_compliance_hours(),
        }
    }
}

/// Integrity check tolerances
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IntegrityConfig {
    #[serde(default = "default_pressure_tolerance")]
    pub pressure_tolerance_cmh2o: f64,

    #[serde(default = "default_usage_tolerance")]
    pub usage_tolerance_hours: f64,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            pressure_tolerance_cmh2o: default_pressure_tolerance(),
            usage_tolerance_hours: default_usage_tolerance(),
        }
    }
}

/// Header decoding options
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct DecodeConfig {
    /// Accepted header version strings. Empty accepts any all-digit version.
    #[serde(default)]
    pub accepted_versions: Vec<String>,
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| {
        std::env::var("HOME")
            .map(|home| PathBuf::from(home).join(".local/share"))
            .unwrap_or_else(|_| PathBuf::from("."))
    });
    base.join("cpapnight").join("DATAFILE")
}

fn default_compliance_hours() -> f64 {
    4.0
}

fn default_pressure_tolerance() -> f64 {
    1.0
}

fn default_usage_tolerance() -> f64 {
    0.1
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| {
            std::env::var("HOME")
                .map(|home| PathBuf::from(home).join(".config"))
                .unwrap_or_else(|_| PathBuf::from("."))
        });
        base.join("cpapnight").join("config.toml")
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Reject tolerances that would make every check pass or fail
    pub fn validate(&self) -> Result<()> {
        if !(self.integrity.pressure_tolerance_cmh2o >= 0.0) {
            return Err(Error::Config(format!(
                "pressure_tolerance_cmh2o must be >= 0, got {}",
                self.integrity.pressure_tolerance_cmh2o
            )));
        }
        if !(self.integrity.usage_tolerance_hours >= 0.0) {
            return Err(Error::Config(format!(
                "usage_tolerance_hours must be >= 0, got {}",
                self.integrity.usage_tolerance_hours
            )));
        }
        if !(self.session.compliance_hours >= 0.0) {
            return Err(Error::Config(format!(
                "compliance_hours must be >= 0, got {}",
                self.session.compliance_hours
            )));
        }
        Ok(())
    }
}

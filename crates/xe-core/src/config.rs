//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{EmulatorError, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub gpu: GpuConfig,
    pub memory: MemoryConfig,
    pub debug: DebugConfig,
}

/// Command processor configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GpuConfig {
    /// Sleep inside long WAIT_REG_MEM polls instead of just yielding
    pub vsync: bool,
    /// Sample count reported for finished occlusion queries (negative disables)
    pub occlusion_fake_sample_count: i32,
    /// Maximum nesting of indirect buffers
    pub max_indirect_depth: u32,
    /// Log every decoded packet header
    pub trace_packets: bool,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            vsync: true,
            occlusion_fake_sample_count: 1000,
            max_indirect_depth: 16,
            trace_packets: false,
        }
    }
}

/// Guest memory configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemoryConfig {
    /// Size of backed physical memory in bytes (power of two)
    pub physical_size: u32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            physical_size: 0x2000_0000,
        }
    }
}

/// Log verbosity
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

/// Debug configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    pub log_level: LogLevel,
    pub log_to_file: bool,
    pub log_path: PathBuf,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_to_file: false,
            log_path: PathBuf::from("oxidized-xenos.log"),
        }
    }
}

impl Config {
    /// Directory holding the configuration file
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("oxidized-xenos"))
    }

    /// Path of the configuration file
    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Load configuration from the default location, falling back to defaults
    /// when no file exists yet
    pub fn load() -> Result<Self> {
        let Some(path) = Self::config_path() else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| EmulatorError::Config(e.to_string()))
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir()
            .ok_or_else(|| EmulatorError::Config("No configuration directory".to_string()))?;
        std::fs::create_dir_all(&dir)?;
        let contents =
            toml::to_string_pretty(self).map_err(|e| EmulatorError::Config(e.to_string()))?;
        std::fs::write(dir.join("config.toml"), contents)?;
        Ok(())
    }
}

//! Configuration management for pkgref
//!
//! Handles the ~/.pkgref/ directory and config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::ScopeOverlapPolicy;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Default log filter when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub formatting: FormattingConfig,
    #[serde(default)]
    pub add: AddConfig,
    #[serde(default)]
    pub feed: FeedConfig,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            formatting: FormattingConfig::default(),
            add: AddConfig::default(),
            feed: FeedConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FormattingConfig {
    /// Indent unit for new elements when the project file gives no hint
    pub indent: String,
}

impl Default for FormattingConfig {
    fn default() -> Self {
        Self {
            indent: "  ".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct AddConfig {
    #[serde(default)]
    pub scope_overlap: ScopeOverlapPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct FeedConfig {
    pub package_details_uri: Option<String>,
}

/// Returns the path to the pkgref home directory (~/.pkgref)
pub fn pkgref_home() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".pkgref"))
}

/// Returns paths to pkgref files
pub struct PkgrefPaths {
    pub root: PathBuf,
    pub config: PathBuf,
}

impl PkgrefPaths {
    pub fn new() -> Result<Self> {
        let root = pkgref_home()?;
        Ok(Self::at(root))
    }

    pub fn at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            config: root.join("config.toml"),
            root,
        }
    }

    /// Create the root directory if it doesn't exist
    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.root).context("Failed to create pkgref root")?;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.config.exists()
    }
}

/// Load configuration from disk, falling back to defaults
pub fn load_config() -> Result<Config> {
    let paths = PkgrefPaths::new()?;
    load_config_from(&paths.config)
}

pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = fs::read_to_string(path).context("Failed to read config.toml")?;
    toml::from_str(&content).context("Failed to parse config.toml")
}

/// Save configuration to disk
pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config).context("Failed to serialize config")?;
    fs::write(path, content).context("Failed to write config.toml")?;
    Ok(())
}

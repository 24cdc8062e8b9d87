//! Configuration file loading.
//!
//! Loads runtime configuration from TOML files at XDG-compliant locations.

use crate::config::types::RuntimeConfig;
use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Default configuration file name for project-local config.
const LOCAL_CONFIG_NAME: &str = "agent-runtime.toml";

/// Default configuration file name within XDG config directory.
const XDG_CONFIG_NAME: &str = "config.toml";

/// Application name for XDG directory lookup.
const APP_NAME: &str = "agent-runtime";

/// Loads configuration from the default search paths.
///
/// Search order:
/// 1. `./agent-runtime.toml` (project-local)
/// 2. `~/.config/agent-runtime/config.toml` (XDG config)
///
/// Returns an empty configuration if no config file is found.
///
/// # Errors
///
/// Returns an error if a config file exists but cannot be read or parsed.
pub fn load() -> Result<RuntimeConfig, ConfigError> {
    for path in search_paths() {
        if path.exists() {
            tracing::debug!(path = %path.display(), "loading runtime configuration");
            return from_path(&path);
        }
    }

    Ok(RuntimeConfig::default())
}

/// Loads configuration from a specific file path.
///
/// # Errors
///
/// Returns an error if the file cannot be read, or if its contents are not
/// valid TOML for the configuration schema.
pub fn from_path(path: &Path) -> Result<RuntimeConfig, ConfigError> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| ConfigError::read(path, e.to_string()))?;

    from_str(&contents)
        .map_err(|e| ConfigError::parse(format!("failed to parse '{}': {}", path.display(), e)))
}

/// Parses configuration from a TOML string.
///
/// # Errors
///
/// Returns an error if the TOML is invalid or doesn't match the schema.
pub fn from_str(toml_str: &str) -> Result<RuntimeConfig, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::parse(format!("invalid TOML: {e}")))
}

/// Returns the paths that would be searched for configuration files.
#[must_use]
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(LOCAL_CONFIG_NAME)];

    if let Some(dir) = xdg_config_dir() {
        paths.push(dir.join(XDG_CONFIG_NAME));
    }

    paths
}

/// Returns the path to the XDG config directory for the runtime.
///
/// This is `~/.config/agent-runtime` on most systems.
#[must_use]
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(APP_NAME))
}

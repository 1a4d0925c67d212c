//! Configuration loading and config file resolution

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable consulted when no command-line path is given
pub const CONFIG_ENV_VAR: &str = "LBX_CONFIG";

/// Config file resolution following priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. `<config dir>/lbx/config.toml` if it exists
/// 4. None (caller falls back to compiled defaults)
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Per-user config file
    default_config_file().filter(|p| p.exists())
}

/// Platform config file location (`~/.config/lbx/config.toml` on Linux)
pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("lbx").join("config.toml"))
}

/// Load a TOML file into `T`
///
/// A missing file is not an error: defaults are returned with a warning.
/// A file that exists but fails to parse is an error.
pub fn load_toml<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        info!("No config file given, using compiled defaults");
        return Ok(T::default());
    };

    if !path.exists() {
        warn!(
            "Config file {} not found, using compiled defaults",
            path.display()
        );
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)?;
    let parsed = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
    info!("Configuration loaded from {}", path.display());
    Ok(parsed)
}

/// Read a JSON document from disk
pub fn load_json<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

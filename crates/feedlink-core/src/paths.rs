//! Path resolution utilities.

use crate::env;
use crate::error::ConfigError;
use std::path::PathBuf;

/// Get the Feedlink base directory (`$FEEDLINK_HOME` or `~/.feedlink`).
pub fn base_dir() -> Result<PathBuf, ConfigError> {
    if let Some(home) = env::get_var(env::vars::FEEDLINK_HOME) {
        return Ok(expand_tilde(&home));
    }
    let home = dirs::home_dir().ok_or_else(|| {
        ConfigError::Validation("Could not determine home directory".to_string())
    })?;
    Ok(home.join(".feedlink"))
}

/// Get the main config file path (`~/.feedlink/feedlink.json5`).
pub fn config_file() -> Result<PathBuf, ConfigError> {
    Ok(base_dir()?.join("feedlink.json5"))
}

/// Resolve the config file, preferring an explicit path, then `$FEEDLINK_CONFIG`.
pub fn resolve_config_file(explicit: Option<&std::path::Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Some(path) = env::get_var(env::vars::FEEDLINK_CONFIG) {
        return Ok(expand_tilde(&path));
    }
    config_file()
}

/// Expand tilde (~) in a path.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

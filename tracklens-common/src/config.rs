//! Configuration file loading and root folder resolution
//!
//! Every TrackLens setting resolves in the same priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Built-in / OS-dependent default (fallback)

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "TRACKLENS_ROOT_FOLDER";

/// Environment variable naming the TOML config file
pub const CONFIG_FILE_ENV: &str = "TRACKLENS_CONFIG";

/// Logging configuration section shared by every binary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive (e.g. "info", "tracklens_server=debug")
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Resolve the root folder.
///
/// `toml_value` is the `root_folder` key of an already-loaded config file,
/// if any.
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_value: Option<&Path>,
) -> PathBuf {
    if let Some(path) = cli_arg {
        debug!(path = %path.display(), "Root folder from command line");
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            debug!(path = %path, "Root folder from environment");
            return PathBuf::from(path);
        }
    }

    if let Some(path) = toml_value {
        debug!(path = %path.display(), "Root folder from config file");
        return path.to_path_buf();
    }

    get_default_root_folder()
}

/// Locate the TOML config file.
///
/// An explicit path (CLI or environment) must exist; the platform default
/// location is optional and yields `None` when absent.
pub fn locate_config_file(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    let explicit = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from));

    if let Some(path) = explicit {
        if path.exists() {
            return Ok(Some(path));
        }
        return Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        )));
    }

    Ok(default_config_path().filter(|p| p.exists()))
}

/// Read and parse a TOML config file into `T`.
pub fn load_toml_config<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Resolve `path` against `root` unless it is already absolute.
pub fn resolve_under(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tracklens").join("config.toml"))
}

/// OS-dependent default root folder path
fn get_default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/tracklens
        dirs::data_local_dir()
            .map(|d| d.join("tracklens"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/tracklens"))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support/tracklens
        dirs::data_dir()
            .map(|d| d.join("tracklens"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/tracklens"))
    } else if cfg!(target_os = "windows") {
        // %LOCALAPPDATA%\tracklens
        dirs::data_local_dir()
            .map(|d| d.join("tracklens"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\tracklens"))
    } else {
        PathBuf::from("./tracklens_data")
    }
}

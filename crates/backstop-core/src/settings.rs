use std::fs;
use std::path::{Path, PathBuf};

use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_SOCKET: &str = "/tmp/backstop.sock";
pub const DEFAULT_DISPLAY_CAP: usize = 100;
pub const SOCKET_ENV: &str = "BACKSTOP_SOCKET";

/// Client-side settings. The exclusion configuration itself lives with the
/// backend; this file only says how to reach it and how to present it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BackstopSettings {
    pub version: u32,
    #[serde(default = "default_socket")]
    pub socket: PathBuf,
    #[serde(default)]
    pub display: DisplaySettings,
    #[serde(default)]
    pub log: LogSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DisplaySettings {
    #[serde(default = "default_cap")]
    pub cap: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_socket() -> PathBuf {
    PathBuf::from(DEFAULT_SOCKET)
}

fn default_cap() -> usize {
    DEFAULT_DISPLAY_CAP
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for BackstopSettings {
    fn default() -> Self {
        Self {
            version: 1,
            socket: default_socket(),
            display: DisplaySettings::default(),
            log: LogSettings::default(),
        }
    }
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self { cap: default_cap() }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("could not resolve home directory for settings path")]
    HomeDirectoryUnavailable,
    #[error("failed to read settings at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid settings: {message}")]
    Validation { message: String },
}

pub fn resolve_settings_dir() -> Result<PathBuf, SettingsError> {
    let base_dirs = BaseDirs::new().ok_or(SettingsError::HomeDirectoryUnavailable)?;
    Ok(base_dirs.home_dir().join(".config").join("backstop"))
}

pub fn resolve_settings_path() -> Result<PathBuf, SettingsError> {
    Ok(resolve_settings_dir()?.join("settings.toml"))
}

pub fn load_settings(path: &Path) -> Result<BackstopSettings, SettingsError> {
    let raw = fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let parsed: BackstopSettings = toml::from_str(&raw).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    validate_settings(&parsed)?;
    Ok(parsed)
}

/// Loads settings from `path`, falling back to defaults when the file does not
/// exist. Any other failure is reported.
pub fn load_settings_or_default(path: &Path) -> Result<BackstopSettings, SettingsError> {
    if !path.exists() {
        return Ok(BackstopSettings::default());
    }
    load_settings(path)
}

pub fn validate_settings(settings: &BackstopSettings) -> Result<(), SettingsError> {
    if settings.version != 1 {
        return Err(SettingsError::Validation {
            message: "version must be 1".to_string(),
        });
    }

    if settings.socket.as_os_str().is_empty() {
        return Err(SettingsError::Validation {
            message: "socket path must be non-empty".to_string(),
        });
    }

    if settings.display.cap == 0 {
        return Err(SettingsError::Validation {
            message: "display.cap must be at least 1".to_string(),
        });
    }

    if settings.log.level.trim().is_empty() {
        return Err(SettingsError::Validation {
            message: "log.level must be non-empty".to_string(),
        });
    }

    Ok(())
}

/// Picks the socket path: explicit flag, then `BACKSTOP_SOCKET`, then settings.
pub fn effective_socket(
    flag: Option<&Path>,
    env: Option<&str>,
    settings: &BackstopSettings,
) -> PathBuf {
    if let Some(path) = flag {
        return path.to_path_buf();
    }
    if let Some(value) = env.filter(|value| !value.trim().is_empty()) {
        return PathBuf::from(value);
    }
    settings.socket.clone()
}

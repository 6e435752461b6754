use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::DataSourceContext;
use crate::explorer::{ExplorerConfig, DEFAULT_SAMPLE_LIMIT};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const TOKEN_ENV_VAR: &str = "DBSCOPE_API_TOKEN";
pub const DEFAULT_KEYRING_SERVICE: &str = "dbscope";
const CONFIG_DIR_ENV_VAR: &str = "DBSCOPE_CONFIG_DIR";
const SETTINGS_FILE_NAME: &str = "settings.toml";
const LOG_FILE_NAME: &str = "dbscope.log";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TokenSource {
    #[default]
    EnvVar,
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataSourceEntry {
    pub id: u64,
    pub name: String,
}

impl DataSourceEntry {
    #[must_use]
    pub fn context(&self) -> DataSourceContext {
        DataSourceContext::new(self.id, self.name.clone())
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_sample_limit() -> usize {
    DEFAULT_SAMPLE_LIMIT
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_request_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub token_source: TokenSource,
    #[serde(default)]
    pub keyring_service: Option<String>,
    #[serde(default)]
    pub keyring_account: Option<String>,
    #[serde(default = "default_sample_limit")]
    pub sample_limit: usize,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub datasources: Vec<DataSourceEntry>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token_source: TokenSource::EnvVar,
            keyring_service: None,
            keyring_account: None,
            sample_limit: default_sample_limit(),
            debounce_ms: default_debounce_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            datasources: Vec::new(),
        }
    }
}

impl Settings {
    #[must_use]
    pub fn explorer_config(&self) -> ExplorerConfig {
        ExplorerConfig {
            sample_limit: self.sample_limit.max(1),
            debounce: Duration::from_millis(self.debounce_ms),
        }
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn keyring_service(&self) -> &str {
        self.keyring_service
            .as_deref()
            .unwrap_or(DEFAULT_KEYRING_SERVICE)
    }

    #[must_use]
    pub fn keyring_account(&self) -> &str {
        self.keyring_account.as_deref().unwrap_or(&self.base_url)
    }

    fn normalize(&mut self) {
        let mut by_id = BTreeMap::new();
        for entry in self.datasources.drain(..) {
            by_id.insert(entry.id, entry);
        }
        self.datasources = by_id.into_values().collect();
        self.base_url = self.base_url.trim_end_matches('/').to_string();
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("config directory is unavailable for this platform")]
    ConfigDirUnavailable,
    #[error("failed to read settings file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone)]
pub struct SettingsFile {
    path: PathBuf,
    settings: Settings,
}

impl SettingsFile {
    pub fn load_default() -> Result<Self, SettingsError> {
        Self::load_from_path(default_settings_path()?)
    }

    pub fn load_from_path(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self {
                path,
                settings: Settings::default(),
            });
        }

        let raw = fs::read_to_string(&path).map_err(|source| SettingsError::Read {
            path: path.clone(),
            source,
        })?;

        if raw.trim().is_empty() {
            return Ok(Self {
                path,
                settings: Settings::default(),
            });
        }

        let mut settings: Settings = toml::from_str(&raw).map_err(|source| SettingsError::Parse {
            path: path.clone(),
            source,
        })?;
        settings.normalize();

        Ok(Self { path, settings })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

pub fn default_config_dir() -> Result<PathBuf, SettingsError> {
    if let Some(custom) = env::var_os(CONFIG_DIR_ENV_VAR) {
        return Ok(PathBuf::from(custom));
    }

    let base_dir = if cfg!(target_os = "windows") {
        env::var_os("APPDATA")
            .map(PathBuf::from)
            .ok_or(SettingsError::ConfigDirUnavailable)?
    } else if let Some(xdg_config_home) = env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config_home)
    } else {
        let home = env::var_os("HOME").ok_or(SettingsError::ConfigDirUnavailable)?;
        PathBuf::from(home).join(".config")
    };

    Ok(base_dir.join("dbscope"))
}

pub fn default_settings_path() -> Result<PathBuf, SettingsError> {
    Ok(default_config_dir()?.join(SETTINGS_FILE_NAME))
}

/// The log file lives next to the settings file since the terminal belongs
/// to the UI.
pub fn default_log_path() -> Result<PathBuf, SettingsError> {
    Ok(default_config_dir()?.join(LOG_FILE_NAME))
}

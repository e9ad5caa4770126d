// Preferences store configuration
// Loaded from ~/.config/storyforge/prefs.toml

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Overrides `data_dir` when set (CI, containers, tests)
pub const DATA_DIR_ENV: &str = "STORYFORGE_PREFS_DIR";

/// Where preference records are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// One JSON file per user under `data_dir` (default)
    #[default]
    Dir,
    /// `prefs.db` SQLite database under `data_dir`
    Sqlite,
    /// Nothing persisted; every run starts from defaults
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: Backend,

    /// Storage directory, None = platform data dir
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Prepended to the user identity to form the storage key
    pub key_prefix: String,

    /// Log filter used when RUST_LOG is unset
    pub log_level: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Dir,
            data_dir: None,
            key_prefix: "userPreferences_".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

impl StoreConfig {
    /// Get the config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("storyforge")
            .join("prefs.toml")
    }

    /// Parse a config document. Missing keys take their defaults.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Load from the default path, falling back to defaults
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load from `path`, falling back to defaults.
    ///
    /// A missing file is normal. An unreadable or invalid file is logged and
    /// ignored so a bad config never blocks startup.
    pub fn load_from(path: &Path) -> Self {
        Self::try_load_from(path).unwrap_or_else(|e| {
            log::warn!("Error loading {}: {e}; using default config", path.display());
            Self::default()
        })
    }

    /// Load from `path`. A missing file gives the defaults; an unreadable or
    /// invalid one is an error.
    ///
    /// For callers that must set up logging from the config before they can
    /// report a bad file.
    pub fn try_load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::from_toml(&fs::read_to_string(path)?)
    }

    /// Save to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Effective storage directory.
    ///
    /// Checks in order:
    /// 1. `STORYFORGE_PREFS_DIR`
    /// 2. `data_dir` from the config file
    /// 3. `<platform data dir>/storyforge/prefs`
    pub fn resolved_data_dir(&self) -> PathBuf {
        if let Ok(dir) = env::var(DATA_DIR_ENV) {
            if !dir.is_empty() {
                return PathBuf::from(dir);
            }
        }
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("storyforge")
            .join("prefs")
    }

    /// SQLite database file for `Backend::Sqlite`
    pub fn sqlite_path(&self) -> PathBuf {
        self.resolved_data_dir().join("prefs.db")
    }
}

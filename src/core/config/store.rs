use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::paths::{
    app_dir, resolve_user_path, validate_path_type, ConfigDefaults, ConfigField, PathKind,
    CONFIG_FILE,
};
use crate::core::error::{ManagerError, ManagerResult};

/// Parsed `config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    #[serde(rename = "balatro_data_path")]
    pub data_path: PathBuf,
    #[serde(rename = "balatro_steam_path")]
    pub install_path: PathBuf,
    #[serde(rename = "profiles_directory")]
    pub profiles_dir: PathBuf,
}

impl ManagerConfig {
    pub fn from_defaults(defaults: &ConfigDefaults) -> Self {
        Self {
            data_path: defaults.data_path.clone(),
            install_path: defaults.install_path.clone(),
            profiles_dir: defaults.profiles_dir.clone(),
        }
    }

    pub fn get(&self, field: ConfigField) -> &Path {
        match field {
            ConfigField::DataPath => &self.data_path,
            ConfigField::InstallPath => &self.install_path,
            ConfigField::ProfilesDirectory => &self.profiles_dir,
        }
    }

    fn set(&mut self, field: ConfigField, value: PathBuf) {
        match field {
            ConfigField::DataPath => self.data_path = value,
            ConfigField::InstallPath => self.install_path = value,
            ConfigField::ProfilesDirectory => self.profiles_dir = value,
        }
    }

    /// True when both game directories are present on disk.
    pub fn game_paths_exist(&self) -> bool {
        self.install_path.exists() && self.data_path.exists()
    }

    /// Directory the game actually loads mods from.
    pub fn shared_mods_dir(&self) -> PathBuf {
        self.data_path.join("Mods")
    }
}

/// Reads and writes `config.json`, healing invalid fields from defaults.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    app_dir: PathBuf,
    defaults: ConfigDefaults,
}

impl ConfigStore {
    pub fn new(app_dir: PathBuf, defaults: ConfigDefaults) -> Self {
        Self { app_dir, defaults }
    }

    /// Store rooted at the per-user application data directory.
    pub fn from_platform() -> Self {
        let app_dir = app_dir();
        let defaults = ConfigDefaults::for_platform(&app_dir);
        Self::new(app_dir, defaults)
    }

    pub fn app_dir(&self) -> &Path {
        &self.app_dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.app_dir.join(CONFIG_FILE)
    }

    pub fn defaults(&self) -> &ConfigDefaults {
        &self.defaults
    }

    /// Placeholder text for an input field: the computed default path.
    pub fn text_placeholder(&self, field: ConfigField) -> String {
        field.default_value(&self.defaults).display().to_string()
    }

    /// Read and parse `config.json`. Missing or unparsable files yield `None`.
    pub async fn load(&self) -> Option<ManagerConfig> {
        let path = self.config_path();
        let raw = tokio::fs::read_to_string(&path).await.ok()?;
        match serde_json::from_str(&raw) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("Cannot parse {:?}: {}", path, e);
                None
            }
        }
    }

    /// First-run setup: create the app directory, the default profiles
    /// directory and a default `config.json` when none exists.
    pub async fn ensure_defaults(&self) -> ManagerResult<()> {
        create_dir(&self.app_dir).await?;
        create_dir(&self.defaults.profiles_dir).await?;

        let path = self.config_path();
        if !path.exists() {
            info!("Writing default config to {:?}", path);
            self.save(&ManagerConfig::from_defaults(&self.defaults))
                .await?;
        }
        Ok(())
    }

    /// Replace every absent, non-string or non-existent path in `raw` with
    /// its default, persisting the result if anything changed.
    pub async fn validate(&self, raw: &Value) -> ManagerResult<ManagerConfig> {
        let mut config = ManagerConfig::from_defaults(&self.defaults);
        let mut corrected = false;

        for field in ConfigField::ALL {
            let candidate = raw.get(field.key()).and_then(Value::as_str);
            match candidate {
                Some(value) if Path::new(value).exists() => {
                    config.set(field, PathBuf::from(value));
                }
                Some(value) => {
                    warn!(
                        "Config field {} points at missing path {:?}, resetting to default",
                        field.key(),
                        value
                    );
                    corrected = true;
                }
                None => {
                    warn!(
                        "Config field {} is missing or not a string, resetting to default",
                        field.key()
                    );
                    corrected = true;
                }
            }
        }

        if corrected {
            self.save(&config).await?;
        }
        Ok(config)
    }

    /// Startup path: defaults, read, validate. Never fails on a bad file.
    pub async fn load_validated(&self) -> ManagerResult<ManagerConfig> {
        self.ensure_defaults().await?;

        let path = self.config_path();
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!("Config {:?} is not valid JSON ({}), rebuilding", path, e);
                Value::Null
            }),
            Err(e) => {
                warn!("Cannot read {:?}: {}", path, e);
                Value::Null
            }
        };

        self.validate(&raw).await
    }

    /// Apply a single allow-listed update. Unknown keys, invalid values and
    /// unreadable config files are ignored and reported as `false`.
    pub async fn update(&self, key: &str, value: &str) -> bool {
        let Some(field) = ConfigField::from_key(key) else {
            debug!("Ignoring update of unknown config key {}", key);
            return false;
        };

        let accepted = match field {
            ConfigField::DataPath => validate_path_type(value, PathKind::Data).ok(),
            ConfigField::InstallPath => validate_path_type(value, PathKind::Install).ok(),
            ConfigField::ProfilesDirectory => {
                resolve_user_path(value).ok().filter(|path| path.is_dir())
            }
        };
        let Some(path) = accepted else {
            debug!("Rejected value {:?} for config key {}", value, key);
            return false;
        };

        let Some(mut config) = self.load().await else {
            return false;
        };
        config.set(field, path);

        match self.save(&config).await {
            Ok(()) => {
                info!("Updated config field {}", key);
                true
            }
            Err(e) => {
                warn!("Cannot persist config update for {}: {}", key, e);
                false
            }
        }
    }

    pub async fn save(&self, config: &ManagerConfig) -> ManagerResult<()> {
        let json = serde_json::to_string_pretty(config)?;
        let path = self.config_path();
        tokio::fs::write(&path, json)
            .await
            .map_err(|source| ManagerError::io(path, source))
    }
}

async fn create_dir(path: &Path) -> ManagerResult<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| ManagerError::io(path, source))
}

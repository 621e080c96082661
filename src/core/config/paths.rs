use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::error::{ManagerError, ManagerResult};

pub const APP_DIR_NAME: &str = "Balatro Instance Manager";
pub const CONFIG_FILE: &str = "config.json";

/// File the game writes into its data directory on first start.
pub const DATA_DIR_ENTRY: &str = "settings.jkr";

/// Entry that identifies a game installation directory.
pub fn game_entry_name() -> &'static str {
    if cfg!(target_os = "macos") {
        "Balatro.app"
    } else {
        "Balatro.exe"
    }
}

/// Per-user directory holding `config.json` and, by default, the profiles.
pub fn app_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Platform-computed fallback values for every config field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDefaults {
    pub data_path: PathBuf,
    pub install_path: PathBuf,
    pub profiles_dir: PathBuf,
}

impl ConfigDefaults {
    pub fn for_platform(app_dir: &Path) -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let data_root = dirs::data_dir().unwrap_or_else(|| home.clone());

        let (data_path, install_path) = if cfg!(target_os = "windows") {
            (
                data_root.join("Balatro"),
                PathBuf::from(r"C:\Program Files (x86)\Steam\steamapps\common\Balatro"),
            )
        } else if cfg!(target_os = "macos") {
            (
                data_root.join("Balatro"),
                data_root.join("Steam/steamapps/common/Balatro"),
            )
        } else {
            // Linux runs the Windows build through Proton.
            let steam = home.join(".local/share/Steam");
            (
                steam.join(
                    "steamapps/compatdata/2379780/pfx/drive_c/users/steamuser/AppData/Roaming/Balatro",
                ),
                steam.join("steamapps/common/Balatro"),
            )
        };

        Self {
            data_path,
            install_path,
            profiles_dir: app_dir.join("Profiles"),
        }
    }
}

/// The user-editable fields of `config.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigField {
    DataPath,
    InstallPath,
    ProfilesDirectory,
}

impl ConfigField {
    pub const ALL: [ConfigField; 3] = [
        ConfigField::DataPath,
        ConfigField::InstallPath,
        ConfigField::ProfilesDirectory,
    ];

    /// JSON key of the field inside `config.json`.
    pub fn key(self) -> &'static str {
        match self {
            ConfigField::DataPath => "balatro_data_path",
            ConfigField::InstallPath => "balatro_steam_path",
            ConfigField::ProfilesDirectory => "profiles_directory",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.key() == key)
    }

    /// Short UI names (`steam`, `install`, `data`, `profiles`) or full keys.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "profiles" => Some(ConfigField::ProfilesDirectory),
            other => other
                .parse::<PathKind>()
                .ok()
                .map(ConfigField::from)
                .or_else(|| Self::from_key(other)),
        }
    }

    pub fn default_value(self, defaults: &ConfigDefaults) -> &Path {
        match self {
            ConfigField::DataPath => &defaults.data_path,
            ConfigField::InstallPath => &defaults.install_path,
            ConfigField::ProfilesDirectory => &defaults.profiles_dir,
        }
    }
}

/// Kind of directory a user-entered path is expected to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathKind {
    Install,
    Data,
}

impl std::str::FromStr for PathKind {
    type Err = ManagerError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "install" | "steam" => Ok(PathKind::Install),
            "data" => Ok(PathKind::Data),
            other => Err(ManagerError::Other(format!("Unknown path kind: {other}"))),
        }
    }
}

impl From<PathKind> for ConfigField {
    fn from(kind: PathKind) -> Self {
        match kind {
            PathKind::Install => ConfigField::InstallPath,
            PathKind::Data => ConfigField::DataPath,
        }
    }
}

/// Check that `raw` points at a directory of the given kind.
///
/// The error string is meant to be shown to the user as-is.
pub fn validate_path_type(raw: &str, kind: PathKind) -> Result<PathBuf, String> {
    let label = match kind {
        PathKind::Install => "Install path",
        PathKind::Data => "Data path",
    };

    let path = resolve_user_path(raw).map_err(|_| format!("{label} is invalid."))?;
    if !path.is_dir() {
        return Err(format!("{label} does not exist."));
    }

    let entry = match kind {
        PathKind::Install => game_entry_name(),
        PathKind::Data => DATA_DIR_ENTRY,
    };
    if !path.join(entry).exists() {
        return Err(format!("{label} does not contain a {entry}."));
    }

    Ok(path)
}

/// Make a user-supplied path absolute against the current directory.
pub fn resolve_user_path(raw: &str) -> ManagerResult<PathBuf> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ManagerError::Other("Empty path".into()));
    }
    std::path::absolute(trimmed).map_err(|source| ManagerError::io(trimmed, source))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_keys_round_trip() {
        for field in ConfigField::ALL {
            assert_eq!(ConfigField::from_key(field.key()), Some(field));
        }
        assert_eq!(ConfigField::from_key("balatro_path"), None);
    }

    #[test]
    fn field_from_ui_names() {
        assert_eq!(ConfigField::from_name("steam"), Some(ConfigField::InstallPath));
        assert_eq!(ConfigField::from_name("data"), Some(ConfigField::DataPath));
        assert_eq!(
            ConfigField::from_name("profiles"),
            Some(ConfigField::ProfilesDirectory)
        );
        assert_eq!(
            ConfigField::from_name("balatro_data_path"),
            Some(ConfigField::DataPath)
        );
        assert_eq!(ConfigField::from_name("mods"), None);
    }

    #[test]
    fn path_kind_accepts_legacy_steam_alias() {
        assert_eq!("steam".parse::<PathKind>().unwrap(), PathKind::Install);
        assert_eq!("data".parse::<PathKind>().unwrap(), PathKind::Data);
        assert!("profiles".parse::<PathKind>().is_err());
    }

    #[test]
    fn validate_path_type_reports_missing_required_file() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().to_string_lossy().to_string();

        let err = validate_path_type(&raw, PathKind::Data).unwrap_err();
        assert_eq!(err, "Data path does not contain a settings.jkr.");

        std::fs::write(dir.path().join(DATA_DIR_ENTRY), b"").unwrap();
        assert_eq!(
            validate_path_type(&raw, PathKind::Data).unwrap(),
            dir.path().to_path_buf()
        );
    }

    #[test]
    fn validate_path_type_rejects_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("nope").to_string_lossy().to_string();
        assert_eq!(
            validate_path_type(&raw, PathKind::Install).unwrap_err(),
            "Install path does not exist."
        );
    }

    #[test]
    fn profiles_default_lives_under_app_dir() {
        let defaults = ConfigDefaults::for_platform(Path::new("/tmp/app"));
        assert_eq!(defaults.profiles_dir, PathBuf::from("/tmp/app/Profiles"));
    }
}

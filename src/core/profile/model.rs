use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::PathBuf;

pub const DESCRIPTOR_FILE: &str = "profile.json";
pub const MODS_DIR: &str = "Mods";

pub const DEFAULT_ICON: &str = "data:image/svg+xml,%3Csvg xmlns='http://www.w3.org/2000/svg' viewBox='0 0 1 1'%3E%3Crect width='1' height='1' fill='%23fe5f55'/%3E%3C/svg%3E";

/// A mod known to a profile.
///
/// On disk both variants share one JSON array; a `tag` field marks a
/// registered entry. That check happens once, in [`RawModEntry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModEntry {
    /// Installed through the catalog, carries registry metadata.
    Registered {
        name: String,
        author: String,
        icon: String,
        tag: String,
        path: PathBuf,
    },
    /// Found in the profile's `Mods/` folder without metadata.
    Unregistered { name: String, path: PathBuf },
}

impl ModEntry {
    pub fn name(&self) -> &str {
        match self {
            ModEntry::Registered { name, .. } | ModEntry::Unregistered { name, .. } => name,
        }
    }

    pub fn path(&self) -> &PathBuf {
        match self {
            ModEntry::Registered { path, .. } | ModEntry::Unregistered { path, .. } => path,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RawModEntry {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tag: Option<String>,
    path: PathBuf,
}

impl From<RawModEntry> for ModEntry {
    fn from(raw: RawModEntry) -> Self {
        match raw.tag {
            Some(tag) => ModEntry::Registered {
                name: raw.name,
                author: raw.author.unwrap_or_default(),
                icon: raw.icon.unwrap_or_default(),
                tag,
                path: raw.path,
            },
            None => ModEntry::Unregistered {
                name: raw.name,
                path: raw.path,
            },
        }
    }
}

impl From<&ModEntry> for RawModEntry {
    fn from(entry: &ModEntry) -> Self {
        match entry.clone() {
            ModEntry::Registered {
                name,
                author,
                icon,
                tag,
                path,
            } => RawModEntry {
                name,
                author: Some(author),
                icon: Some(icon),
                tag: Some(tag),
                path,
            },
            ModEntry::Unregistered { name, path } => RawModEntry {
                name,
                author: None,
                icon: None,
                tag: None,
                path,
            },
        }
    }
}

impl Serialize for ModEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        RawModEntry::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ModEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RawModEntry::deserialize(deserializer).map(ModEntry::from)
    }
}

/// `LastPlayed` is stored as epoch milliseconds with `-1` for "never".
mod last_played_ms {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const NEVER: i64 = -1;

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.map_or(NEVER, |at| at.timestamp_millis()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<i64>::deserialize(deserializer)?;
        Ok(raw
            .filter(|ms| *ms >= 0)
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()))
    }
}

/// `profile.json` as persisted inside each profile directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProfileDescriptor {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub date_created: DateTime<Utc>,
    /// Whole minutes.
    #[serde(default)]
    pub time_played: u64,
    #[serde(default, with = "last_played_ms")]
    pub last_played: Option<DateTime<Utc>>,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub mods: Vec<ModEntry>,
}

impl ProfileDescriptor {
    pub fn new(icon: Option<String>) -> Self {
        Self {
            date_created: Utc::now(),
            time_played: 0,
            last_played: None,
            icon: icon.unwrap_or_else(|| DEFAULT_ICON.to_string()),
            mods: Vec::new(),
        }
    }
}

/// Reconciled view of a profile handed to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub name: String,
    #[serde(flatten)]
    pub descriptor: ProfileDescriptor,
}

impl Profile {
    pub fn mods(&self) -> &[ModEntry] {
        &self.descriptor.mods
    }
}

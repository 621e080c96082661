use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::model::{ModEntry, Profile, ProfileDescriptor, DESCRIPTOR_FILE, MODS_DIR};
use crate::core::error::{ManagerError, ManagerResult};

pub const DEFAULT_PROFILE_NAME: &str = "Default";

/// One async mutex per profile name, serializing every read-modify-write
/// of that profile's descriptor. Cloning shares the registry.
///
/// Entries nobody holds or waits on are pruned on the next lookup, so the
/// map only tracks profiles with an operation in flight.
#[derive(Debug, Clone, Default)]
pub struct ProfileLocks {
    inner: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl ProfileLocks {
    async fn for_profile(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.inner.lock().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(name.to_string()).or_default().clone()
    }
}

/// CRUD over profile directories under a profiles root.
///
/// Layout of one profile:
/// - `<root>/<name>/Mods/`
/// - `<root>/<name>/profile.json`
#[derive(Debug, Clone)]
pub struct ProfileStore {
    root: PathBuf,
    locks: ProfileLocks,
}

impl ProfileStore {
    pub fn new(root: PathBuf) -> Self {
        Self::with_locks(root, ProfileLocks::default())
    }

    /// Store over `root` that shares an existing lock registry, so that
    /// stores rebuilt after a config change still serialize correctly.
    pub fn with_locks(root: PathBuf, locks: ProfileLocks) -> Self {
        Self { root, locks }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn profile_dir(&self, name: &str) -> ManagerResult<PathBuf> {
        validate_profile_name(name)?;
        Ok(self.root.join(name))
    }

    pub fn mods_dir(&self, name: &str) -> ManagerResult<PathBuf> {
        Ok(self.profile_dir(name)?.join(MODS_DIR))
    }

    /// Create a fresh profile. Fails if the directory already exists.
    pub async fn create(&self, name: &str) -> ManagerResult<Profile> {
        self.create_with_icon(name, None).await
    }

    pub async fn create_with_icon(&self, name: &str, icon: Option<String>) -> ManagerResult<Profile> {
        let dir = self.profile_dir(name)?;
        let lock = self.locks.for_profile(name).await;
        let _guard = lock.lock().await;

        if dir.exists() {
            return Err(ManagerError::ProfileAlreadyExists(name.to_string()));
        }

        let mods_dir = dir.join(MODS_DIR);
        tokio::fs::create_dir_all(&mods_dir)
            .await
            .map_err(|source| ManagerError::io(&mods_dir, source))?;

        let descriptor = ProfileDescriptor::new(icon);
        write_descriptor(&dir, &descriptor).await?;

        info!("Created profile '{}' at {:?}", name, dir);
        Ok(Profile {
            name: name.to_string(),
            descriptor,
        })
    }

    /// Existence check only; the descriptor is not parsed.
    pub async fn get(&self, name: &str) -> ManagerResult<PathBuf> {
        let dir = self.profile_dir(name)?;
        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => Ok(dir),
            _ => Err(ManagerError::ProfileNotFound(name.to_string())),
        }
    }

    /// Parse the descriptor and reconcile its mod registry with `Mods/`.
    ///
    /// The registry is a cache: directories missing from it are added as
    /// unregistered entries, entries without a directory are dropped, and
    /// the descriptor is rewritten only when that changed something.
    pub async fn get_info(&self, name: &str) -> ManagerResult<Profile> {
        let dir = self.get(name).await?;
        let lock = self.locks.for_profile(name).await;
        let _guard = lock.lock().await;

        let mut descriptor = read_descriptor(&dir).await?;
        if reconcile(&dir.join(MODS_DIR), &mut descriptor).await? {
            debug!("Mod registry of '{}' changed on disk, rewriting", name);
            write_descriptor(&dir, &descriptor).await?;
        }

        Ok(Profile {
            name: name.to_string(),
            descriptor,
        })
    }

    /// Every profile under the root. Unreadable profiles are skipped.
    pub async fn get_all(&self) -> ManagerResult<Vec<Profile>> {
        let mut profiles = Vec::new();
        for name in self.profile_names().await? {
            match self.get_info(&name).await {
                Ok(profile) => profiles.push(profile),
                Err(e) => warn!("Skipping profile '{}': {}", name, e),
            }
        }
        Ok(profiles)
    }

    /// Delete a mod's directory and its registry entry.
    ///
    /// A directory that is already gone only logs a warning; the registry
    /// entry is removed either way.
    pub async fn delete_mod(&self, profile: &str, module: &str) -> ManagerResult<()> {
        let dir = self.get(profile).await?;
        let mods_dir = dir.join(MODS_DIR);
        let lock = self.locks.for_profile(profile).await;
        let _guard = lock.lock().await;

        let mut descriptor = read_descriptor(&dir).await?;
        let dir_name = descriptor
            .mods
            .iter()
            .find(|m| m.name() == module)
            .and_then(|m| m.path().file_name().map(|n| n.to_os_string()))
            .or_else(|| {
                mods_dir
                    .join(module)
                    .is_dir()
                    .then(|| std::ffi::OsString::from(module))
            });
        let Some(dir_name) = dir_name else {
            return Err(ManagerError::ModNotFound {
                profile: profile.to_string(),
                module: module.to_string(),
            });
        };

        // Only ever delete direct children of this profile's Mods folder.
        // A directory that is already gone only needs its registry entry
        // dropped; one that survives the delete keeps it.
        let target = mods_dir.join(&dir_name);
        if let Err(e) = tokio::fs::remove_dir_all(&target).await {
            if tokio::fs::try_exists(&target).await.unwrap_or(true) {
                return Err(ManagerError::io(&target, e));
            }
            warn!(
                "Mod directory {:?} of '{}' vanished before removal: {}",
                target, profile, e
            );
        }

        descriptor.mods.retain(|m| m.name() != module);
        reconcile(&mods_dir, &mut descriptor).await?;
        write_descriptor(&dir, &descriptor).await?;
        info!("Deleted mod '{}' from profile '{}'", module, profile);
        Ok(())
    }

    /// One playtime tick: +1 minute, `LastPlayed = now`.
    pub async fn record_playtime(&self, name: &str) -> ManagerResult<ProfileDescriptor> {
        self.update_descriptor(name, |descriptor| {
            descriptor.time_played = descriptor.time_played.saturating_add(1);
            descriptor.last_played = Some(Utc::now());
        })
        .await
    }

    pub async fn mark_launched(&self, name: &str) -> ManagerResult<ProfileDescriptor> {
        self.update_descriptor(name, |descriptor| {
            descriptor.last_played = Some(Utc::now());
        })
        .await
    }

    /// Create the `Default` profile when the root holds no profile at all.
    pub async fn ensure_default_profile(&self) -> ManagerResult<Option<Profile>> {
        if !self.profile_names().await?.is_empty() {
            return Ok(None);
        }
        self.create(DEFAULT_PROFILE_NAME).await.map(Some)
    }

    async fn update_descriptor(
        &self,
        name: &str,
        mutate: impl FnOnce(&mut ProfileDescriptor),
    ) -> ManagerResult<ProfileDescriptor> {
        let dir = self.get(name).await?;
        let lock = self.locks.for_profile(name).await;
        let _guard = lock.lock().await;

        let mut descriptor = read_descriptor(&dir).await?;
        mutate(&mut descriptor);
        write_descriptor(&dir, &descriptor).await?;
        Ok(descriptor)
    }

    async fn profile_names(&self) -> ManagerResult<Vec<String>> {
        let mut names = Vec::new();
        if !self.root.exists() {
            return Ok(names);
        }

        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|source| ManagerError::io(&self.root, source))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| ManagerError::io(&self.root, source))?
        {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => warn!("Ignoring profile directory with non UTF-8 name {:?}", raw),
            }
        }

        names.sort();
        Ok(names)
    }
}

/// Profile names become directory names, so anything that could escape
/// the profiles root is rejected.
pub fn validate_profile_name(name: &str) -> ManagerResult<()> {
    let invalid = name.trim().is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(ManagerError::InvalidProfileName(name.to_string()));
    }
    Ok(())
}

async fn read_descriptor(profile_dir: &Path) -> ManagerResult<ProfileDescriptor> {
    let path = profile_dir.join(DESCRIPTOR_FILE);
    let json = tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| ManagerError::io(&path, source))?;
    Ok(serde_json::from_str(&json)?)
}

async fn write_descriptor(profile_dir: &Path, descriptor: &ProfileDescriptor) -> ManagerResult<()> {
    let path = profile_dir.join(DESCRIPTOR_FILE);
    let json = serde_json::to_string_pretty(descriptor)?;
    tokio::fs::write(&path, json)
        .await
        .map_err(|source| ManagerError::io(path, source))
}

/// Bring `descriptor.mods` in line with the directories inside `mods_dir`.
/// Returns whether the list changed.
///
/// Entries are matched to directories by their final path component and
/// their path is normalized to `mods_dir/<dir>`.
async fn reconcile(mods_dir: &Path, descriptor: &mut ProfileDescriptor) -> ManagerResult<bool> {
    tokio::fs::create_dir_all(mods_dir)
        .await
        .map_err(|source| ManagerError::io(mods_dir, source))?;

    let mut on_disk = BTreeMap::new();
    let mut entries = tokio::fs::read_dir(mods_dir)
        .await
        .map_err(|source| ManagerError::io(mods_dir, source))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|source| ManagerError::io(mods_dir, source))?
    {
        if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            if let Ok(name) = entry.file_name().into_string() {
                on_disk.insert(name, entry.path());
            }
        }
    }

    let mut seen = HashSet::new();
    let mut mods = Vec::with_capacity(on_disk.len());
    for entry in &descriptor.mods {
        let Some(dir_name) = entry.path().file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(path) = on_disk.get(dir_name) else {
            debug!("Dropping registry entry {:?}: directory is gone", entry.name());
            continue;
        };
        if !seen.insert(dir_name.to_string()) {
            continue;
        }

        let mut kept = entry.clone();
        match &mut kept {
            ModEntry::Registered { path: p, .. } | ModEntry::Unregistered { path: p, .. } => {
                *p = path.clone();
            }
        }
        mods.push(kept);
    }

    for (dir_name, path) in &on_disk {
        if seen.contains(dir_name) {
            continue;
        }
        mods.push(ModEntry::Unregistered {
            name: dir_name.clone(),
            path: path.clone(),
        });
    }

    let changed = mods != descriptor.mods;
    descriptor.mods = mods;
    Ok(changed)
}

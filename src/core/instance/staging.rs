// ─── Mod Staging ───
// The game reads mods from one shared directory. Before each launch it is
// rewritten in two phases: clear-or-relocate, then copy the profile's mods.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::error::{ManagerError, ManagerResult};

/// Sentinel proving the staging directory was last written by us.
pub const MARKER_FILE: &str = ".negative-managed";

const MARKER_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingMarker {
    /// Profile whose mods are staged; `None` after a base-install cleanup.
    pub profile: Option<String>,
    pub written_at: DateTime<Utc>,
}

/// What phase one found in the staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagingPrep {
    /// Directory did not exist and was created.
    Created,
    /// Managed or empty directory, wiped.
    Cleared,
    /// Foreign contents moved aside to the given sibling directory.
    Relocated(PathBuf),
}

pub fn marker_path(staging: &Path) -> PathBuf {
    staging.join(MARKER_FILE)
}

pub async fn read_marker(staging: &Path) -> Option<StagingMarker> {
    let raw = tokio::fs::read(marker_path(staging)).await.ok()?;
    serde_json::from_slice(&raw).ok()
}

/// Stage `profile`'s mods: phase one, then copy, then marker.
///
/// A missing source folder is recreated empty before the staging
/// directory is touched, so a source that cannot be read fails the call
/// with the staging directory intact.
pub async fn sync_profile(
    source_mods: &Path,
    staging: &Path,
    profile: &str,
) -> ManagerResult<StagingPrep> {
    create_dir(source_mods).await?;
    let prep = clear_or_relocate(staging).await?;
    let copied = copy_contents(source_mods, staging).await?;
    write_marker(staging, Some(profile)).await?;
    info!(
        "Staged {} entries from profile '{}' into {:?}",
        copied, profile, staging
    );
    Ok(prep)
}

/// Phase one. A directory carrying the marker is ours and is wiped; one
/// without it belongs to the user and is moved aside, never deleted.
pub async fn clear_or_relocate(staging: &Path) -> ManagerResult<StagingPrep> {
    if !staging.exists() {
        create_dir(staging).await?;
        return Ok(StagingPrep::Created);
    }

    if marker_path(staging).exists() || is_empty_dir(staging).await? {
        clear_contents(staging).await?;
        return Ok(StagingPrep::Cleared);
    }

    let target = relocation_target(staging);
    tokio::fs::rename(staging, &target)
        .await
        .map_err(|source| ManagerError::io(staging, source))?;
    create_dir(staging).await?;
    warn!(
        "Moved unmanaged mods from {:?} to {:?}",
        staging, target
    );
    Ok(StagingPrep::Relocated(target))
}

/// Base-install launch: remove our own leftovers, leave foreign mods alone.
/// Returns whether anything was cleared.
pub async fn clear_managed(staging: &Path) -> ManagerResult<bool> {
    if !marker_path(staging).exists() {
        return Ok(false);
    }
    clear_contents(staging).await?;
    write_marker(staging, None).await?;
    Ok(true)
}

/// Poll until `path` exists or `timeout` elapses.
pub async fn wait_for_file(path: &Path, timeout: Duration) -> ManagerResult<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(ManagerError::MarkerTimeout(path.to_path_buf()));
        }
        tokio::time::sleep(MARKER_POLL_INTERVAL).await;
    }
}

async fn write_marker(staging: &Path, profile: Option<&str>) -> ManagerResult<()> {
    let marker = StagingMarker {
        profile: profile.map(str::to_string),
        written_at: Utc::now(),
    };
    let path = marker_path(staging);
    let json = serde_json::to_vec_pretty(&marker)?;
    tokio::fs::write(&path, json)
        .await
        .map_err(|source| ManagerError::io(path, source))
}

async fn copy_contents(source: &Path, destination: &Path) -> ManagerResult<usize> {
    let source = source.to_path_buf();
    let destination = destination.to_path_buf();
    tokio::task::spawn_blocking(move || copy_dir_recursive(&source, &destination)).await?
}

/// Copy every entry of `source` into the existing `destination`.
fn copy_dir_recursive(source: &Path, destination: &Path) -> ManagerResult<usize> {
    let mut copied = 0;
    for entry in std::fs::read_dir(source).map_err(|e| ManagerError::io(source, e))? {
        let entry = entry.map_err(|e| ManagerError::io(source, e))?;
        let src_path = entry.path();
        let dst_path = destination.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(|e| ManagerError::io(&src_path, e))?;

        if file_type.is_dir() {
            std::fs::create_dir_all(&dst_path).map_err(|e| ManagerError::io(&dst_path, e))?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else if file_type.is_file() {
            std::fs::copy(&src_path, &dst_path).map_err(|e| ManagerError::io(&dst_path, e))?;
        } else {
            debug!("Skipping non-regular entry {:?}", src_path);
            continue;
        }
        copied += 1;
    }
    Ok(copied)
}

async fn clear_contents(dir: &Path) -> ManagerResult<()> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|source| ManagerError::io(dir, source))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|source| ManagerError::io(dir, source))?
    {
        let path = entry.path();
        let is_dir = entry
            .file_type()
            .await
            .map(|t| t.is_dir())
            .map_err(|source| ManagerError::io(&path, source))?;
        let removed = if is_dir {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        removed.map_err(|source| ManagerError::io(&path, source))?;
    }
    Ok(())
}

async fn is_empty_dir(dir: &Path) -> ManagerResult<bool> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|source| ManagerError::io(dir, source))?;
    let first = entries
        .next_entry()
        .await
        .map_err(|source| ManagerError::io(dir, source))?;
    Ok(first.is_none())
}

async fn create_dir(path: &Path) -> ManagerResult<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| ManagerError::io(path, source))
}

fn relocation_target(staging: &Path) -> PathBuf {
    let base = staging
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "Mods".to_string());
    let stamp = Utc::now().format("%Y%m%d-%H%M%S");

    let mut candidate = staging.with_file_name(format!("{base}.unmanaged-{stamp}"));
    let mut n = 1;
    while candidate.exists() {
        candidate = staging.with_file_name(format!("{base}.unmanaged-{stamp}-{n}"));
        n += 1;
    }
    candidate
}

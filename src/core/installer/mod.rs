// ─── Lovely Installer ───
// Puts the lovely-injector mod loader into the game install directory.

pub mod extract;
pub mod release;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

pub use extract::ArchiveKind;
pub use release::{GitHubReleases, Release, ReleaseAsset, ReleaseSource};

use crate::core::error::{ManagerError, ManagerResult};

/// Library whose presence in the install directory means lovely is there.
pub fn marker_library(os: &str) -> &'static str {
    match os {
        "macos" => "liblovely.dylib",
        // Linux runs the Windows build under Proton.
        _ => "version.dll",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InstallOutcome {
    AlreadyInstalled,
    Installed { version: String, asset: String },
}

pub struct LovelyInstaller {
    source: Arc<dyn ReleaseSource>,
    os: String,
    arch: String,
    temp_dir: PathBuf,
}

impl LovelyInstaller {
    pub fn new(source: Arc<dyn ReleaseSource>) -> Self {
        Self {
            source,
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            temp_dir: std::env::temp_dir(),
        }
    }

    pub fn for_platform(mut self, os: impl Into<String>, arch: impl Into<String>) -> Self {
        self.os = os.into();
        self.arch = arch.into();
        self
    }

    pub fn with_temp_dir(mut self, dir: PathBuf) -> Self {
        self.temp_dir = dir;
        self
    }

    pub fn is_installed(&self, install_dir: &Path) -> bool {
        install_dir.join(marker_library(&self.os)).exists()
    }

    /// Install the latest release into `install_dir` unless the marker
    /// library is already present.
    pub async fn ensure_installed(&self, install_dir: &Path) -> ManagerResult<InstallOutcome> {
        if self.is_installed(install_dir) {
            info!("lovely already present in {:?}", install_dir);
            return Ok(InstallOutcome::AlreadyInstalled);
        }

        let latest = self.source.latest().await?;
        let asset = release::select_asset(&latest, &self.os, &self.arch)?;
        let kind = ArchiveKind::from_name(&asset.name)
            .ok_or_else(|| ManagerError::UnsupportedArchive(asset.name.clone()))?;

        tokio::fs::create_dir_all(&self.temp_dir)
            .await
            .map_err(|e| ManagerError::io(&self.temp_dir, e))?;
        let archive = self
            .temp_dir
            .join(format!("lovely-{}-{}", Uuid::new_v4(), asset.name));

        info!("Installing lovely {} ({})", latest.tag_name, asset.name);
        let result = self.fetch_and_extract(asset, kind, &archive, install_dir).await;

        if let Err(e) = tokio::fs::remove_file(&archive).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Could not remove {:?}: {}", archive, e);
            }
        }

        let files = result?;
        info!("Extracted {} files into {:?}", files, install_dir);
        Ok(InstallOutcome::Installed {
            version: latest.tag_name.clone(),
            asset: asset.name.clone(),
        })
    }

    async fn fetch_and_extract(
        &self,
        asset: &ReleaseAsset,
        kind: ArchiveKind,
        archive: &Path,
        install_dir: &Path,
    ) -> ManagerResult<usize> {
        self.source.fetch(asset, archive).await?;

        let archive = archive.to_path_buf();
        let install_dir = install_dir.to_path_buf();
        tokio::task::spawn_blocking(move || extract::extract(&archive, kind, &install_dir)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::installer::extract::tests::{tar_gz_bytes, zip_bytes};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeSource {
        release: Release,
        payload: Vec<u8>,
        lookups: AtomicUsize,
    }

    impl FakeSource {
        fn new(asset_name: &str, payload: Vec<u8>) -> Arc<Self> {
            Arc::new(Self {
                release: Release {
                    tag_name: "v0.7.1".into(),
                    assets: vec![ReleaseAsset {
                        name: asset_name.into(),
                        browser_download_url: format!("https://example.invalid/{asset_name}"),
                        digest: None,
                    }],
                },
                payload,
                lookups: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ReleaseSource for FakeSource {
        async fn latest(&self) -> ManagerResult<Release> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(self.release.clone())
        }

        async fn fetch(&self, _asset: &ReleaseAsset, dest: &Path) -> ManagerResult<()> {
            tokio::fs::write(dest, &self.payload)
                .await
                .map_err(|e| ManagerError::io(dest, e))
        }
    }

    #[tokio::test]
    async fn installs_windows_zip_and_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let install = root.path().join("Balatro");
        let temp = root.path().join("tmp");
        let source = FakeSource::new(
            "lovely-x86_64-pc-windows-msvc.zip",
            zip_bytes(&[("version.dll", b"MZ")]),
        );

        let installer = LovelyInstaller::new(source.clone())
            .for_platform("windows", "x86_64")
            .with_temp_dir(temp.clone());
        let outcome = installer.ensure_installed(&install).await.unwrap();

        assert_eq!(
            outcome,
            InstallOutcome::Installed {
                version: "v0.7.1".into(),
                asset: "lovely-x86_64-pc-windows-msvc.zip".into()
            }
        );
        assert!(install.join("version.dll").is_file());
        assert_eq!(std::fs::read_dir(&temp).unwrap().count(), 0);
        assert!(installer.is_installed(&install));
    }

    #[tokio::test]
    async fn installs_macos_tarball() {
        let root = tempfile::tempdir().unwrap();
        let install = root.path().join("Balatro");
        let source = FakeSource::new(
            "lovely-aarch64-apple-darwin.tar.gz",
            tar_gz_bytes(&[
                ("liblovely.dylib", b"dylib"),
                ("run_lovely_macos.sh", b"#!/bin/sh\n"),
            ]),
        );

        let installer = LovelyInstaller::new(source)
            .for_platform("macos", "aarch64")
            .with_temp_dir(root.path().join("tmp"));
        installer.ensure_installed(&install).await.unwrap();

        assert!(install.join("liblovely.dylib").is_file());
        assert!(install.join("run_lovely_macos.sh").is_file());
    }

    #[tokio::test]
    async fn present_marker_skips_the_network() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("version.dll"), b"MZ").unwrap();
        let source = FakeSource::new("lovely-x86_64-pc-windows-msvc.zip", Vec::new());

        let installer = LovelyInstaller::new(source.clone()).for_platform("windows", "x86_64");
        let outcome = installer.ensure_installed(root.path()).await.unwrap();

        assert_eq!(outcome, InstallOutcome::AlreadyInstalled);
        assert_eq!(source.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn linux_without_marker_has_no_asset() {
        let root = tempfile::tempdir().unwrap();
        let source = FakeSource::new("lovely-x86_64-pc-windows-msvc.zip", Vec::new());

        let installer = LovelyInstaller::new(source).for_platform("linux", "x86_64");
        let err = installer.ensure_installed(root.path()).await.unwrap_err();
        assert!(matches!(err, ManagerError::NoReleaseAsset { .. }));
    }

    #[tokio::test]
    async fn corrupt_download_fails_and_leaves_no_temp_file() {
        let root = tempfile::tempdir().unwrap();
        let temp = root.path().join("tmp");
        let source = FakeSource::new("lovely-x86_64-pc-windows-msvc.zip", b"garbage".to_vec());

        let installer = LovelyInstaller::new(source)
            .for_platform("windows", "x86_64")
            .with_temp_dir(temp.clone());
        let err = installer
            .ensure_installed(&root.path().join("Balatro"))
            .await
            .unwrap_err();

        assert!(matches!(err, ManagerError::Zip(_)));
        assert_eq!(std::fs::read_dir(&temp).unwrap().count(), 0);
    }
}

use std::path::Path;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::extract::ArchiveKind;
use crate::core::downloader::Downloader;
use crate::core::error::{ManagerError, ManagerResult};
use crate::core::events::EventBus;

pub const LOVELY_REPO: &str = "ethangreen-dev/lovely-injector";
const GITHUB_API: &str = "https://api.github.com";

#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
    /// `sha256:<hex>` on releases published after GitHub started hashing assets.
    #[serde(default)]
    pub digest: Option<String>,
}

impl ReleaseAsset {
    pub fn sha256(&self) -> Option<&str> {
        self.digest.as_deref()?.strip_prefix("sha256:")
    }
}

/// Where releases come from.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    async fn latest(&self) -> ManagerResult<Release>;

    /// Download `asset` to `dest`.
    async fn fetch(&self, asset: &ReleaseAsset, dest: &Path) -> ManagerResult<()>;
}

/// Latest-release lookups against the GitHub REST API.
pub struct GitHubReleases {
    client: Client,
    events: Option<EventBus>,
}

impl GitHubReleases {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    fn latest_url(&self) -> String {
        format!("{GITHUB_API}/repos/{LOVELY_REPO}/releases/latest")
    }
}

#[async_trait]
impl ReleaseSource for GitHubReleases {
    async fn latest(&self) -> ManagerResult<Release> {
        let url = self.latest_url();
        debug!("Fetching latest release from {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ManagerError::DownloadFailed {
                url,
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn fetch(&self, asset: &ReleaseAsset, dest: &Path) -> ManagerResult<()> {
        let mut downloader = Downloader::new(self.client.clone());
        if let Some(events) = &self.events {
            downloader = downloader.with_events(events.clone());
        }
        downloader
            .download_file(&asset.browser_download_url, dest, asset.sha256())
            .await?;
        Ok(())
    }
}

/// Rust target triple of the injector build for an OS/arch pair, as
/// reported by `std::env::consts`.
pub fn target_triple(os: &str, arch: &str) -> Option<&'static str> {
    match (os, arch) {
        ("windows", "x86_64") => Some("x86_64-pc-windows-msvc"),
        ("macos", "aarch64") => Some("aarch64-apple-darwin"),
        ("macos", "x86_64") => Some("x86_64-apple-darwin"),
        _ => None,
    }
}

/// Pick the asset built for `os`/`arch` in a supported archive format.
pub fn select_asset<'a>(release: &'a Release, os: &str, arch: &str) -> ManagerResult<&'a ReleaseAsset> {
    let no_asset = || ManagerError::NoReleaseAsset {
        os: os.to_string(),
        arch: arch.to_string(),
    };

    let triple = target_triple(os, arch).ok_or_else(no_asset)?;
    release
        .assets
        .iter()
        .find(|asset| asset.name.contains(triple) && ArchiveKind::from_name(&asset.name).is_some())
        .ok_or_else(no_asset)
}

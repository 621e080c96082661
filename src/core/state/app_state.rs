use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::core::config::{ConfigStore, ManagerConfig};
use crate::core::error::ManagerResult;
use crate::core::events::EventBus;
use crate::core::http::build_http_client;
use crate::core::installer::{GitHubReleases, LovelyInstaller, ReleaseSource};
use crate::core::instance::InstanceManager;
use crate::core::launch::GameCommand;
use crate::core::profile::{ProfileLocks, ProfileStore};

/// Everything the command layer works against, built once at startup.
pub struct AppState {
    pub config_store: ConfigStore,
    config: RwLock<ManagerConfig>,
    profile_locks: ProfileLocks,
    pub instances: InstanceManager,
    pub events: EventBus,
    release_source: Arc<dyn ReleaseSource>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl AppState {
    /// Create the app directory if needed and load the healed config.
    pub async fn initialize(config_store: ConfigStore) -> ManagerResult<Self> {
        let config = config_store.load_validated().await?;
        info!("Using profiles directory {:?}", config.profiles_dir);

        let events = EventBus::new();
        let http_client = build_http_client()?;
        let release_source =
            Arc::new(GitHubReleases::new(http_client).with_events(events.clone()));
        Ok(Self {
            config_store,
            config: RwLock::new(config),
            profile_locks: ProfileLocks::default(),
            instances: InstanceManager::new(events.clone()),
            events,
            release_source,
            background: Mutex::new(Vec::new()),
        })
    }

    /// Replace how the game process is started.
    pub fn with_game_command(mut self, game: Arc<dyn GameCommand>) -> Self {
        self.instances = InstanceManager::new(self.events.clone()).with_game_command(game);
        self
    }

    /// Replace where lovely-injector releases are looked up.
    pub fn with_release_source(mut self, source: Arc<dyn ReleaseSource>) -> Self {
        self.release_source = source;
        self
    }

    /// Snapshot of the current config.
    pub async fn config(&self) -> ManagerConfig {
        self.config.read().await.clone()
    }

    /// Re-read `config.json` after a write through the store.
    pub async fn reload_config(&self) -> ManagerResult<ManagerConfig> {
        let fresh = self.config_store.load_validated().await?;
        *self.config.write().await = fresh.clone();
        Ok(fresh)
    }

    /// Profile store over the configured profiles directory. Stores handed
    /// out here share one lock registry.
    pub async fn profiles(&self) -> ProfileStore {
        let root = self.config.read().await.profiles_dir.clone();
        ProfileStore::with_locks(root, self.profile_locks.clone())
    }

    pub fn lovely_installer(&self) -> LovelyInstaller {
        LovelyInstaller::new(self.release_source.clone())
    }

    /// Run `task` detached from the caller; `join_background` awaits it.
    pub async fn spawn_background<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.background.lock().await.push(tokio::spawn(task));
    }

    pub async fn join_background(&self) {
        let tasks: Vec<_> = self.background.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!("Background task failed: {}", e);
            }
        }
    }
}

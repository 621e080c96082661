use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::process::Child;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, warn};

use super::staging::{self, StagingPrep};
use crate::core::config::ManagerConfig;
use crate::core::error::{ManagerError, ManagerResult, PreflightFailure};
use crate::core::events::EventBus;
use crate::core::launch::task::{self, ExitOutcome, GameCommand, PlatformGameCommand};
use crate::core::profile::model::MODS_DIR;
use crate::core::profile::ProfileStore;

pub const PLAYTIME_TICK: Duration = Duration::from_secs(60);
pub const MARKER_TIMEOUT: Duration = Duration::from_secs(2);
pub const STOP_GRACE: Duration = Duration::from_secs(5);

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// What a running instance is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum InstanceKey {
    /// The unmodified game installation.
    Base,
    Profile(String),
}

impl InstanceKey {
    pub fn from_profile(profile: Option<String>) -> Self {
        match profile {
            Some(name) => InstanceKey::Profile(name),
            None => InstanceKey::Base,
        }
    }

    pub fn profile_name(&self) -> Option<&str> {
        match self {
            InstanceKey::Base => None,
            InstanceKey::Profile(name) => Some(name),
        }
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceKey::Base => write!(f, "base install"),
            InstanceKey::Profile(name) => write!(f, "profile '{name}'"),
        }
    }
}

/// Public snapshot of a running instance.
#[derive(Debug, Clone, Serialize)]
pub struct RunningInstanceInfo {
    pub key: InstanceKey,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
}

struct RunningInstance {
    pid: Option<u32>,
    started_at: DateTime<Utc>,
    stop: Option<oneshot::Sender<()>>,
    watcher: JoinHandle<()>,
}

type RunningMap = Arc<Mutex<HashMap<InstanceKey, RunningInstance>>>;

/// Owns every running game process.
///
/// Lifecycle per key: stopped → starting → running → stopped. Launches are
/// single-flight because all profiles share one staging directory; stop
/// and status queries never wait on a launch in progress.
pub struct InstanceManager {
    running: RunningMap,
    staging_lock: Mutex<()>,
    game: Arc<dyn GameCommand>,
    events: EventBus,
    tick_interval: Duration,
    stop_grace: Duration,
}

impl InstanceManager {
    pub fn new(events: EventBus) -> Self {
        Self {
            running: Arc::new(Mutex::new(HashMap::new())),
            staging_lock: Mutex::new(()),
            game: Arc::new(PlatformGameCommand),
            events,
            tick_interval: PLAYTIME_TICK,
            stop_grace: STOP_GRACE,
        }
    }

    pub fn with_game_command(mut self, game: Arc<dyn GameCommand>) -> Self {
        self.game = game;
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub async fn is_running(&self, key: &InstanceKey) -> bool {
        self.running.lock().await.contains_key(key)
    }

    pub async fn running(&self) -> Vec<RunningInstanceInfo> {
        let running = self.running.lock().await;
        running
            .iter()
            .map(|(key, instance)| RunningInstanceInfo {
                key: key.clone(),
                pid: instance.pid,
                started_at: instance.started_at,
            })
            .collect()
    }

    /// Stage mods for `key` (unless it is the base install), start the game
    /// and track it until it exits.
    ///
    /// Preflight checks run before anything touches the staging directory.
    pub async fn launch(
        &self,
        config: &ManagerConfig,
        profiles: &ProfileStore,
        key: InstanceKey,
    ) -> ManagerResult<()> {
        if self.is_running(&key).await {
            self.events.error(format!("{key} is already running"));
            return Err(ManagerError::AlreadyRunning(key.to_string()));
        }

        let _staging = self.staging_lock.lock().await;
        // Another launch of the same key may have finished while we waited.
        if self.is_running(&key).await {
            self.events.error(format!("{key} is already running"));
            return Err(ManagerError::AlreadyRunning(key.to_string()));
        }

        self.events.info(format!("Launching {key}"));
        let result = self.stage_and_spawn(config, profiles, &key).await;
        if let Err(e) = &result {
            self.events.error(format!("Launch of {key} aborted: {e}"));
        }
        result
    }

    async fn stage_and_spawn(
        &self,
        config: &ManagerConfig,
        profiles: &ProfileStore,
        key: &InstanceKey,
    ) -> ManagerResult<()> {
        let launch_dir = match key {
            InstanceKey::Base => config.install_path.clone(),
            InstanceKey::Profile(name) => profiles.profile_dir(name)?,
        };
        self.preflight(&launch_dir, config)?;

        let staging_dir = config.shared_mods_dir();
        match key {
            InstanceKey::Profile(name) => {
                let prep =
                    staging::sync_profile(&launch_dir.join(MODS_DIR), &staging_dir, name).await?;
                if let StagingPrep::Relocated(to) = prep {
                    self.events
                        .warning(format!("Existing mods were moved to {}", to.display()));
                }
                staging::wait_for_file(&staging::marker_path(&staging_dir), MARKER_TIMEOUT)
                    .await?;
            }
            InstanceKey::Base => {
                if staging::clear_managed(&staging_dir).await? {
                    debug!("Cleared managed mods from {:?}", staging_dir);
                }
            }
        }

        let mut child = task::spawn(self.game.as_ref(), &config.install_path)?;
        let pid = child.id();
        task::forward_output(&mut child, &key.to_string());

        if let Some(name) = key.profile_name() {
            if let Err(e) = profiles.mark_launched(name).await {
                warn!("Could not record launch time for '{}': {}", name, e);
            }
        }

        let ticker = key
            .profile_name()
            .map(|name| (profiles.clone(), name.to_string(), self.tick_interval));
        let (stop_tx, stop_rx) = oneshot::channel();

        // Insert while holding the map so the watcher cannot remove the
        // entry before it exists.
        let mut running = self.running.lock().await;
        let watcher = tokio::spawn(watch(
            key.clone(),
            child,
            stop_rx,
            ticker,
            self.running.clone(),
            self.events.clone(),
            self.stop_grace,
        ));
        running.insert(
            key.clone(),
            RunningInstance {
                pid,
                started_at: Utc::now(),
                stop: Some(stop_tx),
                watcher,
            },
        );
        drop(running);

        match pid {
            Some(pid) => self.events.success(format!("Launched {key} (PID {pid})")),
            None => self.events.success(format!("Launched {key}")),
        }
        Ok(())
    }

    fn preflight(&self, launch_dir: &Path, config: &ManagerConfig) -> ManagerResult<()> {
        if !launch_dir.is_dir() {
            return Err(PreflightFailure::LaunchDirMissing(launch_dir.to_path_buf()).into());
        }

        let entry = self.game.required_entry(&config.install_path);
        if !entry.exists() {
            return Err(PreflightFailure::ExecutableMissing(entry).into());
        }

        if !config.data_path.is_dir() {
            return Err(PreflightFailure::DataDirMissing(config.data_path.clone()).into());
        }
        Ok(())
    }

    /// Ask the instance for `key` to exit. Returns whether a stop was sent;
    /// the exit handler does the bookkeeping.
    pub async fn stop(&self, key: &InstanceKey) -> bool {
        let sender = {
            let mut running = self.running.lock().await;
            running.get_mut(key).and_then(|instance| instance.stop.take())
        };

        match sender {
            Some(sender) => {
                let _ = sender.send(());
                self.events.info(format!("Stopping {key}"));
                true
            }
            None => false,
        }
    }

    /// Poll until `key` is no longer running.
    pub async fn wait_for_exit(&self, key: &InstanceKey) {
        while self.is_running(key).await {
            tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        }
    }

    /// Stop every instance and wait for their watchers to finish.
    pub async fn shutdown(&self) {
        let drained: Vec<_> = self.running.lock().await.drain().collect();
        let mut watchers = Vec::with_capacity(drained.len());

        for (key, mut instance) in drained {
            if let Some(sender) = instance.stop.take() {
                let _ = sender.send(());
            }
            watchers.push((key, instance.watcher));
        }

        for (key, watcher) in watchers {
            if let Err(e) = watcher.await {
                warn!("Watcher for {} ended abnormally: {}", key, e);
            }
        }
    }
}

enum Wake {
    Exited(std::io::Result<ExitStatus>),
    Tick,
    Stop(Result<(), oneshot::error::RecvError>),
}

/// Owns the child process and its playtime ticker; both end together.
async fn watch(
    key: InstanceKey,
    mut child: Child,
    mut stop_rx: oneshot::Receiver<()>,
    ticker: Option<(ProfileStore, String, Duration)>,
    running: RunningMap,
    events: EventBus,
    stop_grace: Duration,
) {
    let mut interval = ticker.as_ref().map(|(_, _, period)| {
        let mut interval =
            tokio::time::interval_at(tokio::time::Instant::now() + *period, *period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval
    });
    let mut stop_open = true;

    let (status, requested) = loop {
        let wake = tokio::select! {
            status = child.wait() => Wake::Exited(status),
            _ = next_tick(&mut interval) => Wake::Tick,
            signal = &mut stop_rx, if stop_open => Wake::Stop(signal),
        };

        match wake {
            Wake::Exited(status) => break (status, false),
            Wake::Tick => {
                if let Some((profiles, name, _)) = &ticker {
                    match profiles.record_playtime(name).await {
                        Ok(descriptor) => {
                            debug!("'{}' played {} min", name, descriptor.time_played)
                        }
                        Err(e) => warn!("Could not record playtime for '{}': {}", name, e),
                    }
                }
            }
            Wake::Stop(Ok(())) => break (task::terminate(&mut child, stop_grace).await, true),
            Wake::Stop(Err(_)) => stop_open = false,
        }
    };
    drop(interval);

    running.lock().await.remove(&key);

    match status {
        Ok(_) if requested => events.info(format!("{key} stopped")),
        Ok(status) => match task::classify_exit(&status) {
            ExitOutcome::Clean => events.success(format!("{key} exited successfully")),
            ExitOutcome::Failed(Some(code)) => {
                events.error(format!("{key} exited with code {code}"))
            }
            ExitOutcome::Failed(None) => {
                events.error(format!("{key} was terminated externally"))
            }
        },
        Err(e) => events.error(format!("Failed while waiting for {key}: {e}")),
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

// ─── Command Surface ───
// The only entry points the UI layer (or the CLI) calls into the core.
// Failures come back as `ManagerError`, which serializes to a message.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::core::config::{validate_path_type as check_path_kind, ConfigField, ManagerConfig, PathKind};
use crate::core::error::ManagerResult;
use crate::core::events::LogEvent;
use crate::core::export;
use crate::core::installer::InstallOutcome;
use crate::core::instance::{InstanceKey, RunningInstanceInfo};
use crate::core::profile::Profile;
use crate::core::state::AppState;

/// Result of `validate_path_type`: `valid` or a reason for the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum PathValidation {
    Valid,
    Invalid(String),
}

/// Boot sequence for a UI shell: `prepare`, then install lovely-injector
/// in the background. A failed install only means mods will not load.
pub async fn startup(state: &AppState) -> ManagerResult<()> {
    prepare(state).await?;
    let install_dir = state.config().await.install_path;
    schedule_lovely_install(state, install_dir).await;
    Ok(())
}

/// First-run work: make sure at least one profile exists.
pub async fn prepare(state: &AppState) -> ManagerResult<()> {
    let profiles = state.profiles().await;
    if let Some(created) = profiles.ensure_default_profile().await? {
        state
            .events
            .info(format!("Created default profile '{}'", created.name));
    }
    if !check_path_validations(state).await {
        state
            .events
            .warning("Game paths are not configured, set them before launching");
    }
    Ok(())
}

// ── Instances ───────────────────────────────────────────

pub async fn launch_instance(state: &AppState, profile: Option<String>) -> ManagerResult<()> {
    let config = state.config().await;
    let profiles = state.profiles().await;
    state
        .instances
        .launch(&config, &profiles, InstanceKey::from_profile(profile))
        .await
}

/// Returns whether a stop was sent; a key that is not running is a no-op.
pub async fn kill_instance(state: &AppState, profile: Option<String>) -> bool {
    state
        .instances
        .stop(&InstanceKey::from_profile(profile))
        .await
}

pub async fn is_instance_active(state: &AppState, profile: Option<String>) -> bool {
    state
        .instances
        .is_running(&InstanceKey::from_profile(profile))
        .await
}

pub async fn running_instances(state: &AppState) -> Vec<RunningInstanceInfo> {
    state.instances.running().await
}

// ── Profiles ────────────────────────────────────────────

pub async fn get_all_profiles(state: &AppState) -> ManagerResult<Vec<Profile>> {
    state.profiles().await.get_all().await
}

/// Directory of the named profile.
pub async fn get_profile(state: &AppState, name: &str) -> ManagerResult<PathBuf> {
    state.profiles().await.get(name).await
}

pub async fn get_profile_info(state: &AppState, name: &str) -> ManagerResult<Profile> {
    state.profiles().await.get_info(name).await
}

pub async fn create_profile(state: &AppState, name: &str) -> ManagerResult<Profile> {
    let profile = state.profiles().await.create(name).await?;
    state.events.success(format!("Created profile '{name}'"));
    Ok(profile)
}

pub async fn delete_mod(state: &AppState, profile: &str, module: &str) -> ManagerResult<()> {
    match state.profiles().await.delete_mod(profile, module).await {
        Ok(()) => {
            state
                .events
                .success(format!("Deleted {module} from '{profile}'"));
            Ok(())
        }
        Err(e) => {
            state
                .events
                .error(format!("Could not delete {module} from '{profile}': {e}"));
            Err(e)
        }
    }
}

pub async fn export_profile(
    state: &AppState,
    name: &str,
    output_dir: &Path,
    file_name: Option<&str>,
) -> ManagerResult<PathBuf> {
    let profiles = state.profiles().await;
    let path = export::export_profile(&profiles, name, output_dir, file_name).await?;
    state
        .events
        .success(format!("Exported '{name}' to {}", path.display()));
    Ok(path)
}

pub async fn import_profile(state: &AppState, file: &Path) -> ManagerResult<Profile> {
    let profiles = state.profiles().await;
    match export::import_profile(&profiles, file).await {
        Ok(profile) => {
            state
                .events
                .success(format!("Imported profile '{}'", profile.name));
            Ok(profile)
        }
        Err(e) => {
            state
                .events
                .error(format!("Could not import {}: {e}", file.display()));
            Err(e)
        }
    }
}

// ── Config ──────────────────────────────────────────────

pub async fn get_config(state: &AppState) -> ManagerConfig {
    state.config().await
}

/// Placeholder text for a config input; `None` for unknown fields.
pub fn get_config_text_placeholder(state: &AppState, field: &str) -> Option<String> {
    ConfigField::from_name(field).map(|field| state.config_store.text_placeholder(field))
}

pub fn validate_path_type(path: &str, kind: &str) -> ManagerResult<PathValidation> {
    let kind: PathKind = kind.parse()?;
    Ok(match check_path_kind(path, kind) {
        Ok(_) => PathValidation::Valid,
        Err(reason) => PathValidation::Invalid(reason),
    })
}

/// Whether the configured install and data paths both exist on disk.
pub async fn check_path_validations(state: &AppState) -> bool {
    match state.config_store.load().await {
        Some(config) => config.game_paths_exist(),
        None => false,
    }
}

/// Apply one config update. An accepted install path schedules the
/// injector install in the background.
pub async fn update_config_field(state: &AppState, key: &str, value: &str) -> bool {
    if !state.config_store.update(key, value).await {
        return false;
    }

    let config = match state.reload_config().await {
        Ok(config) => config,
        Err(e) => {
            warn!("Config was updated but could not be reloaded: {}", e);
            return true;
        }
    };

    if ConfigField::from_key(key) == Some(ConfigField::InstallPath) {
        schedule_lovely_install(state, config.install_path).await;
    }
    true
}

// ── Tooling ─────────────────────────────────────────────

pub async fn install_lovely(state: &AppState) -> ManagerResult<InstallOutcome> {
    let config = state.config().await;
    let outcome = state
        .lovely_installer()
        .ensure_installed(&config.install_path)
        .await?;
    state.events.success(describe_install(&outcome));
    Ok(outcome)
}

async fn schedule_lovely_install(state: &AppState, install_dir: PathBuf) {
    let installer = state.lovely_installer();
    let events = state.events.clone();
    state
        .spawn_background(async move {
            match installer.ensure_installed(&install_dir).await {
                Ok(outcome) => events.success(describe_install(&outcome)),
                Err(e) => events.warning(format!(
                    "lovely-injector unavailable, mods will not load: {e}"
                )),
            }
        })
        .await;
}

/// The one-way log-event stream.
pub fn subscribe_logs(state: &AppState) -> broadcast::Receiver<LogEvent> {
    state.events.subscribe()
}

pub async fn shutdown(state: &AppState) {
    info!("Stopping all instances");
    state.instances.shutdown().await;
    state.join_background().await;
}

fn describe_install(outcome: &InstallOutcome) -> String {
    match outcome {
        InstallOutcome::AlreadyInstalled => "lovely is already installed".to_string(),
        InstallOutcome::Installed { version, .. } => format!("Installed lovely {version}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{ConfigDefaults, ConfigStore};
    use crate::core::error::ManagerError;
    use crate::core::events::LogLevel;
    use crate::core::installer::{Release, ReleaseAsset, ReleaseSource};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Release source that counts lookups and never reaches the network.
    #[derive(Default)]
    struct OfflineReleases {
        lookups: AtomicUsize,
    }

    impl OfflineReleases {
        fn lookups(&self) -> usize {
            self.lookups.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl ReleaseSource for OfflineReleases {
        async fn latest(&self) -> ManagerResult<Release> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Err(ManagerError::Other("offline".into()))
        }

        async fn fetch(&self, _asset: &ReleaseAsset, _dest: &Path) -> ManagerResult<()> {
            Err(ManagerError::Other("offline".into()))
        }
    }

    async fn state_with_releases(root: &TempDir) -> (AppState, Arc<OfflineReleases>) {
        let defaults = ConfigDefaults {
            data_path: root.path().join("data"),
            install_path: root.path().join("install"),
            profiles_dir: root.path().join("profiles"),
        };
        std::fs::create_dir_all(&defaults.data_path).unwrap();
        std::fs::create_dir_all(&defaults.install_path).unwrap();
        let store = ConfigStore::new(root.path().join("app"), defaults);
        let releases = Arc::new(OfflineReleases::default());
        let state = AppState::initialize(store)
            .await
            .unwrap()
            .with_release_source(releases.clone());
        (state, releases)
    }

    async fn state_in(root: &TempDir) -> AppState {
        state_with_releases(root).await.0
    }

    #[tokio::test]
    async fn startup_creates_default_profile_once() {
        let root = tempfile::tempdir().unwrap();
        let state = state_in(&root).await;

        startup(&state).await.unwrap();
        startup(&state).await.unwrap();

        let profiles = get_all_profiles(&state).await.unwrap();
        let names: Vec<_> = profiles.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Default"]);
        assert!(get_profile(&state, "Default").await.unwrap().is_dir());
    }

    #[tokio::test]
    async fn startup_schedules_the_injector_install() {
        let root = tempfile::tempdir().unwrap();
        let (state, releases) = state_with_releases(&root).await;
        let mut logs = subscribe_logs(&state);

        startup(&state).await.unwrap();
        state.join_background().await;
        assert_eq!(releases.lookups(), 1);

        let mut warned = false;
        while let Ok(event) = logs.try_recv() {
            warned |= event.level == LogLevel::Warning && event.message.contains("lovely");
        }
        assert!(warned);

        // `prepare` alone never touches the installer.
        prepare(&state).await.unwrap();
        state.join_background().await;
        assert_eq!(releases.lookups(), 1);
    }

    #[tokio::test]
    async fn path_checks() {
        let root = tempfile::tempdir().unwrap();
        let state = state_in(&root).await;
        assert!(check_path_validations(&state).await);

        let data = root.path().join("data").to_string_lossy().to_string();
        assert_eq!(
            validate_path_type(&data, "data").unwrap(),
            PathValidation::Invalid("Data path does not contain a settings.jkr.".into())
        );
        std::fs::write(root.path().join("data/settings.jkr"), b"").unwrap();
        assert_eq!(validate_path_type(&data, "data").unwrap(), PathValidation::Valid);
        assert!(validate_path_type(&data, "mods").is_err());
    }

    #[tokio::test]
    async fn config_updates_are_allow_listed() {
        let root = tempfile::tempdir().unwrap();
        let state = state_in(&root).await;

        let elsewhere = root.path().join("other-profiles");
        std::fs::create_dir_all(&elsewhere).unwrap();
        let value = elsewhere.to_string_lossy().to_string();

        assert!(!update_config_field(&state, "theme", &value).await);
        assert!(update_config_field(&state, "profiles_directory", &value).await);
        assert_eq!(get_config(&state).await.profiles_dir, elsewhere);

        create_profile(&state, "Moved").await.unwrap();
        assert!(elsewhere.join("Moved").is_dir());
    }

    #[tokio::test]
    async fn install_path_update_schedules_the_installer() {
        let root = tempfile::tempdir().unwrap();
        let (state, releases) = state_with_releases(&root).await;

        let other_install = root.path().join("other-install");
        std::fs::create_dir_all(&other_install).unwrap();
        let value = other_install.to_string_lossy().to_string();

        // Rejected: the directory has no game entry yet.
        assert!(!update_config_field(&state, "balatro_steam_path", &value).await);
        state.join_background().await;
        assert_eq!(releases.lookups(), 0);

        std::fs::write(
            other_install.join(crate::core::config::paths::game_entry_name()),
            b"",
        )
        .unwrap();
        assert!(update_config_field(&state, "balatro_steam_path", &value).await);
        state.join_background().await;

        assert_eq!(releases.lookups(), 1);
        assert_eq!(get_config(&state).await.install_path, other_install);
    }

    #[tokio::test]
    async fn placeholders_follow_defaults() {
        let root = tempfile::tempdir().unwrap();
        let state = state_in(&root).await;

        assert_eq!(
            get_config_text_placeholder(&state, "steam"),
            Some(root.path().join("install").display().to_string())
        );
        assert_eq!(get_config_text_placeholder(&state, "nope"), None);
    }

    #[tokio::test]
    async fn failed_launch_is_reported_on_the_log_stream() {
        let root = tempfile::tempdir().unwrap();
        let state = state_in(&root).await;
        let mut logs = subscribe_logs(&state);

        let err = launch_instance(&state, Some("Ghost".into())).await.unwrap_err();
        assert!(matches!(err, ManagerError::Preflight(_)));
        assert!(!is_instance_active(&state, Some("Ghost".into())).await);
        assert!(!kill_instance(&state, Some("Ghost".into())).await);

        let mut saw_error = false;
        while let Ok(event) = logs.try_recv() {
            saw_error |= event.level == LogLevel::Error;
        }
        assert!(saw_error);
    }

    #[tokio::test]
    async fn delete_mod_round_trip() {
        let root = tempfile::tempdir().unwrap();
        let state = state_in(&root).await;
        create_profile(&state, "Modded").await.unwrap();
        let mods = root.path().join("profiles/Modded/Mods/Talisman");
        std::fs::create_dir_all(&mods).unwrap();

        assert_eq!(get_profile_info(&state, "Modded").await.unwrap().mods().len(), 1);
        delete_mod(&state, "Modded", "Talisman").await.unwrap();
        assert!(!mods.exists());
        assert!(matches!(
            delete_mod(&state, "Modded", "Talisman").await,
            Err(ManagerError::ModNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn errors_serialize_as_messages() {
        let err = ManagerError::ProfileNotFound("Ghost".into());
        assert_eq!(
            serde_json::to_string(&err).unwrap(),
            "\"Profile not found: Ghost\""
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn launched_instances_are_listed_until_shutdown() {
        use crate::core::launch::GameCommand;
        use tokio::process::Command;

        struct Sleeper;

        impl GameCommand for Sleeper {
            fn required_entry(&self, install_dir: &Path) -> PathBuf {
                install_dir.join("game.sh")
            }

            fn build(&self, install_dir: &Path) -> Command {
                let mut cmd = Command::new("sh");
                cmd.arg(self.required_entry(install_dir));
                cmd
            }
        }

        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("install")).unwrap();
        std::fs::write(root.path().join("install/game.sh"), "exec sleep 30\n").unwrap();
        let state = state_in(&root).await.with_game_command(Arc::new(Sleeper));
        create_profile(&state, "Runner").await.unwrap();

        launch_instance(&state, Some("Runner".into())).await.unwrap();
        assert!(is_instance_active(&state, Some("Runner".into())).await);

        let running = running_instances(&state).await;
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].key, InstanceKey::Profile("Runner".into()));
        assert!(running[0].pid.is_some());

        shutdown(&state).await;
        assert!(running_instances(&state).await.is_empty());
    }
}

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use crate::commands;
use crate::core::error::{ManagerError, ManagerResult};
use crate::core::events::LogLevel;
use crate::core::instance::InstanceKey;
use crate::core::state::AppState;

#[derive(Debug, Parser)]
#[command(
    name = "negative",
    version,
    about = "Profile-isolated mod manager and launcher for Balatro"
)]
pub struct Cli {
    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Launch a profile (or the unmodded game) and wait for it to exit.
    Launch {
        /// Profile to launch; omit for the base install.
        profile: Option<String>,
        /// Skip the lovely-injector install before launching.
        #[arg(long, default_value_t = false)]
        skip_install: bool,
    },
    /// List every profile with its reconciled mods.
    Profiles,
    /// Show one profile.
    Profile { name: String },
    /// Create an empty profile.
    Create { name: String },
    /// Remove a mod directory from a profile.
    DeleteMod { profile: String, module: String },
    /// Write a profile to a `.negative` file.
    Export {
        name: String,
        /// Directory to write into.
        #[arg(long)]
        out: PathBuf,
        /// File name; `.negative` is appended when missing.
        #[arg(long)]
        file_name: Option<String>,
    },
    /// Create a profile from a `.negative` file.
    Import { file: PathBuf },
    /// Inspect or change `config.json`.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Check a directory against what the given kind requires.
    ValidatePath {
        path: String,
        /// `install` (or `steam`) or `data`.
        kind: String,
    },
    /// Install lovely-injector into the configured game directory.
    InstallLovely,
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the current config.
    Show,
    /// Whether the configured game paths exist.
    Check,
    /// Update one field by its `config.json` key.
    Set { key: String, value: String },
    /// Default value shown for a field (`steam`, `data`, `profiles`).
    Placeholder { field: String },
}

impl Command {
    /// Whether the startup lovely-injector install should run first.
    pub fn installs_injector(&self) -> bool {
        matches!(
            self,
            Command::Launch {
                skip_install: false,
                ..
            }
        )
    }
}

/// Run one command against `state` and produce its JSON result.
pub async fn execute(state: &AppState, command: Command) -> ManagerResult<Value> {
    match command {
        Command::Launch { profile, .. } => launch_and_wait(state, profile).await,
        Command::Profiles => Ok(serde_json::to_value(commands::get_all_profiles(state).await?)?),
        Command::Profile { name } => {
            Ok(serde_json::to_value(commands::get_profile_info(state, &name).await?)?)
        }
        Command::Create { name } => {
            Ok(serde_json::to_value(commands::create_profile(state, &name).await?)?)
        }
        Command::DeleteMod { profile, module } => {
            commands::delete_mod(state, &profile, &module).await?;
            Ok(json!({ "deleted": module, "profile": profile }))
        }
        Command::Export {
            name,
            out,
            file_name,
        } => {
            let path = commands::export_profile(state, &name, &out, file_name.as_deref()).await?;
            Ok(json!({ "path": path }))
        }
        Command::Import { file } => {
            Ok(serde_json::to_value(commands::import_profile(state, &file).await?)?)
        }
        Command::Config { action } => config(state, action).await,
        Command::ValidatePath { path, kind } => Ok(serde_json::to_value(
            commands::validate_path_type(&path, &kind)?,
        )?),
        Command::InstallLovely => Ok(serde_json::to_value(commands::install_lovely(state).await?)?),
    }
}

async fn config(state: &AppState, action: ConfigAction) -> ManagerResult<Value> {
    match action {
        ConfigAction::Show => Ok(serde_json::to_value(commands::get_config(state).await)?),
        ConfigAction::Check => Ok(json!({ "valid": commands::check_path_validations(state).await })),
        ConfigAction::Set { key, value } => {
            let updated = commands::update_config_field(state, &key, &value).await;
            if !updated {
                return Err(ManagerError::Other(format!(
                    "Rejected value {value:?} for {key}"
                )));
            }
            Ok(json!({ "updated": key }))
        }
        ConfigAction::Placeholder { field } => commands::get_config_text_placeholder(state, &field)
            .map(|placeholder| json!({ "field": field, "placeholder": placeholder }))
            .ok_or_else(|| ManagerError::Other(format!("Unknown config field: {field}"))),
    }
}

async fn launch_and_wait(
    state: &AppState,
    profile: Option<String>,
) -> ManagerResult<Value> {
    let mut logs = commands::subscribe_logs(state);
    let printer = tokio::spawn(async move {
        while let Ok(event) = logs.recv().await {
            if event.level != LogLevel::Debug {
                eprintln!("[{:?}] {}", event.level, event.message);
            }
        }
    });

    // The startup install, if any, must finish before the game starts.
    state.join_background().await;

    let key = InstanceKey::from_profile(profile.clone());
    if let Err(e) = commands::launch_instance(state, profile).await {
        printer.abort();
        return Err(e);
    }

    tokio::select! {
        _ = state.instances.wait_for_exit(&key) => {}
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => {
                    commands::kill_instance(state, key.profile_name().map(str::to_string)).await;
                }
                Err(e) => tracing::warn!("Cannot listen for Ctrl-C: {}", e),
            }
            state.instances.wait_for_exit(&key).await;
        }
    }

    printer.abort();
    Ok(json!({ "instance": key, "running": false }))
}

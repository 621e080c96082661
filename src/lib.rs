mod cli;
pub mod commands;
pub mod core;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::core::config::ConfigStore;
use crate::core::state::AppState;

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the JSON result.
    let fallback = if cli.verbose {
        "debug"
    } else {
        "info,negative_lib=debug"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Balatro Instance Manager starting...");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: cannot start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async move {
        let state = match AppState::initialize(ConfigStore::from_platform()).await {
            Ok(state) => state,
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::FAILURE;
            }
        };

        let ready = if cli.command.installs_injector() {
            commands::startup(&state).await
        } else {
            commands::prepare(&state).await
        };
        if let Err(e) = ready {
            tracing::warn!("Startup tasks failed: {}", e);
        }

        let result = cli::execute(&state, cli.command).await;
        commands::shutdown(&state).await;

        match result.and_then(|value| Ok(serde_json::to_string_pretty(&value)?)) {
            Ok(text) => {
                println!("{text}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: {e}");
                ExitCode::FAILURE
            }
        }
    })
}

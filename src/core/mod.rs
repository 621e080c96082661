// ─── Balatro Instance Manager Core ───
// Profile-isolated mod manager backend for a single game installation.
//
// Architecture:
//   core/
//     config/      config.json with default healing + path validation
//     profile/     profile directories, descriptors, mod registry
//     instance/    mod staging + running-process lifecycle
//     launch/      platform game command + process spawner
//     export/      .negative binary codec
//     installer/   lovely-injector release lookup + extraction
//     downloader/  streaming SHA-256 validated downloads
//     events/      log-event stream for the UI
//     state/       application state shared by commands

pub mod config;
pub mod downloader;
pub mod error;
pub mod events;
pub mod export;
pub mod http;
pub mod installer;
pub mod instance;
pub mod launch;
pub mod profile;
pub mod state;

use std::path::PathBuf;
use thiserror::Error;

use crate::core::export::ExportError;

/// Central error type for the instance manager backend.
/// Every module returns `Result<T, ManagerError>`.
#[derive(Debug, Error)]
pub enum ManagerError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    #[error("SHA-256 mismatch for {path:?}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Profile ─────────────────────────────────────────
    #[error("Invalid profile name: {0:?}")]
    InvalidProfileName(String),

    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    #[error("Profile already exists: {0}")]
    ProfileAlreadyExists(String),

    #[error("Mod {module} not found in profile {profile}")]
    ModNotFound { profile: String, module: String },

    // ── Instance ────────────────────────────────────────
    #[error("Instance already running: {0}")]
    AlreadyRunning(String),

    #[error("Preflight check failed: {0}")]
    Preflight(#[from] PreflightFailure),

    #[error("Timed out waiting for {0:?}")]
    MarkerTimeout(PathBuf),

    // ── Export ──────────────────────────────────────────
    #[error("Invalid export file: {0}")]
    InvalidExport(#[from] ExportError),

    // ── Installer ───────────────────────────────────────
    #[error("No release asset available for {os}/{arch}")]
    NoReleaseAsset { os: String, arch: String },

    #[error("Unsupported archive: {0}")]
    UnsupportedArchive(String),

    #[error("Zip extraction error: {0}")]
    Zip(#[from] zip::result::ZipError),

    // ── Generic ─────────────────────────────────────────
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Other(String),
}

/// A launch precondition that did not hold. Nothing destructive has
/// happened when one of these is returned.
#[derive(Debug, Error)]
pub enum PreflightFailure {
    #[error("launch directory does not exist: {0:?}")]
    LaunchDirMissing(PathBuf),

    #[error("game executable not found: {0:?}")]
    ExecutableMissing(PathBuf),

    #[error("game data directory does not exist: {0:?}")]
    DataDirMissing(PathBuf),
}

/// Convenience alias used throughout the crate.
pub type ManagerResult<T> = Result<T, ManagerError>;

impl ManagerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ManagerError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<std::io::Error> for ManagerError {
    fn from(source: std::io::Error) -> Self {
        ManagerError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

// ── Serialization for the IPC boundary ──────────────────
// Errors cross into the UI as plain display strings.
impl serde::Serialize for ManagerError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

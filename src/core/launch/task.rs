// ─── Launch Task ───
// Builds and spawns the game process, and tears it down on request.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::core::error::{ManagerError, ManagerResult};

/// `STATUS_CONTROL_C_EXIT`: the user closed the game's console window.
pub const USER_CLOSED_CONSOLE: i32 = 0xC000_013Au32 as i32;

/// How the game is started from an install directory.
pub trait GameCommand: Send + Sync {
    /// File that must exist in the install directory before spawning.
    fn required_entry(&self, install_dir: &Path) -> PathBuf;

    /// Command that starts the game. Stdio is configured by the caller.
    fn build(&self, install_dir: &Path) -> Command;
}

/// The stock launch command for the host OS.
///
/// - Windows: `Balatro.exe` directly, in a new console.
/// - macOS: the injector's `run_lovely_macos.sh` wrapper.
/// - Linux: the fused `Balatro.exe` archive run through `love`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformGameCommand;

const MACOS_LAUNCH_SCRIPT: &str = "run_lovely_macos.sh";
const GAME_EXECUTABLE: &str = "Balatro.exe";

impl GameCommand for PlatformGameCommand {
    fn required_entry(&self, install_dir: &Path) -> PathBuf {
        if cfg!(target_os = "macos") {
            install_dir.join(MACOS_LAUNCH_SCRIPT)
        } else {
            install_dir.join(GAME_EXECUTABLE)
        }
    }

    fn build(&self, install_dir: &Path) -> Command {
        let entry = self.required_entry(install_dir);
        let mut cmd = if cfg!(target_os = "windows") {
            Command::new(entry)
        } else if cfg!(target_os = "macos") {
            let mut cmd = Command::new("sh");
            cmd.arg(entry);
            cmd
        } else {
            let mut cmd = Command::new("love");
            cmd.arg(entry);
            cmd
        };
        cmd.current_dir(install_dir);
        cmd
    }
}

/// Spawn the game as a child process with piped output.
pub fn spawn(game: &dyn GameCommand, install_dir: &Path) -> ManagerResult<Child> {
    let mut cmd = game.build(install_dir);
    configure_platform_spawn(&mut cmd);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(false);

    debug!(
        "Command (copy/paste): {}",
        format_command_for_logs(cmd.as_std())
    );

    cmd.spawn().map_err(|source| ManagerError::Io {
        path: game.required_entry(install_dir),
        source,
    })
}

/// Forward the child's stdout/stderr lines into the log.
pub fn forward_output(child: &mut Child, label: &str) {
    if let Some(stdout) = child.stdout.take() {
        let label = label.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("[game:{}][stdout] {}", label, line);
            }
        });
    }

    if let Some(stderr) = child.stderr.take() {
        let label = label.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!("[game:{}][stderr] {}", label, line);
            }
        });
    }
}

/// Ask the process to exit, then force it after `grace`.
///
/// On Unix the game runs as the leader of its own process group and the
/// whole group is signalled, so a wrapper script takes the game with it.
pub async fn terminate(child: &mut Child, grace: Duration) -> std::io::Result<ExitStatus> {
    let pid = child.id();
    if let Some(pid) = pid {
        if request_exit(pid).await {
            if let Ok(result) = tokio::time::timeout(grace, child.wait()).await {
                return result;
            }
            info!("Process {} ignored the exit request, killing", pid);
        }
    }

    #[cfg(not(target_os = "windows"))]
    {
        if let Some(pid) = pid {
            signal_group(pid, "-KILL").await;
        }
    }
    if let Err(e) = child.start_kill() {
        debug!("start_kill failed (process likely gone): {}", e);
    }
    child.wait().await
}

#[cfg(not(target_os = "windows"))]
async fn request_exit(pid: u32) -> bool {
    signal_group(pid, "-TERM").await
}

#[cfg(not(target_os = "windows"))]
async fn signal_group(pid: u32, signal: &str) -> bool {
    let group = format!("-{pid}");
    match Command::new("kill")
        .args([signal, "--", &group])
        .status()
        .await
    {
        Ok(status) => status.success(),
        Err(e) => {
            warn!("Could not send {} to process group {}: {}", signal, pid, e);
            false
        }
    }
}

#[cfg(target_os = "windows")]
async fn request_exit(pid: u32) -> bool {
    match Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .status()
        .await
    {
        Ok(status) => status.success(),
        Err(e) => {
            warn!("Could not run taskkill for {}: {}", pid, e);
            false
        }
    }
}

/// Result of a finished game process as reported to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Clean,
    Failed(Option<i32>),
}

pub fn classify_exit(status: &ExitStatus) -> ExitOutcome {
    classify_exit_code(status.code())
}

pub fn classify_exit_code(code: Option<i32>) -> ExitOutcome {
    match code {
        Some(0) | Some(USER_CLOSED_CONSOLE) => ExitOutcome::Clean,
        other => ExitOutcome::Failed(other),
    }
}

fn configure_platform_spawn(cmd: &mut Command) {
    #[cfg(target_os = "windows")]
    {
        const CREATE_NEW_CONSOLE: u32 = 0x00000010;
        cmd.creation_flags(CREATE_NEW_CONSOLE);
    }

    #[cfg(not(target_os = "windows"))]
    {
        cmd.process_group(0);
    }
}

fn format_command_for_logs(cmd: &std::process::Command) -> String {
    let program = shell_escape(&cmd.get_program().to_string_lossy());
    let args = cmd
        .get_args()
        .map(|arg| shell_escape(&arg.to_string_lossy()))
        .collect::<Vec<_>>()
        .join(" ");

    if args.is_empty() {
        program
    } else {
        format!("{} {}", program, args)
    }
}

fn shell_escape(raw: &str) -> String {
    if raw.is_empty() {
        return "\"\"".to_string();
    }

    if raw.chars().all(|ch| {
        ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/' | ':' | '\\' | '=')
    }) {
        return raw.to_string();
    }

    format!("\"{}\"", raw.replace('"', "\\\""))
}

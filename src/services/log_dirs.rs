//! XDG-compliant log directory management
//!
//! Logs are stored in `$XDG_STATE_HOME/shmel/logs/` (typically
//! `~/.local/state/shmel/logs/`), one file per shell process so that several
//! shells can run side by side. Files left behind by dead processes are
//! removed on startup once they are old enough.

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, SystemTime};

/// Minimum age for log files to be cleaned up (24 hours)
const CLEANUP_AGE: Duration = Duration::from_secs(24 * 60 * 60);

const LOG_FILE_PREFIX: &str = "shmel-";

static LOG_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Get the base log directory, creating it if necessary.
///
/// Falls back to `~/.local/state/shmel/logs/` if `XDG_STATE_HOME` is not
/// set, and to the system temp directory as a last resort.
pub fn log_dir() -> &'static PathBuf {
    LOG_DIR.get_or_init(|| {
        let fallback = || std::env::temp_dir().join("shmel-logs");
        let dir = xdg_log_dir().unwrap_or_else(fallback);

        if let Err(e) = fs::create_dir_all(&dir) {
            tracing::warn!("Failed to create log directory {:?}: {}", dir, e);
            return fallback();
        }
        dir
    })
}

fn xdg_log_dir() -> Option<PathBuf> {
    if let Some(state_home) = std::env::var_os("XDG_STATE_HOME") {
        let path = PathBuf::from(state_home);
        if path.is_absolute() {
            return Some(path.join("shmel").join("logs"));
        }
    }

    dirs::home_dir().map(|home| home.join(".local").join("state").join("shmel").join("logs"))
}

/// Log file for this process: `{log_dir}/shmel-{PID}.log`
pub fn main_log_path() -> PathBuf {
    log_dir().join(format!("{}{}.log", LOG_FILE_PREFIX, std::process::id()))
}

/// Remove log files of processes that no longer exist
pub fn cleanup_stale_logs() {
    cleanup_stale_logs_in_dir(log_dir(), std::process::id());
}

fn cleanup_stale_logs_in_dir(dir: &Path, current_pid: u32) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();
        if !name.starts_with(LOG_FILE_PREFIX) {
            continue;
        }

        let Some(pid) = extract_pid_from_filename(&name) else {
            continue;
        };
        if pid == current_pid {
            continue;
        }

        if !is_process_running(pid)
            && is_file_older_than(&entry.path(), CLEANUP_AGE)
            && entry.file_type().map(|t| t.is_file()).unwrap_or(false)
        {
            match fs::remove_file(entry.path()) {
                Ok(()) => tracing::debug!("Cleaned up stale log file: {:?}", entry.path()),
                Err(e) => {
                    tracing::debug!("Failed to clean up stale log {:?}: {}", entry.path(), e)
                }
            }
        }
    }
}

fn is_file_older_than(path: &Path, age: Duration) -> bool {
    let Ok(modified) = fs::metadata(path).and_then(|m| m.modified()) else {
        return false;
    };

    SystemTime::now()
        .duration_since(modified)
        .map(|elapsed| elapsed > age)
        .unwrap_or(false)
}

/// Extract the PID from a name like `shmel-12345.log`
fn extract_pid_from_filename(name: &str) -> Option<u32> {
    let without_ext = name.strip_suffix(".log")?;
    let last_hyphen = without_ext.rfind('-')?;
    without_ext[last_hyphen + 1..].parse().ok()
}

/// Signal 0 probes for existence; EPERM means it exists but belongs to someone else
fn is_process_running(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Print the files and directories the shell uses
pub fn print_all_paths() {
    use std::io::Write;

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    let unavailable = || PathBuf::from("<unavailable>");

    let config = crate::config::Config::default_path().unwrap_or_else(unavailable);
    let history = crate::config::HistoryConfig::default()
        .resolved_path()
        .unwrap_or_else(unavailable);

    writeln!(handle, "shmel paths:").ok();
    writeln!(handle).ok();
    writeln!(handle, "Config:   {}", config.display()).ok();
    writeln!(handle, "History:  {}", history.display()).ok();
    writeln!(handle, "Logs:     {}", log_dir().display()).ok();
}

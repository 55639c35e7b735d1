//! Path utilities for termdeck
//!
//! Handles XDG Base Directory specification compliance for config,
//! state, cache, and runtime directories.

use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Application identifier for XDG directories
const APP_NAME: &str = "termdeck";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APP_NAME)
}

/// Get the Unix socket path for client-server communication
///
/// Location: `$XDG_RUNTIME_DIR/termdeck/termdeck.sock` or `/tmp/termdeck-$UID/termdeck.sock`
pub fn socket_path() -> PathBuf {
    runtime_dir().join("termdeck.sock")
}

/// Get the runtime directory
///
/// Location: `$XDG_RUNTIME_DIR/termdeck` or `/tmp/termdeck-$UID`
pub fn runtime_dir() -> PathBuf {
    if let Ok(xdg_runtime) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(xdg_runtime).join(APP_NAME)
    } else {
        // SAFETY: getuid() is always safe to call
        let uid = unsafe { libc::getuid() };
        PathBuf::from(format!("/tmp/{}-{}", APP_NAME, uid))
    }
}

/// Get the configuration directory
///
/// Location: `$XDG_CONFIG_HOME/termdeck` or `~/.config/termdeck`
pub fn config_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(fallback_config_dir)
}

/// Server configuration file
///
/// Location: `$XDG_CONFIG_HOME/termdeck/server.toml`
pub fn server_config_file() -> PathBuf {
    config_dir().join("server.toml")
}

/// Client configuration file
///
/// Location: `$XDG_CONFIG_HOME/termdeck/client.toml`
pub fn client_config_file() -> PathBuf {
    config_dir().join("client.toml")
}

/// Get the state directory
///
/// Location: `$XDG_STATE_HOME/termdeck` or `~/.local/state/termdeck`
pub fn state_dir() -> PathBuf {
    project_dirs()
        .and_then(|p| p.state_dir().map(|d| d.to_path_buf()))
        .unwrap_or_else(fallback_state_dir)
}

/// Directory holding the console client's persisted registries and layout
///
/// Location: `$XDG_STATE_HOME/termdeck/console`
pub fn client_state_dir() -> PathBuf {
    state_dir().join("console")
}

/// Directory for captured PTY output (terminals created with logging enabled)
///
/// Location: `$XDG_STATE_HOME/termdeck/pty-logs`
pub fn pty_log_dir() -> PathBuf {
    state_dir().join("pty-logs")
}

/// Get the cache directory (temporary data, safe to delete)
///
/// Location: `$XDG_CACHE_HOME/termdeck` or `~/.cache/termdeck`
pub fn cache_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.cache_dir().to_path_buf())
        .unwrap_or_else(fallback_cache_dir)
}

/// Get the log directory
///
/// Location: `$XDG_STATE_HOME/termdeck/log`
pub fn log_dir() -> PathBuf {
    state_dir().join("log")
}

/// Get the PID file path (for daemon)
///
/// Location: `$XDG_RUNTIME_DIR/termdeck/termdeck.pid`
pub fn pid_file() -> PathBuf {
    runtime_dir().join("termdeck.pid")
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Ensure all required directories exist
pub fn ensure_all_dirs() -> std::io::Result<()> {
    ensure_dir(&runtime_dir())?;
    ensure_dir(&config_dir())?;
    ensure_dir(&state_dir())?;
    ensure_dir(&cache_dir())?;
    ensure_dir(&log_dir())?;
    Ok(())
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

fn fallback_config_dir() -> PathBuf {
    home_dir().join(".config").join(APP_NAME)
}

fn fallback_state_dir() -> PathBuf {
    home_dir().join(".local").join("state").join(APP_NAME)
}

fn fallback_cache_dir() -> PathBuf {
    home_dir().join(".cache").join(APP_NAME)
}

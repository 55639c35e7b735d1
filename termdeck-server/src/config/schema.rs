//! Configuration schema structs

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration (`server.toml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub terminal: TerminalConfig,
}

/// Listener settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Unix socket path (XDG runtime dir when unset)
    pub socket_path: Option<PathBuf>,
    /// Optional TCP listen address, e.g. "127.0.0.1:7878"
    pub tcp_addr: Option<String>,
}

/// Terminal process settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TerminalConfig {
    /// Shell used when a create request names none ($SHELL when unset)
    pub default_shell: Option<String>,
    /// Size used when a create request carries zero dimensions
    pub default_cols: u16,
    pub default_rows: u16,
    /// Quiet period after a newline before probing the working directory
    pub cwd_probe_debounce_ms: u64,
    /// Where captured output is written (XDG state dir when unset)
    pub log_dir: Option<PathBuf>,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            default_shell: None,
            default_cols: 80,
            default_rows: 24,
            cwd_probe_debounce_ms: 175,
            log_dir: None,
        }
    }
}

impl TerminalConfig {
    pub fn cwd_probe_debounce(&self) -> Duration {
        Duration::from_millis(self.cwd_probe_debounce_ms)
    }

    pub fn shell(&self) -> String {
        self.default_shell
            .clone()
            .unwrap_or_else(crate::pty::default_shell)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir
            .clone()
            .unwrap_or_else(termdeck_utils::pty_log_dir)
    }
}

impl ServerConfig {
    pub fn socket_path(&self) -> PathBuf {
        self.socket_path
            .clone()
            .unwrap_or_else(termdeck_utils::socket_path)
    }
}

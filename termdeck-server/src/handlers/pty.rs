//! Terminal process handlers
//!
//! Handles: PtyCreate, PtyInput, PtyResize, PtyClose, PtyReadLog

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use termdeck_protocol::{ErrorCode, ServerMessage, TerminalId};
use termdeck_utils::TermdeckError;

use super::{HandlerContext, HandlerResult};
use crate::probe::submits_line;
use crate::pty::SpawnSpec;

/// Environment variable exposing the terminal id to the child process
const TERMINAL_ID_ENV: &str = "TERMDECK_TERMINAL_ID";

impl HandlerContext {
    /// Handle PtyCreate - reclaim the live process for the id, or spawn one
    #[allow(clippy::too_many_arguments)]
    pub fn handle_create(
        &self,
        terminal_id: TerminalId,
        cwd: PathBuf,
        cols: u16,
        rows: u16,
        shell: Option<String>,
        env: BTreeMap<String, String>,
        logging: bool,
    ) -> HandlerResult {
        let Some(sender) = self.registry.sender(self.client_id) else {
            return HandlerContext::error(ErrorCode::InternalError, "Client not registered");
        };

        let config = self.config.load();
        let terminal = &config.terminal;

        let (cols, rows) = if cols == 0 || rows == 0 {
            (terminal.default_cols, terminal.default_rows)
        } else {
            (cols, rows)
        };

        let command_line = shell.unwrap_or_else(|| terminal.shell());
        let Some(spec) = SpawnSpec::from_command_line(&command_line) else {
            return HandlerContext::error(ErrorCode::InvalidMessage, "Empty command");
        };
        let mut spec = spec
            .size(cols, rows)
            .env("TERM", "xterm-256color")
            .env(TERMINAL_ID_ENV, terminal_id.to_string())
            .envs(env)
            .capture(logging);

        match spawn_dir(cwd) {
            Some(dir) => spec = spec.in_dir(dir),
            None => debug!(terminal_id = %terminal_id, "No usable cwd, inheriting"),
        }

        match self.host.create(terminal_id, spec, sender) {
            Ok(outcome) => {
                info!(
                    "Client {} {} terminal {}",
                    self.client_id,
                    if outcome.reclaimed { "reclaimed" } else { "created" },
                    terminal_id
                );
                HandlerResult::Response(ServerMessage::PtyCreated {
                    terminal_id,
                    reclaimed: outcome.reclaimed,
                })
            }
            Err(e) => {
                warn!(terminal_id = %terminal_id, error = %e, "Terminal spawn failed");
                HandlerContext::error(ErrorCode::SpawnFailed, e.to_string())
            }
        }
    }

    /// Handle PtyInput - forward bytes; a submitted line schedules a cwd probe
    pub fn handle_input(&self, terminal_id: TerminalId, data: Vec<u8>) -> HandlerResult {
        if let Err(e) = self.host.write(terminal_id, &data) {
            return terminal_error(terminal_id, e);
        }

        if submits_line(&data) {
            if let Some(sender) = self.registry.sender(self.client_id) {
                self.probes
                    .schedule(terminal_id, self.host.clone(), sender);
            }
        }

        HandlerResult::NoResponse
    }

    /// Handle PtyResize
    pub fn handle_resize(&self, terminal_id: TerminalId, cols: u16, rows: u16) -> HandlerResult {
        if cols == 0 || rows == 0 {
            return HandlerContext::error(
                ErrorCode::InvalidMessage,
                format!("Invalid size {}x{}", cols, rows),
            );
        }

        match self.host.resize(terminal_id, cols, rows) {
            Ok(()) => HandlerResult::NoResponse,
            Err(e) => terminal_error(terminal_id, e),
        }
    }

    /// Handle PtyClose - the exit notice follows from the output poller
    pub fn handle_close(&self, terminal_id: TerminalId) -> HandlerResult {
        self.probes.cancel(terminal_id);
        match self.host.close(terminal_id) {
            Ok(()) => HandlerResult::NoResponse,
            Err(e) => terminal_error(terminal_id, e),
        }
    }

    /// Handle PtyReadLog - return captured output
    pub async fn handle_read_log(&self, terminal_id: TerminalId) -> HandlerResult {
        match self.host.read_log(terminal_id).await {
            Ok(data) => HandlerResult::Response(ServerMessage::PtyLog { terminal_id, data }),
            Err(e) => terminal_error(terminal_id, e),
        }
    }
}

/// Working directory for a new process: the requested one when it exists,
/// otherwise the user's home
fn spawn_dir(requested: PathBuf) -> Option<PathBuf> {
    if !requested.as_os_str().is_empty() && requested.is_dir() {
        return Some(requested);
    }
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .filter(|home| home.is_dir())
}

fn terminal_error(terminal_id: TerminalId, err: TermdeckError) -> HandlerResult {
    match err {
        TermdeckError::TerminalNotFound(_) => HandlerContext::error(
            ErrorCode::TerminalNotFound,
            format!("Terminal {} not found", terminal_id),
        ),
        other => {
            warn!(terminal_id = %terminal_id, error = %other, "Terminal operation failed");
            HandlerContext::error(ErrorCode::InternalError, other.to_string())
        }
    }
}

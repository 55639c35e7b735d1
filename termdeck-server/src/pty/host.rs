//! Interface the control protocol handlers use to drive terminal processes

use async_trait::async_trait;

use termdeck_protocol::TerminalId;
use termdeck_utils::Result;

use super::SpawnSpec;
use crate::registry::ClientSender;

/// Result of a create request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateOutcome {
    /// An existing live process was rebound instead of spawning a new one
    pub reclaimed: bool,
}

/// Owner of one process per terminal id
#[async_trait]
pub trait TerminalHost: Send + Sync {
    /// Whether a live process exists for the id
    fn has(&self, terminal_id: TerminalId) -> bool;

    /// Reclaim the live process for the id, or spawn one.
    ///
    /// The liveness check and the spawn/reclaim happen as one step, so
    /// concurrent creates for the same id never produce two processes.
    fn create(
        &self,
        terminal_id: TerminalId,
        spec: SpawnSpec,
        sender: ClientSender,
    ) -> Result<CreateOutcome>;

    /// Route a live process's output to a new connection
    fn reclaim_for_client(&self, terminal_id: TerminalId, sender: ClientSender) -> bool;

    fn write(&self, terminal_id: TerminalId, data: &[u8]) -> Result<()>;

    fn resize(&self, terminal_id: TerminalId, cols: u16, rows: u16) -> Result<()>;

    /// Terminate the process. Unknown ids are ignored.
    fn close(&self, terminal_id: TerminalId) -> Result<()>;

    /// Last cwd reported to the client
    fn tracked_cwd(&self, terminal_id: TerminalId) -> Option<String>;

    fn set_tracked_cwd(&self, terminal_id: TerminalId, cwd: String);

    /// Probe the live process's working directory
    async fn resolve_runtime_cwd(&self, terminal_id: TerminalId) -> Option<String>;

    /// Captured output of a terminal created with logging enabled
    async fn read_log(&self, terminal_id: TerminalId) -> Result<Vec<u8>>;
}

//! Terminal identifiers and process state

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a pseudo-terminal (one OS child process on the server)
pub type TerminalId = Uuid;

/// Connectivity of a terminal's backing process as last observed by a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalConnectivity {
    /// Process is alive and streaming
    #[default]
    Running,
    /// Process exited on its own
    Exited,
    /// Server lost the process (e.g. server restart) and cannot reclaim it
    Dead,
}

impl TerminalConnectivity {
    /// Whether the process can still receive input
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_default_is_running() {
        assert_eq!(TerminalConnectivity::default(), TerminalConnectivity::Running);
        assert!(TerminalConnectivity::Running.is_live());
        assert!(!TerminalConnectivity::Exited.is_live());
        assert!(!TerminalConnectivity::Dead.is_live());
    }
}

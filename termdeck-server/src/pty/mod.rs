//! PTY management for the termdeck server
//!
//! Provides pseudo-terminal creation and lifecycle management
//! using portable-pty for cross-platform compatibility.

mod config;
mod cwd;
mod handle;
mod host;
mod manager;
mod output;

pub use config::{default_shell, SpawnSpec};
pub use cwd::probe_process_cwd;
pub use handle::PtyHandle;
pub use host::{CreateOutcome, TerminalHost};
pub use manager::PtyManager;
pub use output::{OutputPollerConfig, OutputSink, PollerHandle, PtyOutputPoller, ReapHook};

#[cfg(test)]
pub mod testing;

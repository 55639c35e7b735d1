//! termdeck-utils: Common utilities shared across termdeck crates
//!
//! This crate provides:
//! - Unified error types ([`TermdeckError`], [`Result`])
//! - Logging infrastructure ([`init_logging`], [`LogConfig`])
//! - XDG-compliant path utilities ([`paths`] module)

pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Result, TermdeckError};
pub use logging::{init_logging, init_logging_with_config, LogConfig, LogOutput};

pub use paths::{
    cache_dir, client_config_file, client_state_dir, config_dir, ensure_all_dirs, ensure_dir, log_dir,
    pid_file, pty_log_dir, runtime_dir, server_config_file, socket_path, state_dir,
};

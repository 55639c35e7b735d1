//! termdeck client library
//!
//! Client-side state for a multi-session terminal console: the pane layout
//! engine, session and group registry, terminal resource cache, connection
//! synchronization, local persistence and auto-archival.

pub mod archive;
pub mod auto_start;
pub mod cache;
pub mod cli;
pub mod config;
pub mod console;
pub mod layout;
pub mod persistence;
pub mod registry;
pub mod runtime;
pub mod sync;

pub use console::{Console, ConsoleOptions, NewSession};
pub use runtime::{deliver_once, ConsoleCommand, ConsoleRuntime};

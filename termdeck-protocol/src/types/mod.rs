//! Shared identifiers and records

pub mod group;
pub mod terminal;

pub use group::*;
pub use terminal::*;

use uuid::Uuid;

/// Identifier of a console session
pub type SessionId = Uuid;

/// Identifier of a node in a pane tree
pub type PaneId = Uuid;

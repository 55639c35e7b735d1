//! termdeck-protocol: Shared IPC definitions for client-server communication
//!
//! This crate defines the terminal control protocol spoken between the
//! console client and the PTY server over a Unix socket or TCP connection.

pub mod codec;
pub mod messages;
pub mod types;

pub use codec::{ClientCodec, CodecError, FrameCodec, Inbound, ServerCodec, MAX_MESSAGE_SIZE};
pub use messages::{ClientMessage, ErrorCode, ServerMessage};
pub use types::{GroupId, GroupInfo, PaneId, SessionId, TerminalConnectivity, TerminalId};

/// Current protocol version
pub const PROTOCOL_VERSION: u32 = 1;

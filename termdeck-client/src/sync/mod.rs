//! Server connection and state synchronization

mod backoff;
mod connection;
mod sender;
mod synchronizer;

pub use backoff::{Backoff, INITIAL_RECONNECT_DELAY, MAX_RECONNECT_DELAY};
pub use connection::{Connection, ConnectionEvent, ConnectionState, ServerAddr, StreamTrait, Tagged};
pub use sender::MessageSender;
pub use synchronizer::{ConnectionSynchronizer, TerminalRequest, GROUP_ACTIVITY_THROTTLE};

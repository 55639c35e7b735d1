//! Live connections
//!
//! Each accepted connection gets a [`ConnectionId`] and an outbound
//! channel. Group changes made on one connection are echoed to the others
//! through here.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use termdeck_protocol::ServerMessage;

/// Outbound channel of one connection
pub type ClientSender = mpsc::Sender<ServerMessage>;

/// Server-local id of a connection; unrelated to the client's own uuid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug)]
pub struct ClientRegistry {
    connections: DashMap<ClientId, ClientSender>,
    next_id: AtomicU64,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn register(&self, sender: ClientSender) -> ClientId {
        let id = ClientId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.connections.insert(id, sender);
        debug!(connection = %id, "Connection registered");
        id
    }

    pub fn unregister(&self, id: ClientId) {
        if self.connections.remove(&id).is_some() {
            debug!(connection = %id, "Connection unregistered");
        }
    }

    pub fn sender(&self, id: ClientId) -> Option<ClientSender> {
        self.connections.get(&id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Queue a message without waiting
    ///
    /// A connection whose channel is closed is dropped from the registry; a
    /// full channel loses the message.
    pub fn send_to(&self, id: ClientId, message: ServerMessage) -> bool {
        let Some(sender) = self.sender(id) else {
            return false;
        };
        match sender.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Closed(_)) => {
                self.unregister(id);
                false
            }
            Err(TrySendError::Full(message)) => {
                warn!(connection = %id, message = message.name(), "Outbound queue full, dropped");
                false
            }
        }
    }

    /// Send to every connection but `origin`; returns how many accepted it
    pub fn broadcast_except(&self, origin: ClientId, message: ServerMessage) -> usize {
        let targets: Vec<ClientId> = self
            .connections
            .iter()
            .map(|entry| *entry.key())
            .filter(|id| *id != origin)
            .collect();
        targets
            .into_iter()
            .filter(|id| self.send_to(*id, message.clone()))
            .count()
    }
}

//! Clonable handle for queuing messages to the server

use termdeck_protocol::ClientMessage;
use termdeck_utils::{Result, TermdeckError};
use tokio::sync::mpsc;

/// Clonable message sender
#[derive(Clone, Debug)]
pub struct MessageSender {
    tx: mpsc::Sender<ClientMessage>,
}

impl MessageSender {
    pub fn new(tx: mpsc::Sender<ClientMessage>) -> Self {
        Self { tx }
    }

    pub async fn send(&self, msg: ClientMessage) -> Result<()> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| TermdeckError::ConnectionClosed)
    }

    /// Send without waiting (fire and forget)
    pub fn send_nowait(&self, msg: ClientMessage) {
        if let Err(e) = self.tx.try_send(msg) {
            tracing::debug!("Dropped outgoing message: {}", e);
        }
    }

    /// Send a batch in order, stopping at the first failure
    pub async fn send_all(&self, messages: impl IntoIterator<Item = ClientMessage>) -> Result<usize> {
        let mut sent = 0;
        for msg in messages {
            self.send(msg).await?;
            sent += 1;
        }
        Ok(sent)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

//! Handshake and keepalive

use tracing::{debug, info, warn};
use uuid::Uuid;

use termdeck_protocol::{ErrorCode, ServerMessage, PROTOCOL_VERSION};

use super::{HandlerContext, HandlerResult};

impl HandlerContext {
    /// Accept a client whose protocol version matches ours
    ///
    /// Messages sent before (or without) a handshake are still served; the
    /// handshake only rejects incompatible peers.
    pub fn handle_connect(&self, client_uuid: Uuid, protocol_version: u32) -> HandlerResult {
        if protocol_version != PROTOCOL_VERSION {
            warn!(
                connection = %self.client_id,
                client = %client_uuid,
                protocol_version,
                "Rejecting client with incompatible protocol"
            );
            return HandlerContext::error(
                ErrorCode::ProtocolMismatch,
                format!(
                    "client speaks protocol {}, server speaks {}",
                    protocol_version, PROTOCOL_VERSION
                ),
            );
        }

        info!(connection = %self.client_id, client = %client_uuid, "Client handshake");
        HandlerResult::Response(ServerMessage::Connected {
            server_version: env!("CARGO_PKG_VERSION").into(),
            protocol_version: PROTOCOL_VERSION,
        })
    }

    pub fn handle_ping(&self) -> HandlerResult {
        debug!(connection = %self.client_id, "Ping");
        HandlerResult::Response(ServerMessage::Pong)
    }
}

//! Message handlers for client requests
//!
//! Routes incoming `ClientMessage` values to the handler for each message
//! type and turns the outcome into `ServerMessage` responses.

mod connection;
mod group;
mod pty;

use std::sync::Arc;

use termdeck_protocol::{ClientMessage, ErrorCode, ServerMessage};

use crate::config::ConfigHandle;
use crate::groups::GroupDirectory;
use crate::probe::CwdProbeScheduler;
use crate::pty::TerminalHost;
use crate::registry::{ClientId, ClientRegistry};

/// Context for message handlers
///
/// Provides access to all server state needed to handle client requests.
pub struct HandlerContext {
    /// Terminal processes
    pub host: Arc<dyn TerminalHost>,
    /// Workspace groups known to the server
    pub groups: Arc<GroupDirectory>,
    /// Client connection registry for tracking and broadcasting
    pub registry: Arc<ClientRegistry>,
    /// Application configuration
    pub config: ConfigHandle,
    /// Pending cwd probes
    pub probes: Arc<CwdProbeScheduler>,
    /// The client making this request
    pub client_id: ClientId,
}

/// Result of handling a message
#[derive(Debug)]
pub enum HandlerResult {
    /// Single response to send back to the client
    Response(ServerMessage),
    /// Response to client plus the same change announced to every other client
    ResponseWithBroadcast {
        response: ServerMessage,
        broadcast: ServerMessage,
    },
    /// No response needed (fire-and-forget messages like input)
    NoResponse,
}

impl HandlerContext {
    /// Create a new handler context
    pub fn new(
        host: Arc<dyn TerminalHost>,
        groups: Arc<GroupDirectory>,
        registry: Arc<ClientRegistry>,
        config: ConfigHandle,
        probes: Arc<CwdProbeScheduler>,
        client_id: ClientId,
    ) -> Self {
        Self {
            host,
            groups,
            registry,
            config,
            probes,
            client_id,
        }
    }

    /// Route a client message to the appropriate handler
    pub async fn route_message(&self, msg: ClientMessage) -> HandlerResult {
        match msg {
            ClientMessage::Connect {
                client_id,
                protocol_version,
            } => self.handle_connect(client_id, protocol_version),

            ClientMessage::Ping => self.handle_ping(),

            ClientMessage::PtyCreate {
                terminal_id,
                cwd,
                cols,
                rows,
                shell,
                env,
                logging,
            } => self.handle_create(terminal_id, cwd, cols, rows, shell, env, logging),

            ClientMessage::PtyInput { terminal_id, data } => self.handle_input(terminal_id, data),

            ClientMessage::PtyResize {
                terminal_id,
                cols,
                rows,
            } => self.handle_resize(terminal_id, cols, rows),

            ClientMessage::PtyClose { terminal_id } => self.handle_close(terminal_id),

            ClientMessage::PtyReadLog { terminal_id } => self.handle_read_log(terminal_id).await,

            ClientMessage::GroupCreate {
                group_id,
                label,
                created_at,
            } => self.handle_group_create(group_id, label, created_at),

            ClientMessage::GroupRename { group_id, label } => {
                self.handle_group_rename(group_id, label)
            }

            ClientMessage::GroupDelete { group_id } => self.handle_group_delete(group_id),

            ClientMessage::ListGroups => self.handle_list_groups(),
        }
    }

    /// Create an error response
    pub fn error(code: ErrorCode, message: impl Into<String>) -> HandlerResult {
        HandlerResult::Response(ServerMessage::Error {
            code,
            message: message.into(),
        })
    }
}

impl From<ServerMessage> for HandlerResult {
    fn from(msg: ServerMessage) -> Self {
        HandlerResult::Response(msg)
    }
}

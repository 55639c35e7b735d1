//! Per-connection message loop

use std::panic::AssertUnwindSafe;

use futures::{FutureExt, SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, warn};

use termdeck_protocol::{ClientMessage, ErrorCode, Inbound, ServerCodec, ServerMessage};

use crate::handlers::{HandlerContext, HandlerResult};
use crate::registry::ClientId;
use crate::SharedState;

/// Outbound queue depth per connection
const CLIENT_CHANNEL_CAPACITY: usize = 256;

/// Serve one client until it disconnects or the server shuts down.
///
/// Terminal processes outlive the connection; a reconnecting client reclaims
/// them with a create request for the same id.
pub async fn handle_client<R, W>(reader: R, writer: W, state: SharedState)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(CLIENT_CHANNEL_CAPACITY);
    let client_id = state.registry.register(tx.clone());
    info!("Client {} connected", client_id);

    let mut frames = FramedRead::new(reader, ServerCodec::new());
    let mut sink = FramedWrite::new(writer, ServerCodec::new());

    let writer_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = sink.send(msg).await {
                debug!("Client {} write failed: {}", client_id, e);
                break;
            }
        }
    });

    let ctx = state.handler_context(client_id);
    let mut shutdown_rx = state.subscribe_shutdown();

    loop {
        tokio::select! {
            frame = frames.next() => match frame {
                Some(Ok(Inbound::Message(msg))) => {
                    let result = dispatch(&ctx, msg).await;
                    if !deliver(&state, client_id, &tx, result).await {
                        break;
                    }
                }
                Some(Ok(Inbound::Malformed(reason))) => {
                    warn!("Client {} sent a malformed frame: {}", client_id, reason);
                    let reply = ServerMessage::Error {
                        code: ErrorCode::InvalidMessage,
                        message: format!("Malformed message: {}", reason),
                    };
                    if tx.send(reply).await.is_err() {
                        break;
                    }
                }
                Some(Err(e)) => {
                    warn!("Client {} stream error: {}", client_id, e);
                    break;
                }
                None => {
                    debug!("Client {} closed the connection", client_id);
                    break;
                }
            },
            _ = shutdown_rx.recv() => {
                debug!("Shutdown signal, closing client {}", client_id);
                break;
            }
        }
    }

    state.registry.unregister(client_id);
    drop(tx);
    // Output pollers may still hold the sender; stop writing explicitly
    writer_task.abort();
    info!("Client {} disconnected", client_id);
}

/// Run a handler, turning a panic into an error reply
async fn dispatch(ctx: &HandlerContext, msg: ClientMessage) -> HandlerResult {
    let name = msg.name();
    debug!("Client {} -> {}", ctx.client_id, name);

    match AssertUnwindSafe(ctx.route_message(msg)).catch_unwind().await {
        Ok(result) => result,
        Err(_) => {
            error!("Handler for {} panicked (client {})", name, ctx.client_id);
            HandlerContext::error(
                ErrorCode::InternalError,
                format!("Internal error handling {}", name),
            )
        }
    }
}

/// Send a handler result; false when the client's queue is gone
async fn deliver(
    state: &SharedState,
    client_id: ClientId,
    tx: &mpsc::Sender<ServerMessage>,
    result: HandlerResult,
) -> bool {
    match result {
        HandlerResult::Response(msg) => tx.send(msg).await.is_ok(),
        HandlerResult::ResponseWithBroadcast {
            response,
            broadcast,
        } => {
            state.registry.broadcast_except(client_id, broadcast);
            tx.send(response).await.is_ok()
        }
        HandlerResult::NoResponse => true,
    }
}

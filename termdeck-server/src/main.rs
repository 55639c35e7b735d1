//! termdeck server - PTY host daemon
//!
//! Owns one pseudo-terminal process per terminal id and speaks the control
//! protocol to console clients over a Unix socket (and optionally TCP).

mod cli;
mod config;
mod connection;
mod groups;
mod handlers;
mod probe;
mod pty;
mod registry;
mod tcp;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use termdeck_utils::{
    ensure_dir, init_logging_with_config, pid_file, LogConfig, LogOutput, Result, TermdeckError,
};

use crate::cli::Args;
use crate::config::{config_handle, AppConfig, ConfigHandle, ConfigLoader};
use crate::connection::handle_client;
use crate::groups::GroupDirectory;
use crate::handlers::HandlerContext;
use crate::probe::CwdProbeScheduler;
use crate::pty::{PtyManager, TerminalHost};
use crate::registry::{ClientId, ClientRegistry};

/// State shared by every connection
#[derive(Clone)]
pub struct SharedState {
    pub host: Arc<dyn TerminalHost>,
    pub groups: Arc<GroupDirectory>,
    pub registry: Arc<ClientRegistry>,
    pub config: ConfigHandle,
    pub probes: Arc<CwdProbeScheduler>,
    pub shutdown_tx: broadcast::Sender<()>,
}

impl SharedState {
    pub fn new(host: Arc<dyn TerminalHost>, config: ConfigHandle) -> Self {
        let debounce = config.load().terminal.cwd_probe_debounce();
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            host,
            groups: Arc::new(GroupDirectory::new()),
            registry: Arc::new(ClientRegistry::new()),
            config,
            probes: Arc::new(CwdProbeScheduler::new(debounce)),
            shutdown_tx,
        }
    }

    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    pub fn handler_context(&self, client_id: ClientId) -> HandlerContext {
        HandlerContext::new(
            Arc::clone(&self.host),
            Arc::clone(&self.groups),
            Arc::clone(&self.registry),
            Arc::clone(&self.config),
            Arc::clone(&self.probes),
            client_id,
        )
    }
}

/// Run the Unix socket accept loop
async fn run_unix_accept_loop(listener: UnixListener, shared_state: SharedState) {
    let mut shutdown_rx = shared_state.subscribe_shutdown();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _)) => {
                        let state_clone = shared_state.clone();
                        tokio::spawn(async move {
                            let (reader, writer) = stream.into_split();
                            handle_client(reader, writer, state_clone).await;
                        });
                    }
                    Err(e) => {
                        error!("Unix accept error: {}", e);
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received, stopping Unix accept loop");
                break;
            }
        }
    }
}

/// Bind the socket, refusing to steal it from a live server
async fn bind_socket(path: &Path) -> Result<UnixListener> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    if path.exists() {
        if tokio::net::UnixStream::connect(path).await.is_ok() {
            return Err(TermdeckError::connection(format!(
                "Another server is already listening on {}",
                path.display()
            )));
        }
        debug!("Removing stale socket {}", path.display());
        std::fs::remove_file(path).map_err(|e| TermdeckError::FileWrite {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    Ok(UnixListener::bind(path)?)
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Run the main server daemon
async fn run_daemon(app_config: AppConfig) -> Result<()> {
    info!("termdeck server starting");

    let socket_path = app_config.server.socket_path();
    let listener = bind_socket(&socket_path).await?;
    info!("Listening on {}", socket_path.display());

    let pid_path = pid_file();
    if let Err(e) = std::fs::write(&pid_path, std::process::id().to_string()) {
        warn!("Failed to write pid file {}: {}", pid_path.display(), e);
    }

    let manager = Arc::new(PtyManager::new(app_config.terminal.log_dir()));
    let state = SharedState::new(manager.clone(), config_handle(app_config.clone()));

    if let Some(addr) = &app_config.server.tcp_addr {
        let tcp_listener = TcpListener::bind(addr).await?;
        tokio::spawn(tcp::run_tcp_accept_loop(tcp_listener, state.clone()));
    }

    let accept = tokio::spawn(run_unix_accept_loop(listener, state.clone()));

    wait_for_shutdown_signal().await;
    info!("Shutting down");

    state.trigger_shutdown();
    if let Err(e) = accept.await {
        warn!("Accept loop ended abnormally: {}", e);
    }
    state.probes.cancel_all();
    manager.close_all();

    let _ = std::fs::remove_file(&socket_path);
    let _ = std::fs::remove_file(&pid_path);

    info!("termdeck server stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_config = if args.foreground {
        LogConfig {
            output: LogOutput::Stderr,
            ..LogConfig::server()
        }
    } else {
        LogConfig::server()
    };
    init_logging_with_config(log_config)?;

    let mut app_config = ConfigLoader::load_and_validate(args.config.as_deref())?;
    if let Some(socket) = args.socket {
        app_config.server.socket_path = Some(socket);
    }
    if let Some(tcp) = args.tcp {
        app_config.server.tcp_addr = Some(tcp);
    }

    run_daemon(app_config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use termdeck_protocol::{ClientCodec, ClientMessage, Inbound, ServerMessage};
    use tokio_util::codec::Framed;

    #[tokio::test]
    async fn test_bind_socket_replaces_stale_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run").join("termdeck.sock");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"stale").unwrap();

        let listener = bind_socket(&path).await;
        assert!(listener.is_ok());
    }

    #[tokio::test]
    async fn test_bind_socket_refuses_live_server() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("termdeck.sock");
        let _live = bind_socket(&path).await.unwrap();

        let second = bind_socket(&path).await;
        assert!(matches!(second, Err(TermdeckError::Connection(_))));
    }

    #[tokio::test]
    async fn test_unix_accept_loop_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("termdeck.sock");
        let listener = bind_socket(&path).await.unwrap();
        let (state, _logs) = connection::tests::test_state();

        let handle = tokio::spawn(run_unix_accept_loop(listener, state.clone()));

        // A served round trip proves the loop is running
        let stream = tokio::net::UnixStream::connect(&path).await.unwrap();
        let mut framed = Framed::new(stream, ClientCodec::new());
        framed.send(ClientMessage::Ping).await.unwrap();
        assert_eq!(
            framed.next().await.unwrap().unwrap(),
            Inbound::Message(ServerMessage::Pong)
        );

        state.trigger_shutdown();
        handle.await.unwrap();
    }
}

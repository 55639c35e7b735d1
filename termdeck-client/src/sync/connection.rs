//! Connection to the termdeck server
//!
//! One connection attempt per epoch. Every message read from the socket is
//! tagged with the epoch of the attempt that received it, and a closing
//! attempt reports its epoch so the runtime can ignore stale closures.

use std::path::PathBuf;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use url::Url;

use termdeck_protocol::{ClientCodec, ClientMessage, Inbound, ServerMessage};
use termdeck_utils::{socket_path, Result, TermdeckError};

use super::sender::MessageSender;

/// How long `close` waits for queued messages to be written
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Trait alias for streams that can be used with Framed
pub trait StreamTrait: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> StreamTrait for T {}

/// Server message stamped with the epoch of the connection that read it
#[derive(Debug, Clone, PartialEq)]
pub struct Tagged {
    pub epoch: u64,
    pub message: ServerMessage,
}

/// What a connection task reports to the runtime
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Message(Tagged),
    Closed { epoch: u64 },
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Parsed server address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAddr {
    Unix(PathBuf),
    Tcp(String),
}

impl ServerAddr {
    /// Parse `unix://path`, `tcp://host:port` or a bare socket path
    pub fn parse(addr: &str) -> Result<Self> {
        if addr.starts_with("tcp://") {
            let url = Url::parse(addr).map_err(|e| {
                TermdeckError::Connection(format!("Invalid TCP URL '{}': {}", addr, e))
            })?;
            let host = url
                .host_str()
                .ok_or_else(|| TermdeckError::Connection("Missing host in TCP URL".into()))?;
            let port = url
                .port()
                .ok_or_else(|| TermdeckError::Connection("Missing port in TCP URL".into()))?;
            Ok(ServerAddr::Tcp(format!("{}:{}", host, port)))
        } else if addr.starts_with("unix://") {
            let url = Url::parse(addr)
                .map_err(|e| TermdeckError::Connection(format!("Invalid Unix URL: {}", e)))?;
            Ok(ServerAddr::Unix(PathBuf::from(url.path())))
        } else {
            Ok(ServerAddr::Unix(PathBuf::from(addr)))
        }
    }

    /// Default local socket
    pub fn default_unix() -> Self {
        ServerAddr::Unix(socket_path())
    }

    pub fn is_local(&self) -> bool {
        matches!(self, ServerAddr::Unix(_))
    }

    /// Open a stream to the server
    pub async fn open(&self) -> Result<Box<dyn StreamTrait>> {
        match self {
            ServerAddr::Tcp(addr) => {
                let stream = TcpStream::connect(addr)
                    .await
                    .map_err(|source| TermdeckError::Connect {
                        addr: self.to_string(),
                        source,
                    })?;
                Ok(Box::new(stream))
            }
            ServerAddr::Unix(path) => {
                if !path.exists() {
                    return Err(TermdeckError::ServerNotRunning { path: path.clone() });
                }
                let stream = UnixStream::connect(path)
                    .await
                    .map_err(|source| TermdeckError::Connect {
                        addr: self.to_string(),
                        source,
                    })?;
                Ok(Box::new(stream))
            }
        }
    }
}

impl std::fmt::Display for ServerAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerAddr::Unix(path) => write!(f, "unix://{}", path.display()),
            ServerAddr::Tcp(addr) => write!(f, "tcp://{}", addr),
        }
    }
}

/// Client connection to the termdeck server
pub struct Connection {
    addr: ServerAddr,
    state: ConnectionState,
    /// Outgoing channel of the current attempt
    tx: Option<mpsc::Sender<ClientMessage>>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl Connection {
    pub fn new(addr: ServerAddr) -> Self {
        Self {
            addr,
            state: ConnectionState::Disconnected,
            tx: None,
            task_handle: None,
        }
    }

    /// Create with custom socket path
    pub fn with_socket_path(path: PathBuf) -> Self {
        Self::new(ServerAddr::Unix(path))
    }

    pub fn addr(&self) -> &ServerAddr {
        &self.addr
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Mark that a reconnect is pending
    pub fn set_reconnecting(&mut self) {
        self.abort_task();
        self.state = ConnectionState::Reconnecting;
    }

    /// Open a connection for `epoch`, reporting into `events`
    ///
    /// Any previous attempt is torn down first.
    pub async fn connect(
        &mut self,
        epoch: u64,
        events: mpsc::Sender<ConnectionEvent>,
    ) -> Result<()> {
        self.abort_task();
        self.state = ConnectionState::Connecting;

        let stream = match self.addr.open().await {
            Ok(stream) => stream,
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                return Err(e);
            }
        };

        let framed = Framed::new(stream, ClientCodec::new());
        let (outgoing_tx, outgoing_rx) = mpsc::channel::<ClientMessage>(256);
        self.tx = Some(outgoing_tx);

        let handle = tokio::spawn(Self::connection_task(epoch, framed, outgoing_rx, events));
        self.task_handle = Some(handle);

        self.state = ConnectionState::Connected;
        tracing::info!(addr = %self.addr, epoch, "Connected to server");
        Ok(())
    }

    /// Disconnect from server
    pub async fn disconnect(&mut self) {
        self.abort_task();
        self.state = ConnectionState::Disconnected;
    }

    /// Disconnect once every message already queued has been written
    ///
    /// The writer is aborted if it has not finished within a second.
    pub async fn close(&mut self) {
        self.tx = None;
        if let Some(mut handle) = self.task_handle.take() {
            if tokio::time::timeout(CLOSE_TIMEOUT, &mut handle).await.is_err() {
                tracing::debug!(addr = %self.addr, "Connection writer still busy, aborting");
                handle.abort();
            }
        }
        self.state = ConnectionState::Disconnected;
    }

    fn abort_task(&mut self) {
        self.tx = None;
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }

    /// Send a message to the server
    pub async fn send(&self, msg: ClientMessage) -> Result<()> {
        match (&self.tx, self.state) {
            (Some(tx), ConnectionState::Connected) => tx
                .send(msg)
                .await
                .map_err(|_| TermdeckError::ConnectionClosed),
            _ => Err(TermdeckError::connection("Not connected")),
        }
    }

    /// Get a message sender that can be cloned
    pub fn sender(&self) -> Option<MessageSender> {
        self.tx.clone().map(MessageSender::new)
    }

    /// Background task that handles the actual socket I/O
    async fn connection_task(
        epoch: u64,
        mut framed: Framed<Box<dyn StreamTrait>, ClientCodec>,
        mut outgoing: mpsc::Receiver<ClientMessage>,
        events: mpsc::Sender<ConnectionEvent>,
    ) {
        loop {
            tokio::select! {
                outbound = outgoing.recv() => {
                    let Some(msg) = outbound else {
                        break;
                    };
                    if let Err(e) = framed.send(msg).await {
                        tracing::error!("Failed to send message: {}", e);
                        break;
                    }
                }

                result = framed.next() => {
                    match result {
                        Some(Ok(Inbound::Message(message))) => {
                            tracing::trace!(message = message.name(), epoch, "Received message");
                            let event = ConnectionEvent::Message(Tagged { epoch, message });
                            if events.send(event).await.is_err() {
                                tracing::debug!("Event channel closed, receiver dropped");
                                return;
                            }
                        }
                        Some(Ok(Inbound::Malformed(reason))) => {
                            tracing::warn!(%reason, "Skipping malformed frame from server");
                        }
                        Some(Err(e)) => {
                            tracing::error!("Failed to receive message: {}", e);
                            break;
                        }
                        None => {
                            tracing::info!("Server closed connection");
                            break;
                        }
                    }
                }
            }
        }
        let _ = events.send(ConnectionEvent::Closed { epoch }).await;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.abort_task();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use termdeck_protocol::ServerCodec;
    use tempfile::tempdir;
    use tokio::net::UnixListener;

    #[test]
    fn test_parse_addr() {
        assert_eq!(
            ServerAddr::parse("tcp://127.0.0.1:7878").unwrap(),
            ServerAddr::Tcp("127.0.0.1:7878".into())
        );
        assert_eq!(
            ServerAddr::parse("unix:///tmp/termdeck.sock").unwrap(),
            ServerAddr::Unix(PathBuf::from("/tmp/termdeck.sock"))
        );
        assert_eq!(
            ServerAddr::parse("/tmp/x.sock").unwrap(),
            ServerAddr::Unix(PathBuf::from("/tmp/x.sock"))
        );
        assert!(ServerAddr::parse("tcp://localhost").is_err());
    }

    #[test]
    fn test_addr_display() {
        let addr = ServerAddr::Tcp("10.0.0.1:9000".into());
        assert_eq!(addr.to_string(), "tcp://10.0.0.1:9000");
        assert!(!addr.is_local());
        assert!(ServerAddr::default_unix().is_local());
    }

    #[tokio::test]
    async fn test_connect_no_server() {
        let mut conn = Connection::with_socket_path("/nonexistent/path.sock".into());
        let (tx, _rx) = mpsc::channel(8);
        let result = conn.connect(1, tx).await;
        assert!(matches!(result, Err(TermdeckError::ServerNotRunning { .. })));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_send_not_connected() {
        let conn = Connection::with_socket_path("/nonexistent/path.sock".into());
        assert!(conn.send(ClientMessage::Ping).await.is_err());
        assert!(conn.sender().is_none());
    }

    #[tokio::test]
    async fn test_messages_are_tagged_and_close_reported() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");
        let listener = UnixListener::bind(&socket_path).unwrap();

        // Mock server: answer one ping, then hang up
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut framed = Framed::new(stream, ServerCodec::new());
            let request = framed.next().await.unwrap().unwrap();
            assert_eq!(request, Inbound::Message(ClientMessage::Ping));
            framed.send(ServerMessage::Pong).await.unwrap();
        });

        let mut conn = Connection::with_socket_path(socket_path);
        let (tx, mut rx) = mpsc::channel(8);
        conn.connect(7, tx).await.unwrap();
        assert!(conn.is_connected());

        conn.send(ClientMessage::Ping).await.unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            ConnectionEvent::Message(Tagged {
                epoch: 7,
                message: ServerMessage::Pong
            })
        );
        assert_eq!(rx.recv().await.unwrap(), ConnectionEvent::Closed { epoch: 7 });

        server.await.unwrap();
        conn.disconnect().await;
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_close_flushes_queued_messages() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");
        let listener = UnixListener::bind(&socket_path).unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut framed = Framed::new(stream, ServerCodec::new());
            let mut received = Vec::new();
            while let Some(Ok(Inbound::Message(message))) = framed.next().await {
                received.push(message);
            }
            received
        });

        let mut conn = Connection::with_socket_path(socket_path);
        let (tx, _rx) = mpsc::channel(8);
        conn.connect(1, tx).await.unwrap();
        let terminal_id = uuid::Uuid::new_v4();
        conn.send(ClientMessage::Ping).await.unwrap();
        conn.send(ClientMessage::PtyClose { terminal_id }).await.unwrap();
        conn.send(ClientMessage::ListGroups).await.unwrap();
        conn.close().await;
        assert_eq!(conn.state(), ConnectionState::Disconnected);

        assert_eq!(
            server.await.unwrap(),
            vec![
                ClientMessage::Ping,
                ClientMessage::PtyClose { terminal_id },
                ClientMessage::ListGroups,
            ]
        );
    }

    #[test]
    fn test_connection_state_equality() {
        assert_eq!(ConnectionState::Disconnected, ConnectionState::Disconnected);
        assert_ne!(ConnectionState::Disconnected, ConnectionState::Connected);
        assert_ne!(ConnectionState::Connecting, ConnectionState::Reconnecting);
    }
}

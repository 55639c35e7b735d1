//! Auto-start for the termdeck server
//!
//! Running the client starts the server daemon when its socket is not
//! reachable. Only local (Unix socket) addresses are started; a TCP address
//! points at a server someone else runs.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use termdeck_utils::{Result, TermdeckError};

use crate::sync::ServerAddr;

#[derive(Debug, Clone)]
pub struct AutoStartConfig {
    pub enabled: bool,
    /// Timeout for waiting for server to start (milliseconds)
    pub timeout_ms: u64,
    /// Delay between connection retries (milliseconds)
    pub retry_delay_ms: u64,
    /// Initial delay after spawning server (milliseconds)
    pub initial_delay_ms: u64,
}

impl Default for AutoStartConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: 2000,
            retry_delay_ms: 200,
            initial_delay_ms: 100,
        }
    }
}

const SERVER_BINARY_NAME: &str = "termdeck-server";

/// Find the termdeck-server binary
///
/// Looks next to the current executable first, then on `PATH`.
pub fn find_server_binary() -> Result<PathBuf> {
    if let Ok(current_exe) = std::env::current_exe() {
        if let Some(parent) = current_exe.parent() {
            let server_path = parent.join(SERVER_BINARY_NAME);
            if server_path.is_file() {
                tracing::debug!("Found server binary at: {:?}", server_path);
                return Ok(server_path);
            }
        }
    }

    if let Ok(path) = which::which(SERVER_BINARY_NAME) {
        tracing::debug!("Found server binary in PATH: {:?}", path);
        return Ok(path);
    }

    Err(TermdeckError::Internal(format!(
        "{} binary not found. Ensure it's in the same directory as termdeck or in your PATH.",
        SERVER_BINARY_NAME
    )))
}

/// Start the server detached from this process, listening on `socket`
pub fn start_server_daemon(socket: &Path) -> Result<()> {
    let server_path = find_server_binary()?;

    tracing::info!("Starting server daemon: {:?}", server_path);

    Command::new(&server_path)
        .arg("--socket")
        .arg(socket)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| {
            TermdeckError::ProcessSpawn(format!(
                "Failed to start {}: {}. Check that the binary is executable.",
                SERVER_BINARY_NAME, e
            ))
        })?;

    tracing::info!("Server daemon started");
    Ok(())
}

/// Whether an error means "nobody is listening", which auto-start can fix
pub fn is_server_not_running(error: &TermdeckError) -> bool {
    match error {
        TermdeckError::ServerNotRunning { .. } => true,
        TermdeckError::Io(source) | TermdeckError::Connect { source, .. } => matches!(
            source.kind(),
            ErrorKind::NotFound | ErrorKind::ConnectionRefused
        ),
        _ => false,
    }
}

/// Check if the server socket exists and accepts connections
pub async fn check_server_available(socket: &Path) -> bool {
    if !socket.exists() {
        return false;
    }
    tokio::net::UnixStream::connect(socket).await.is_ok()
}

/// Wait for the server socket to accept connections
pub async fn wait_for_server(socket: &Path, config: &AutoStartConfig) -> Result<()> {
    let start = Instant::now();
    let timeout = Duration::from_millis(config.timeout_ms);
    let retry_delay = Duration::from_millis(config.retry_delay_ms);

    tokio::time::sleep(Duration::from_millis(config.initial_delay_ms)).await;

    loop {
        if check_server_available(socket).await {
            tracing::debug!("Server is available after {:?}", start.elapsed());
            return Ok(());
        }

        if start.elapsed() >= timeout {
            return Err(TermdeckError::ConnectionTimeout {
                seconds: config.timeout_ms.div_ceil(1000),
            });
        }

        tokio::time::sleep(retry_delay).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStartResult {
    AlreadyRunning,
    /// Started by this client
    Started,
    /// Not running and not started (disabled or remote address)
    NotRunning,
}

/// Ensure the server behind `addr` is running, starting it if allowed
pub async fn ensure_server_running(
    addr: &ServerAddr,
    config: &AutoStartConfig,
) -> Result<ServerStartResult> {
    let ServerAddr::Unix(socket) = addr else {
        return Ok(ServerStartResult::NotRunning);
    };

    if check_server_available(socket).await {
        return Ok(ServerStartResult::AlreadyRunning);
    }

    if !config.enabled {
        return Ok(ServerStartResult::NotRunning);
    }

    start_server_daemon(socket)?;
    wait_for_server(socket, config).await?;

    Ok(ServerStartResult::Started)
}

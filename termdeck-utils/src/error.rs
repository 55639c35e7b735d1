//! Error types for termdeck
//!
//! One error type shared by the server, the client and the protocol crate.
//! Connection failures keep their `io::Error` so callers can tell a server
//! that is still starting from an address that will never work.

use std::io::ErrorKind;
use std::path::PathBuf;

/// Main error type for termdeck operations
#[derive(Debug, thiserror::Error)]
pub enum TermdeckError {
    // === IO Errors ===

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // === Connection Errors ===

    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Server not running at {path}")]
    ServerNotRunning { path: PathBuf },

    #[error("Connection timeout after {seconds}s")]
    ConnectionTimeout { seconds: u64 },

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    // === Configuration Errors ===

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    // === Console Errors ===

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Group not found: {0}")]
    GroupNotFound(String),

    #[error("Terminal not found: {0}")]
    TerminalNotFound(String),

    // === PTY Errors ===

    #[error("PTY error: {0}")]
    Pty(String),

    #[error("Failed to spawn process: {0}")]
    ProcessSpawn(String),

    // === Persistence Errors ===

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Archive request failed: {0}")]
    Archive(String),

    // === Internal Errors ===

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TermdeckError {
    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a PTY error
    pub fn pty(msg: impl Into<String>) -> Self {
        Self::Pty(msg.into())
    }

    /// Create a persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create an archive collaborator error
    pub fn archive(msg: impl Into<String>) -> Self {
        Self::Archive(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether connecting again later can succeed
    ///
    /// A missing socket, a refused or dropped connection and timeouts are
    /// transient. A malformed address or a socket we may not open is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connect { source, .. } | Self::Io(source) => matches!(
                source.kind(),
                ErrorKind::NotFound
                    | ErrorKind::ConnectionRefused
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::TimedOut
                    | ErrorKind::Interrupted
            ),
            Self::ServerNotRunning { .. }
            | Self::ConnectionTimeout { .. }
            | Self::ConnectionClosed => true,
            _ => false,
        }
    }
}

/// Result type alias using TermdeckError
pub type Result<T> = std::result::Result<T, TermdeckError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TermdeckError::SessionNotFound("test".into());
        assert_eq!(err.to_string(), "Session not found: test");
    }

    #[test]
    fn test_error_display_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = TermdeckError::Io(io_err);
        assert!(err.to_string().contains("IO error"));
    }

    #[test]
    fn test_error_display_file_write() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "permission denied");
        let err = TermdeckError::FileWrite {
            path: PathBuf::from("/root/sessions.json"),
            source: io_err,
        };
        let msg = err.to_string();
        assert!(msg.contains("Failed to write file"));
        assert!(msg.contains("/root/sessions.json"));
    }

    #[test]
    fn test_error_display_server_not_running() {
        let err = TermdeckError::ServerNotRunning {
            path: PathBuf::from("/tmp/termdeck.sock"),
        };
        let msg = err.to_string();
        assert!(msg.contains("Server not running"));
        assert!(msg.contains("/tmp/termdeck.sock"));
    }

    #[test]
    fn test_error_display_connect() {
        let err = TermdeckError::Connect {
            addr: "tcp://10.0.0.5:7878".into(),
            source: std::io::Error::new(ErrorKind::ConnectionRefused, "refused"),
        };
        assert_eq!(err.to_string(), "Failed to connect to tcp://10.0.0.5:7878: refused");
    }

    #[test]
    fn test_error_display_terminal_not_found() {
        let err = TermdeckError::TerminalNotFound("abc-123".into());
        assert_eq!(err.to_string(), "Terminal not found: abc-123");
    }

    #[test]
    fn test_error_display_archive() {
        let err = TermdeckError::archive("HTTP 500");
        assert_eq!(err.to_string(), "Archive request failed: HTTP 500");
    }

    #[test]
    fn test_error_display_process_spawn() {
        let err = TermdeckError::ProcessSpawn("command not found".into());
        assert_eq!(err.to_string(), "Failed to spawn process: command not found");
    }

    #[test]
    fn test_retryable() {
        let connect = |kind| TermdeckError::Connect {
            addr: "unix:///tmp/termdeck.sock".into(),
            source: std::io::Error::new(kind, "connect"),
        };
        assert!(connect(ErrorKind::ConnectionRefused).is_retryable());
        assert!(connect(ErrorKind::NotFound).is_retryable());
        assert!(!connect(ErrorKind::PermissionDenied).is_retryable());
        assert!(!connect(ErrorKind::InvalidInput).is_retryable());

        assert!(TermdeckError::ServerNotRunning {
            path: PathBuf::from("/tmp/termdeck.sock")
        }
        .is_retryable());
        assert!(TermdeckError::ConnectionTimeout { seconds: 5 }.is_retryable());
        assert!(TermdeckError::ConnectionClosed.is_retryable());

        // Bad addresses and domain failures never heal by themselves
        assert!(!TermdeckError::Connection("Missing port in TCP URL".into()).is_retryable());
        assert!(!TermdeckError::SessionNotFound("x".into()).is_retryable());
        assert!(!TermdeckError::pty("boom").is_retryable());
    }

    #[test]
    fn test_from_io_error() {
        fn fails() -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "nope"))?;
            Ok(())
        }
        assert!(matches!(fails(), Err(TermdeckError::Io(_))));
    }
}

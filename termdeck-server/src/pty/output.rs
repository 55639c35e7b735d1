//! PTY output polling
//!
//! Each terminal gets a poller task that reads process output, batches it,
//! appends it to the terminal's log when capture is on, and delivers it to the
//! connection that currently owns the terminal. When the process ends the
//! poller reaps it and reports the exit.

use std::fs::File;
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use termdeck_protocol::{ServerMessage, TerminalId};

use super::PtyHandle;
use crate::registry::ClientSender;

/// Default buffer flush timeout in milliseconds
const DEFAULT_FLUSH_TIMEOUT_MS: u64 = 50;

/// Default maximum buffer size before forced flush
const DEFAULT_MAX_BUFFER_SIZE: usize = 16384;

/// Read buffer size for PTY reads
const READ_BUFFER_SIZE: usize = 4096;

/// errno for I/O error (same value on Linux and macOS)
const EIO: i32 = 5;

/// Configuration for the output poller
#[derive(Debug, Clone)]
pub struct OutputPollerConfig {
    /// Timeout before flushing buffered output (default: 50ms)
    pub flush_timeout: Duration,
    /// Maximum buffer size before forced flush (default: 16KB)
    pub max_buffer_size: usize,
}

impl Default for OutputPollerConfig {
    fn default() -> Self {
        Self {
            flush_timeout: Duration::from_millis(DEFAULT_FLUSH_TIMEOUT_MS),
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
        }
    }
}

/// Destination for a terminal's events
///
/// Reclaiming a terminal from a new connection rebinds the sink; output
/// produced while no live connection owns the terminal is dropped.
#[derive(Clone, Default)]
pub struct OutputSink {
    inner: Arc<Mutex<Option<ClientSender>>>,
}

impl OutputSink {
    pub fn new(sender: ClientSender) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(sender))),
        }
    }

    /// Route future events to another connection
    pub fn rebind(&self, sender: ClientSender) {
        *self.inner.lock() = Some(sender);
    }

    /// Whether a connection currently owns the terminal
    pub fn is_bound(&self) -> bool {
        self.inner.lock().as_ref().is_some_and(|s| !s.is_closed())
    }

    /// Deliver a message to the owning connection
    pub async fn deliver(&self, message: ServerMessage) -> bool {
        let sender = match self.inner.lock().clone() {
            Some(sender) => sender,
            None => return false,
        };

        if sender.send(message).await.is_ok() {
            return true;
        }

        // Forget the dead channel unless it was already replaced
        let mut guard = self.inner.lock();
        if guard.as_ref().is_some_and(|s| s.same_channel(&sender)) {
            *guard = None;
        }
        false
    }
}

impl std::fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSink")
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// Called once when the process output ends; removes the process from the
/// manager if it is still the registered one
pub type ReapHook = Box<dyn FnOnce() + Send>;

/// Handle for managing a running PTY output poller
#[derive(Debug)]
pub struct PollerHandle {
    /// Token to cancel the poller
    pub cancel_token: CancellationToken,
    /// Handle to the spawned task
    pub join_handle: JoinHandle<()>,
}

impl PollerHandle {
    /// Cancel the poller without waiting
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }
}

/// PTY output poller for one terminal
pub struct PtyOutputPoller {
    terminal_id: TerminalId,
    handle: PtyHandle,
    sink: OutputSink,
    log: Option<File>,
    reap: Option<ReapHook>,
    buffer: Vec<u8>,
    config: OutputPollerConfig,
    cancel_token: CancellationToken,
    last_data_time: Instant,
}

impl PtyOutputPoller {
    /// Spawn a poller for a terminal
    pub fn spawn(
        terminal_id: TerminalId,
        handle: PtyHandle,
        sink: OutputSink,
        log: Option<File>,
        reap: ReapHook,
    ) -> PollerHandle {
        Self::spawn_with_config(
            terminal_id,
            handle,
            sink,
            log,
            reap,
            OutputPollerConfig::default(),
        )
    }

    /// Spawn a poller with custom configuration
    pub fn spawn_with_config(
        terminal_id: TerminalId,
        handle: PtyHandle,
        sink: OutputSink,
        log: Option<File>,
        reap: ReapHook,
        config: OutputPollerConfig,
    ) -> PollerHandle {
        let cancel_token = CancellationToken::new();
        let poller = Self {
            terminal_id,
            handle,
            sink,
            log,
            reap: Some(reap),
            buffer: Vec::with_capacity(config.max_buffer_size),
            config,
            cancel_token: cancel_token.clone(),
            last_data_time: Instant::now(),
        };

        let join_handle = tokio::spawn(poller.run());

        PollerHandle {
            cancel_token,
            join_handle,
        }
    }

    async fn run(mut self) {
        info!(terminal_id = %self.terminal_id, "PTY output poller started");

        let (data_tx, mut data_rx) = mpsc::channel::<ReadResult>(16);

        let reader = self.handle.reader();
        let reader_cancel = self.cancel_token.clone();
        let terminal_id = self.terminal_id;
        tokio::spawn(async move {
            Self::blocking_reader_task(reader, data_tx, reader_cancel, terminal_id).await;
        });

        let mut flush_interval = interval(self.config.flush_timeout);
        flush_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut cancelled = false;
        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    debug!(terminal_id = %self.terminal_id, "Poller cancelled");
                    cancelled = true;
                    break;
                }

                result = data_rx.recv() => {
                    match result {
                        Some(ReadResult::Data(data)) => self.handle_output(&data).await,
                        Some(ReadResult::Eof) => {
                            debug!(terminal_id = %self.terminal_id, "PTY EOF");
                            break;
                        }
                        Some(ReadResult::Error(e)) => {
                            error!(terminal_id = %self.terminal_id, error = %e, "PTY read error");
                            break;
                        }
                        None => {
                            debug!(terminal_id = %self.terminal_id, "Reader channel closed");
                            break;
                        }
                    }
                }

                _ = flush_interval.tick() => {
                    if self.should_flush_timeout() {
                        self.flush().await;
                    }
                }
            }
        }

        self.flush().await;

        if !cancelled {
            self.report_exit().await;
        }

        info!(terminal_id = %self.terminal_id, "PTY output poller exiting");
    }

    /// Reap the process and tell the owning connection it exited
    async fn report_exit(&mut self) {
        if let Some(reap) = self.reap.take() {
            reap();
        }

        let handle = self.handle.clone();
        let exit_code = match tokio::task::spawn_blocking(move || handle.wait_exit()).await {
            Ok(Ok(code)) => Some(code),
            Ok(Err(e)) => {
                warn!(terminal_id = %self.terminal_id, error = %e, "Failed to collect exit status");
                None
            }
            Err(e) => {
                warn!(terminal_id = %self.terminal_id, error = %e, "Exit status task failed");
                None
            }
        };

        info!(terminal_id = %self.terminal_id, ?exit_code, "Terminal process exited");
        self.sink
            .deliver(ServerMessage::PtyExit {
                terminal_id: self.terminal_id,
                exit_code,
            })
            .await;
    }

    async fn blocking_reader_task(
        reader: Arc<Mutex<Box<dyn Read + Send>>>,
        data_tx: mpsc::Sender<ReadResult>,
        cancel_token: CancellationToken,
        terminal_id: TerminalId,
    ) {
        loop {
            if cancel_token.is_cancelled() {
                trace!(terminal_id = %terminal_id, "Blocking reader cancelled");
                break;
            }

            let reader_clone = reader.clone();
            let result = tokio::task::spawn_blocking(move || {
                let mut buf = [0u8; READ_BUFFER_SIZE];
                let mut reader_guard = reader_clone.lock();
                match reader_guard.read(&mut buf) {
                    Ok(0) => ReadResult::Eof,
                    Ok(n) => ReadResult::Data(buf[..n].to_vec()),
                    Err(e) => {
                        // EIO is how Linux reports a hung-up PTY master
                        if e.kind() == std::io::ErrorKind::BrokenPipe
                            || e.kind() == std::io::ErrorKind::UnexpectedEof
                            || e.raw_os_error() == Some(EIO)
                        {
                            ReadResult::Eof
                        } else {
                            ReadResult::Error(e.to_string())
                        }
                    }
                }
            })
            .await;

            match result {
                Ok(read_result) => {
                    let is_terminal = matches!(read_result, ReadResult::Eof | ReadResult::Error(_));

                    if data_tx.send(read_result).await.is_err() {
                        trace!(terminal_id = %terminal_id, "Data channel closed, reader exiting");
                        break;
                    }

                    if is_terminal {
                        break;
                    }
                }
                Err(e) => {
                    warn!(terminal_id = %terminal_id, error = %e, "spawn_blocking failed");
                    let _ = data_tx.send(ReadResult::Error(e.to_string())).await;
                    break;
                }
            }
        }
    }

    async fn handle_output(&mut self, data: &[u8]) {
        if let Some(log) = self.log.as_mut() {
            if let Err(e) = log.write_all(data) {
                warn!(terminal_id = %self.terminal_id, error = %e, "Log capture failed, disabling");
                self.log = None;
            }
        }

        self.buffer.extend_from_slice(data);
        self.last_data_time = Instant::now();

        trace!(
            terminal_id = %self.terminal_id,
            bytes = data.len(),
            buffer_size = self.buffer.len(),
            "Received PTY output"
        );

        if self.should_flush() {
            self.flush().await;
        }
    }

    fn should_flush(&self) -> bool {
        self.buffer.len() >= self.config.max_buffer_size || self.buffer.contains(&b'\n')
    }

    fn should_flush_timeout(&self) -> bool {
        !self.buffer.is_empty() && self.last_data_time.elapsed() >= self.config.flush_timeout
    }

    async fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }

        let data = std::mem::replace(
            &mut self.buffer,
            Vec::with_capacity(self.config.max_buffer_size),
        );

        let delivered = self
            .sink
            .deliver(ServerMessage::PtyOutput {
                terminal_id: self.terminal_id,
                data,
            })
            .await;

        if !delivered {
            trace!(terminal_id = %self.terminal_id, "No connection owns terminal, output dropped");
        }
    }
}

#[derive(Debug)]
enum ReadResult {
    Data(Vec<u8>),
    Eof,
    Error(String),
}

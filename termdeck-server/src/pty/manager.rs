//! PTY manager for spawning and tracking terminal processes

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use tracing::{debug, info, warn};

use termdeck_protocol::TerminalId;
use termdeck_utils::{Result, TermdeckError};

use super::cwd::probe_process_cwd;
use super::output::{OutputSink, PollerHandle, PtyOutputPoller, ReapHook};
use super::{CreateOutcome, SpawnSpec, PtyHandle, TerminalHost};
use crate::registry::ClientSender;

/// A running terminal process and its bookkeeping
struct PtyProcess {
    handle: PtyHandle,
    sink: OutputSink,
    poller: PollerHandle,
    tracked_cwd: Option<String>,
    /// Distinguishes this process from a later one spawned under the same id
    generation: u64,
}

impl PtyProcess {
    fn is_alive(&self) -> bool {
        self.handle.is_running()
    }
}

type ProcessTable = Mutex<HashMap<TerminalId, PtyProcess>>;

/// Manages terminal processes by id
pub struct PtyManager {
    processes: Arc<ProcessTable>,
    log_dir: PathBuf,
    next_generation: AtomicU64,
}

impl PtyManager {
    /// Create a manager writing captured output under `log_dir`
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            processes: Arc::new(Mutex::new(HashMap::new())),
            log_dir: log_dir.into(),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Path of the output capture file for a terminal
    pub fn log_path(&self, terminal_id: TerminalId) -> PathBuf {
        self.log_dir.join(format!("{}.log", terminal_id))
    }

    /// Ids of all tracked processes
    pub fn terminal_ids(&self) -> Vec<TerminalId> {
        self.processes.lock().keys().copied().collect()
    }

    /// Get count of tracked processes
    pub fn count(&self) -> usize {
        self.processes.lock().len()
    }

    /// Kill every process (server shutdown)
    pub fn close_all(&self) {
        let drained: Vec<(TerminalId, PtyProcess)> = self.processes.lock().drain().collect();
        for (terminal_id, process) in drained {
            process.poller.cancel();
            if let Err(e) = process.handle.terminate() {
                debug!(terminal_id = %terminal_id, error = %e, "Kill during shutdown failed");
            }
        }
    }

    fn spawn_process(
        &self,
        terminal_id: TerminalId,
        spec: SpawnSpec,
        sender: ClientSender,
    ) -> Result<PtyProcess> {
        let pair = native_pty_system()
            .openpty(PtySize {
                rows: spec.rows,
                cols: spec.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| TermdeckError::pty(format!("Failed to open PTY: {}", e)))?;

        let mut cmd = CommandBuilder::new(&spec.program);
        cmd.args(&spec.args);
        if let Some(cwd) = &spec.cwd {
            cmd.cwd(cwd);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let child = pair.slave.spawn_command(cmd).map_err(|e| {
            TermdeckError::ProcessSpawn(format!("{}: {}", spec.display_command(), e))
        })?;

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| TermdeckError::pty(format!("Failed to clone reader: {}", e)))?;

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| TermdeckError::pty(format!("Failed to get writer: {}", e)))?;

        let handle = PtyHandle::new(pair.master, child, reader, writer);

        let log = if spec.logging {
            match open_capture(&self.log_dir, &self.log_path(terminal_id)) {
                Ok(file) => Some(file),
                Err(e) => {
                    warn!(terminal_id = %terminal_id, error = %e, "Output capture unavailable");
                    None
                }
            }
        } else {
            None
        };

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let sink = OutputSink::new(sender);
        let poller = PtyOutputPoller::spawn(
            terminal_id,
            handle.clone(),
            sink.clone(),
            log,
            reap_hook(Arc::downgrade(&self.processes), terminal_id, generation),
        );

        info!(
            terminal_id = %terminal_id,
            pid = ?handle.process_id(),
            command = %spec.display_command(),
            logging = spec.logging,
            "Spawned terminal process"
        );

        Ok(PtyProcess {
            handle,
            sink,
            poller,
            tracked_cwd: spec.cwd.map(|p| p.to_string_lossy().into_owned()),
            generation,
        })
    }

    fn with_process<T>(
        &self,
        terminal_id: TerminalId,
        f: impl FnOnce(&PtyProcess) -> Result<T>,
    ) -> Result<T> {
        let processes = self.processes.lock();
        match processes.get(&terminal_id) {
            Some(process) => f(process),
            None => Err(TermdeckError::TerminalNotFound(terminal_id.to_string())),
        }
    }
}

/// Removes the process from the table when its output ends, unless a newer
/// process already took over the id
fn reap_hook(table: Weak<ProcessTable>, terminal_id: TerminalId, generation: u64) -> ReapHook {
    Box::new(move || {
        let Some(table) = table.upgrade() else {
            return;
        };
        let mut processes = table.lock();
        if processes
            .get(&terminal_id)
            .is_some_and(|p| p.generation == generation)
        {
            processes.remove(&terminal_id);
            debug!(terminal_id = %terminal_id, "Reaped terminal process");
        }
    })
}

fn open_capture(dir: &Path, path: &Path) -> std::io::Result<File> {
    std::fs::create_dir_all(dir)?;
    OpenOptions::new().create(true).append(true).open(path)
}

#[async_trait]
impl TerminalHost for PtyManager {
    fn has(&self, terminal_id: TerminalId) -> bool {
        self.processes
            .lock()
            .get(&terminal_id)
            .is_some_and(PtyProcess::is_alive)
    }

    fn create(
        &self,
        terminal_id: TerminalId,
        spec: SpawnSpec,
        sender: ClientSender,
    ) -> Result<CreateOutcome> {
        let mut processes = self.processes.lock();

        if let Some(process) = processes.get(&terminal_id) {
            if process.is_alive() {
                process.sink.rebind(sender);
                info!(terminal_id = %terminal_id, "Reclaimed terminal process");
                return Ok(CreateOutcome { reclaimed: true });
            }
            // Exited but not yet reaped; replace it
            if let Some(stale) = processes.remove(&terminal_id) {
                stale.poller.cancel();
            }
        }

        let process = self.spawn_process(terminal_id, spec, sender)?;
        processes.insert(terminal_id, process);
        Ok(CreateOutcome { reclaimed: false })
    }

    fn reclaim_for_client(&self, terminal_id: TerminalId, sender: ClientSender) -> bool {
        let processes = self.processes.lock();
        match processes.get(&terminal_id) {
            Some(process) if process.is_alive() => {
                process.sink.rebind(sender);
                true
            }
            _ => false,
        }
    }

    fn write(&self, terminal_id: TerminalId, data: &[u8]) -> Result<()> {
        let handle = self.with_process(terminal_id, |p| Ok(p.handle.clone()))?;
        handle.write_all(data)
    }

    fn resize(&self, terminal_id: TerminalId, cols: u16, rows: u16) -> Result<()> {
        self.with_process(terminal_id, |p| p.handle.resize(cols, rows))
    }

    fn close(&self, terminal_id: TerminalId) -> Result<()> {
        // The poller keeps running until EOF so the owner still gets PtyExit
        let removed = self.processes.lock().remove(&terminal_id);
        match removed {
            Some(process) => {
                info!(terminal_id = %terminal_id, "Closing terminal process");
                process.handle.terminate()
            }
            None => {
                debug!(terminal_id = %terminal_id, "Close for unknown terminal ignored");
                Ok(())
            }
        }
    }

    fn tracked_cwd(&self, terminal_id: TerminalId) -> Option<String> {
        self.processes
            .lock()
            .get(&terminal_id)
            .and_then(|p| p.tracked_cwd.clone())
    }

    fn set_tracked_cwd(&self, terminal_id: TerminalId, cwd: String) {
        if let Some(process) = self.processes.lock().get_mut(&terminal_id) {
            process.tracked_cwd = Some(cwd);
        }
    }

    async fn resolve_runtime_cwd(&self, terminal_id: TerminalId) -> Option<String> {
        let pid = self
            .processes
            .lock()
            .get(&terminal_id)
            .and_then(|p| p.handle.process_id())?;
        probe_process_cwd(pid).await
    }

    async fn read_log(&self, terminal_id: TerminalId) -> Result<Vec<u8>> {
        let path = self.log_path(terminal_id);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(TermdeckError::TerminalNotFound(terminal_id.to_string()))
            }
            Err(e) => Err(TermdeckError::FileRead { path, source: e }),
        }
    }
}

impl Drop for PtyManager {
    fn drop(&mut self) {
        self.close_all();
    }
}

impl std::fmt::Debug for PtyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtyManager")
            .field("count", &self.count())
            .field("log_dir", &self.log_dir)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use termdeck_protocol::ServerMessage;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn manager() -> (PtyManager, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (PtyManager::new(dir.path().join("pty-logs")), dir)
    }

    async fn recv_until<F>(rx: &mut mpsc::Receiver<ServerMessage>, mut pred: F) -> ServerMessage
    where
        F: FnMut(&ServerMessage) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let msg = rx.recv().await.expect("channel closed");
                if pred(&msg) {
                    return msg;
                }
            }
        })
        .await
        .expect("timed out waiting for message")
    }

    #[tokio::test]
    async fn test_manager_new() {
        let (manager, _dir) = manager();
        assert_eq!(manager.count(), 0);
        assert!(!manager.has(Uuid::new_v4()));
    }

    #[tokio::test]
    async fn test_create_then_reclaim() {
        let (manager, _dir) = manager();
        let id = Uuid::new_v4();
        let (tx1, _rx1) = mpsc::channel(64);
        let (tx2, _rx2) = mpsc::channel(64);

        let first = manager.create(id, SpawnSpec::new("cat"), tx1).unwrap();
        assert!(!first.reclaimed);
        assert!(manager.has(id));

        let second = manager.create(id, SpawnSpec::new("cat"), tx2).unwrap();
        assert!(second.reclaimed);
        assert_eq!(manager.count(), 1);

        manager.close(id).unwrap();
        assert!(!manager.has(id));
    }

    #[tokio::test]
    async fn test_output_follows_reclaim() {
        let (manager, _dir) = manager();
        let id = Uuid::new_v4();
        let (tx1, _rx1) = mpsc::channel(64);
        let (tx2, mut rx2) = mpsc::channel(64);

        manager.create(id, SpawnSpec::new("cat"), tx1).unwrap();
        assert!(manager.reclaim_for_client(id, tx2));

        manager.write(id, b"reclaimed\n").unwrap();
        let msg = recv_until(&mut rx2, |m| {
            matches!(m, ServerMessage::PtyOutput { data, .. }
                if String::from_utf8_lossy(data).contains("reclaimed"))
        })
        .await;
        assert_eq!(msg.terminal_id(), Some(id));

        manager.close(id).unwrap();
    }

    #[tokio::test]
    async fn test_exit_reported_and_reaped() {
        let (manager, _dir) = manager();
        let id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(64);

        let spec = SpawnSpec::new("sh").arg("-c").arg("exit 3");
        manager.create(id, spec, tx).unwrap();

        let msg = recv_until(&mut rx, |m| matches!(m, ServerMessage::PtyExit { .. })).await;
        assert_eq!(
            msg,
            ServerMessage::PtyExit {
                terminal_id: id,
                exit_code: Some(3)
            }
        );
        assert!(!manager.has(id));
        assert_eq!(manager.count(), 0);
    }

    #[tokio::test]
    async fn test_close_unknown_is_ok() {
        let (manager, _dir) = manager();
        assert!(manager.close(Uuid::new_v4()).is_ok());
    }

    #[tokio::test]
    async fn test_write_unknown_terminal() {
        let (manager, _dir) = manager();
        let result = manager.write(Uuid::new_v4(), b"x");
        assert!(matches!(result, Err(TermdeckError::TerminalNotFound(_))));
    }

    #[tokio::test]
    async fn test_logging_captures_output() {
        let (manager, _dir) = manager();
        let id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(64);

        let spec = SpawnSpec::new("echo")
            .arg("captured-line")
            .capture(true);
        manager.create(id, spec, tx).unwrap();
        recv_until(&mut rx, |m| matches!(m, ServerMessage::PtyExit { .. })).await;

        let log = manager.read_log(id).await.unwrap();
        assert!(String::from_utf8_lossy(&log).contains("captured-line"));
    }

    #[tokio::test]
    async fn test_read_log_without_capture() {
        let (manager, _dir) = manager();
        let result = manager.read_log(Uuid::new_v4()).await;
        assert!(matches!(result, Err(TermdeckError::TerminalNotFound(_))));
    }

    #[tokio::test]
    async fn test_tracked_cwd_starts_at_spawn_cwd() {
        let (manager, dir) = manager();
        let id = Uuid::new_v4();
        let (tx, _rx) = mpsc::channel(64);

        let spec = SpawnSpec::new("cat").in_dir(dir.path());
        manager.create(id, spec, tx).unwrap();
        assert_eq!(
            manager.tracked_cwd(id),
            Some(dir.path().to_string_lossy().into_owned())
        );

        manager.set_tracked_cwd(id, "/tmp".into());
        assert_eq!(manager.tracked_cwd(id).as_deref(), Some("/tmp"));

        manager.close(id).unwrap();
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_resolve_runtime_cwd() {
        let (manager, dir) = manager();
        let id = Uuid::new_v4();
        let (tx, _rx) = mpsc::channel(64);

        manager
            .create(id, SpawnSpec::new("cat").in_dir(dir.path()), tx)
            .unwrap();
        let cwd = manager.resolve_runtime_cwd(id).await.unwrap();
        assert_eq!(
            std::fs::canonicalize(cwd).unwrap(),
            std::fs::canonicalize(dir.path()).unwrap()
        );
        assert!(manager.resolve_runtime_cwd(Uuid::new_v4()).await.is_none());

        manager.close(id).unwrap();
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let (manager, _dir) = manager();
        let (tx, _rx) = mpsc::channel(64);
        let result = manager.create(
            Uuid::new_v4(),
            SpawnSpec::new("/nonexistent/termdeck-no-such-binary"),
            tx,
        );
        assert!(result.is_err());
        assert_eq!(manager.count(), 0);
    }

    #[tokio::test]
    async fn test_close_all() {
        let (manager, _dir) = manager();
        let (tx, _rx) = mpsc::channel(64);
        manager
            .create(Uuid::new_v4(), SpawnSpec::new("cat"), tx.clone())
            .unwrap();
        manager
            .create(Uuid::new_v4(), SpawnSpec::new("cat"), tx)
            .unwrap();
        assert_eq!(manager.terminal_ids().len(), 2);

        manager.close_all();
        assert_eq!(manager.count(), 0);
    }
}

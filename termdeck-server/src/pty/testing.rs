//! Recording stand-in for the PTY manager

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use termdeck_protocol::TerminalId;
use termdeck_utils::{Result, TermdeckError};

use super::{CreateOutcome, SpawnSpec, TerminalHost};
use crate::registry::ClientSender;

#[derive(Default)]
pub struct FakeHost {
    pub live: Mutex<HashSet<TerminalId>>,
    pub creates: Mutex<Vec<(TerminalId, SpawnSpec)>>,
    pub writes: Mutex<Vec<(TerminalId, Vec<u8>)>>,
    pub closed: Mutex<Vec<TerminalId>>,
    pub tracked: Mutex<HashMap<TerminalId, String>>,
    pub logs: Mutex<HashMap<TerminalId, Vec<u8>>>,
    pub runtime_cwd: Mutex<Option<String>>,
    pub probe_count: AtomicUsize,
    pub fail_spawn: AtomicBool,
}

impl FakeHost {
    pub fn add_live(&self, terminal_id: TerminalId) {
        self.live.lock().insert(terminal_id);
    }

    pub fn set_tracked(&self, terminal_id: TerminalId, cwd: &str) {
        self.tracked.lock().insert(terminal_id, cwd.to_string());
    }

    pub fn set_runtime_cwd(&self, cwd: &str) {
        *self.runtime_cwd.lock() = Some(cwd.to_string());
    }

    fn require_live(&self, terminal_id: TerminalId) -> Result<()> {
        if self.live.lock().contains(&terminal_id) {
            Ok(())
        } else {
            Err(TermdeckError::TerminalNotFound(terminal_id.to_string()))
        }
    }
}

#[async_trait]
impl TerminalHost for FakeHost {
    fn has(&self, terminal_id: TerminalId) -> bool {
        self.live.lock().contains(&terminal_id)
    }

    fn create(
        &self,
        terminal_id: TerminalId,
        spec: SpawnSpec,
        _sender: ClientSender,
    ) -> Result<CreateOutcome> {
        let mut live = self.live.lock();
        if live.contains(&terminal_id) {
            return Ok(CreateOutcome { reclaimed: true });
        }
        if self.fail_spawn.load(Ordering::SeqCst) {
            return Err(TermdeckError::ProcessSpawn("fake failure".into()));
        }
        live.insert(terminal_id);
        self.creates.lock().push((terminal_id, spec));
        Ok(CreateOutcome { reclaimed: false })
    }

    fn reclaim_for_client(&self, terminal_id: TerminalId, _sender: ClientSender) -> bool {
        self.has(terminal_id)
    }

    fn write(&self, terminal_id: TerminalId, data: &[u8]) -> Result<()> {
        self.require_live(terminal_id)?;
        self.writes.lock().push((terminal_id, data.to_vec()));
        Ok(())
    }

    fn resize(&self, terminal_id: TerminalId, _cols: u16, _rows: u16) -> Result<()> {
        self.require_live(terminal_id)
    }

    fn close(&self, terminal_id: TerminalId) -> Result<()> {
        self.live.lock().remove(&terminal_id);
        self.closed.lock().push(terminal_id);
        Ok(())
    }

    fn tracked_cwd(&self, terminal_id: TerminalId) -> Option<String> {
        self.tracked.lock().get(&terminal_id).cloned()
    }

    fn set_tracked_cwd(&self, terminal_id: TerminalId, cwd: String) {
        self.tracked.lock().insert(terminal_id, cwd);
    }

    async fn resolve_runtime_cwd(&self, _terminal_id: TerminalId) -> Option<String> {
        self.probe_count.fetch_add(1, Ordering::SeqCst);
        self.runtime_cwd.lock().clone()
    }

    async fn read_log(&self, terminal_id: TerminalId) -> Result<Vec<u8>> {
        self.logs
            .lock()
            .get(&terminal_id)
            .cloned()
            .ok_or_else(|| TermdeckError::TerminalNotFound(terminal_id.to_string()))
    }
}

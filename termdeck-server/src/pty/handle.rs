//! Shared handle to one spawned terminal process

use std::io::{Read, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use portable_pty::{Child, MasterPty, PtySize};
use termdeck_utils::{Result, TermdeckError};

pub(crate) type SharedReader = Arc<Mutex<Box<dyn Read + Send>>>;

struct Parts {
    master: Mutex<Box<dyn MasterPty + Send>>,
    child: Mutex<Box<dyn Child + Send + Sync>>,
    reader: SharedReader,
    writer: Mutex<Box<dyn Write + Send>>,
    pid: Option<u32>,
}

/// Cheap to clone; the output poller, the manager and the exit reaper each
/// hold one.
#[derive(Clone)]
pub struct PtyHandle {
    parts: Arc<Parts>,
}

fn pty_error(action: &str, e: impl std::fmt::Display) -> TermdeckError {
    TermdeckError::pty(format!("{} failed: {}", action, e))
}

impl PtyHandle {
    pub(crate) fn new(
        master: Box<dyn MasterPty + Send>,
        child: Box<dyn Child + Send + Sync>,
        reader: Box<dyn Read + Send>,
        writer: Box<dyn Write + Send>,
    ) -> Self {
        let pid = child.process_id();
        Self {
            parts: Arc::new(Parts {
                master: Mutex::new(master),
                child: Mutex::new(child),
                reader: Arc::new(Mutex::new(reader)),
                writer: Mutex::new(writer),
                pid,
            }),
        }
    }

    pub fn process_id(&self) -> Option<u32> {
        self.parts.pid
    }

    /// Write and flush, so keystrokes reach the process immediately
    pub fn write_all(&self, data: &[u8]) -> Result<()> {
        let mut writer = self.parts.writer.lock();
        writer
            .write_all(data)
            .and_then(|()| writer.flush())
            .map_err(|e| pty_error("Write", e))
    }

    pub fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        let size = PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        };
        self.parts
            .master
            .lock()
            .resize(size)
            .map_err(|e| pty_error("Resize", e))
    }

    /// True while the child has not exited
    pub fn is_running(&self) -> bool {
        matches!(self.parts.child.lock().try_wait(), Ok(None))
    }

    /// Block until the child exits and return its exit code
    pub fn wait_exit(&self) -> Result<i32> {
        let status = self
            .parts
            .child
            .lock()
            .wait()
            .map_err(|e| pty_error("Wait", e))?;
        Ok(status.exit_code() as i32)
    }

    pub fn terminate(&self) -> Result<()> {
        self.parts
            .child
            .lock()
            .kill()
            .map_err(|e| pty_error("Kill", e))
    }

    pub(crate) fn reader(&self) -> SharedReader {
        Arc::clone(&self.parts.reader)
    }
}

impl std::fmt::Debug for PtyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtyHandle")
            .field("pid", &self.parts.pid)
            .finish_non_exhaustive()
    }
}

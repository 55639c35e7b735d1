//! Debounced working-directory probes
//!
//! After input containing a newline the shell may have changed directory.
//! A probe is scheduled after a short quiet period; a newer newline for the
//! same terminal cancels the pending one so bursts of input cost one probe.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use termdeck_protocol::{ServerMessage, TerminalId};

use crate::pty::TerminalHost;
use crate::registry::ClientSender;

/// Whether input bytes can have submitted a command line
pub fn submits_line(data: &[u8]) -> bool {
    data.iter().any(|&b| b == b'\r' || b == b'\n')
}

pub struct CwdProbeScheduler {
    debounce: Duration,
    pending: Mutex<HashMap<TerminalId, PendingProbe>>,
    next_seq: AtomicU64,
}

struct PendingProbe {
    seq: u64,
    token: CancellationToken,
}

impl CwdProbeScheduler {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            pending: Mutex::new(HashMap::new()),
            next_seq: AtomicU64::new(1),
        }
    }

    /// Schedule a probe for a terminal, replacing any pending one
    pub fn schedule(
        self: &Arc<Self>,
        terminal_id: TerminalId,
        host: Arc<dyn TerminalHost>,
        sender: ClientSender,
    ) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let previous = self.pending.lock().insert(
            terminal_id,
            PendingProbe {
                seq,
                token: token.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.token.cancel();
            trace!(terminal_id = %terminal_id, "Superseded pending cwd probe");
        }

        let scheduler = Arc::clone(self);
        let debounce = self.debounce;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(debounce) => {}
            }
            scheduler.finish(terminal_id, seq);

            let Some(cwd) = host.resolve_runtime_cwd(terminal_id).await else {
                debug!(terminal_id = %terminal_id, "cwd probe returned nothing");
                return;
            };

            if host.tracked_cwd(terminal_id).as_deref() == Some(cwd.as_str()) {
                return;
            }

            host.set_tracked_cwd(terminal_id, cwd.clone());
            debug!(terminal_id = %terminal_id, cwd = %cwd, "Working directory changed");
            if sender
                .send(ServerMessage::PtyCwdChange { terminal_id, cwd })
                .await
                .is_err()
            {
                debug!(terminal_id = %terminal_id, "Client gone, cwd change not delivered");
            }
        });
    }

    /// Drop any pending probe for a terminal
    pub fn cancel(&self, terminal_id: TerminalId) {
        if let Some(probe) = self.pending.lock().remove(&terminal_id) {
            probe.token.cancel();
        }
    }

    /// Drop every pending probe
    pub fn cancel_all(&self) {
        for (_, probe) in self.pending.lock().drain() {
            probe.token.cancel();
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Clear the pending entry unless a newer probe replaced it
    fn finish(&self, terminal_id: TerminalId, seq: u64) {
        let mut pending = self.pending.lock();
        if pending.get(&terminal_id).is_some_and(|p| p.seq == seq) {
            pending.remove(&terminal_id);
        }
    }
}

impl std::fmt::Debug for CwdProbeScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CwdProbeScheduler")
            .field("debounce", &self.debounce)
            .field("pending", &self.pending_count())
            .finish()
    }
}

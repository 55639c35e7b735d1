use termdeck_protocol::TerminalConnectivity;

use crate::layout::LayoutStore;
use crate::registry::{SessionRegistry, SessionStatus};

/// Correct persisted session bindings against the layout
///
/// The layout is authoritative for placement. A session is bound to the
/// terminal whose metadata names it, falling back to its persisted terminal
/// id when that terminal is still placed. Status becomes `Active` only for
/// a bound terminal that is still running. Returns how many sessions
/// changed.
pub fn reconcile_sessions(registry: &mut SessionRegistry, layout: &LayoutStore) -> usize {
    let ids: Vec<_> = registry.sessions_sorted().iter().map(|s| s.id).collect();
    let mut changed = 0;

    for id in ids {
        let Some(session) = registry.session_mut(id) else {
            continue;
        };

        let bound = layout
            .terminals()
            .find(|(_, meta)| meta.session_id == Some(id))
            .map(|(terminal_id, _)| *terminal_id)
            .or_else(|| {
                session
                    .terminal_id
                    .filter(|tid| layout.locate_terminal(*tid).is_some())
            });

        let before = session.clone();
        match bound {
            Some(terminal_id) => {
                session.terminal_id = Some(terminal_id);
                if let Some(group_id) = layout.group_of_terminal(terminal_id) {
                    session.group_id = Some(group_id);
                }
                let running = layout
                    .terminal_meta(terminal_id)
                    .is_some_and(|meta| meta.connectivity == TerminalConnectivity::Running);
                session.status = if running {
                    SessionStatus::Active
                } else {
                    SessionStatus::Idle
                };
            }
            None => {
                session.terminal_id = None;
                session.status = SessionStatus::Idle;
            }
        }

        if *session != before {
            changed += 1;
        }
    }

    if changed > 0 {
        tracing::debug!("Reconciled {} sessions against layout", changed);
    }
    changed
}

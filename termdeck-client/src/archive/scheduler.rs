//! Auto-archive planning
//!
//! Deciding what to archive is a pure function of the registry, the
//! threshold and the clock. The console runtime fires the checks and
//! executes the resulting plan.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use termdeck_protocol::{GroupId, SessionId};

use crate::registry::SessionRegistry;

/// Delay before the first check after mount
pub const INITIAL_CHECK_DELAY: Duration = Duration::from_secs(5);

/// Interval between checks
pub const CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Groups are left alone this long after mount
pub const GROUP_WARMUP: Duration = Duration::from_secs(60);

/// A group holding a session younger than this is still connecting
pub const RECENT_SESSION_GUARD: Duration = Duration::from_secs(5 * 60);

/// What one check decided to archive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchivePlan {
    /// Loose sessions, not covered by a planned group
    pub sessions: Vec<SessionId>,
    pub groups: Vec<GroupId>,
}

impl ArchivePlan {
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty() && self.groups.is_empty()
    }
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

/// Plan one auto-archive pass
///
/// `days == 0` disables archival. The active session and the active group
/// are never selected.
pub fn plan_archival(
    registry: &SessionRegistry,
    auto_archive_days: u32,
    now: DateTime<Utc>,
    mounted_at: DateTime<Utc>,
) -> ArchivePlan {
    let mut plan = ArchivePlan::default();
    if auto_archive_days == 0 {
        return plan;
    }

    let cutoff = now - chrono::Duration::days(i64::from(auto_archive_days));
    let warmed_up = now - mounted_at >= chrono_duration(GROUP_WARMUP);
    let recent_floor = now - chrono_duration(RECENT_SESSION_GUARD);

    if warmed_up {
        for group in registry.groups_sorted() {
            if registry.active_group() == Some(group.id) {
                continue;
            }
            let members = registry.sessions_in_group(group.id);
            let blocked = members.iter().any(|s| {
                s.is_shell() || !s.is_idle() || s.created_at > recent_floor
            });
            if blocked {
                tracing::trace!("Group {} not eligible for auto-archive", group.id);
                continue;
            }
            if group.last_activity_at < cutoff {
                plan.groups.push(group.id);
            }
        }
    }

    let planned_groups: HashSet<GroupId> = plan.groups.iter().copied().collect();
    for session in registry.sessions_sorted() {
        if registry.active_session() == Some(session.id) {
            continue;
        }
        if session
            .group_id
            .is_some_and(|g| planned_groups.contains(&g))
        {
            continue;
        }
        if session.is_idle() && !session.is_shell() && session.created_at < cutoff {
            plan.sessions.push(session.id);
        }
    }

    plan
}

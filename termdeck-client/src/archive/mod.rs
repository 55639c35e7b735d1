//! Archive collaborators and auto-archive planning

pub mod scheduler;
mod settings;
mod store;

pub use scheduler::{
    plan_archival, ArchivePlan, CHECK_INTERVAL, GROUP_WARMUP, INITIAL_CHECK_DELAY,
    RECENT_SESSION_GUARD,
};
pub use settings::{ArchiveThreshold, HttpSettingsSource, SettingsSource, StaticSettings};
pub use store::{ArchiveStore, ArchivedSession, HttpArchiveStore, MemoryArchiveStore};

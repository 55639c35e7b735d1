//! File-backed state namespaces
//!
//! Each namespace is a JSON file holding `{ "version": N, "data": ... }`.
//! Versions are independent: a mismatch discards only that namespace.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use termdeck_protocol::{GroupId, SessionId};
use termdeck_utils::{Result, TermdeckError};
use tracing::{debug, info, warn};

use crate::layout::LayoutStore;
use crate::registry::{ConsoleSession, SessionGroup, SessionRegistry};

pub const SESSIONS_FILE: &str = "sessions.json";
pub const ACTIVE_SESSION_FILE: &str = "active-session.json";
pub const GROUPS_FILE: &str = "groups.json";
pub const LAYOUT_FILE: &str = "layout.json";

pub const SESSIONS_VERSION: u32 = 1;
pub const ACTIVE_SESSION_VERSION: u32 = 1;
pub const GROUPS_VERSION: u32 = 1;
pub const LAYOUT_VERSION: u32 = 1;

#[derive(Serialize)]
struct Envelope<'a, T> {
    version: u32,
    data: &'a T,
}

#[derive(Deserialize)]
struct RawEnvelope {
    version: u32,
    data: serde_json::Value,
}

/// Persisted group namespace
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedGroups {
    groups: Vec<SessionGroup>,
    #[serde(default)]
    active_group: Option<GroupId>,
}

/// Local state directory
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Read a namespace; missing, unreadable or mismatched files yield `None`
    fn read<T: DeserializeOwned>(&self, name: &str, version: u32) -> Option<T> {
        let path = self.path(name);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                return None;
            }
        };

        let raw: RawEnvelope = match serde_json::from_str(&content) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Discarding corrupt {}: {}", path.display(), e);
                return None;
            }
        };

        if raw.version != version {
            warn!(
                "Discarding {} (version {}, expected {})",
                path.display(),
                raw.version,
                version
            );
            return None;
        }

        match serde_json::from_value(raw.data) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!("Discarding unreadable {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Write a namespace atomically via a temp file and rename
    fn write<T: Serialize>(&self, name: &str, version: u32, data: &T) -> Result<()> {
        termdeck_utils::ensure_dir(&self.dir).map_err(|source| TermdeckError::FileWrite {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.path(name);
        let temp_path = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(&Envelope { version, data })
            .map_err(|e| TermdeckError::persistence(format!("serialize {}: {}", name, e)))?;

        fs::write(&temp_path, json).map_err(|source| TermdeckError::FileWrite {
            path: temp_path.clone(),
            source,
        })?;
        fs::rename(&temp_path, &path).map_err(|source| TermdeckError::FileWrite {
            path: path.clone(),
            source,
        })?;

        debug!("Wrote {}", path.display());
        Ok(())
    }

    /// Load the session and group namespaces into a registry
    pub fn load_registry(&self) -> SessionRegistry {
        let sessions: Vec<ConsoleSession> = self.read(SESSIONS_FILE, SESSIONS_VERSION).unwrap_or_default();
        let active_session: Option<SessionId> = self
            .read(ACTIVE_SESSION_FILE, ACTIVE_SESSION_VERSION)
            .flatten();
        let groups: PersistedGroups = self.read(GROUPS_FILE, GROUPS_VERSION).unwrap_or_default();

        info!(
            "Loaded {} sessions and {} groups from {}",
            sessions.len(),
            groups.groups.len(),
            self.dir.display()
        );

        SessionRegistry::from_parts(
            sessions.into_iter().map(|s| (s.id, s)).collect::<HashMap<_, _>>(),
            groups.groups.into_iter().map(|g| (g.id, g)).collect::<HashMap<_, _>>(),
            active_session,
            groups.active_group,
        )
    }

    /// Write the session, active-session and group namespaces
    pub fn save_registry(&self, registry: &SessionRegistry) -> Result<()> {
        let sessions: Vec<&ConsoleSession> = registry.sessions_sorted();
        self.write(SESSIONS_FILE, SESSIONS_VERSION, &sessions)?;
        self.write(
            ACTIVE_SESSION_FILE,
            ACTIVE_SESSION_VERSION,
            &registry.active_session(),
        )?;
        let groups = PersistedGroups {
            groups: registry.groups_sorted().into_iter().cloned().collect(),
            active_group: registry.active_group(),
        };
        self.write(GROUPS_FILE, GROUPS_VERSION, &groups)
    }

    pub fn load_layout(&self) -> Option<LayoutStore> {
        self.read(LAYOUT_FILE, LAYOUT_VERSION)
    }

    pub fn save_layout(&self, layout: &LayoutStore) -> Result<()> {
        self.write(LAYOUT_FILE, LAYOUT_VERSION, layout)
    }

    /// Replace every namespace with empty state
    pub fn write_empty(&self) -> Result<()> {
        self.save_registry(&SessionRegistry::new())?;
        self.save_layout(&LayoutStore::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{Orientation, TerminalMeta};
    use crate::registry::SessionKind;
    use chrono::Utc;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn create_test_store() -> (TempDir, StateStore) {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path().join("state"));
        (dir, store)
    }

    fn sample_registry() -> SessionRegistry {
        let mut registry = SessionRegistry::new();
        let group = SessionGroup::new("backend", Utc::now());
        let mut session = ConsoleSession::new(SessionKind::ClaudeLike, "api", Utc::now());
        session.group_id = Some(group.id);
        let (sid, gid) = (session.id, group.id);
        registry.insert_group(group);
        registry.insert_session(session);
        registry.set_active_session(Some(sid));
        registry.set_active_group(Some(gid));
        registry
    }

    #[test]
    fn test_registry_save_and_load() {
        let (_dir, store) = create_test_store();
        let registry = sample_registry();
        store.save_registry(&registry).unwrap();

        let loaded = store.load_registry();
        assert_eq!(loaded.session_count(), 1);
        assert_eq!(loaded.group_count(), 1);
        assert_eq!(loaded.active_session(), registry.active_session());
        assert_eq!(loaded.active_group(), registry.active_group());
    }

    #[test]
    fn test_missing_files_load_empty() {
        let (_dir, store) = create_test_store();
        let loaded = store.load_registry();
        assert_eq!(loaded.session_count(), 0);
        assert!(store.load_layout().is_none());
    }

    #[test]
    fn test_version_mismatch_discards_only_that_namespace() {
        let (_dir, store) = create_test_store();
        store.save_registry(&sample_registry()).unwrap();

        let groups_path = store.dir().join(GROUPS_FILE);
        fs::write(&groups_path, r#"{"version": 99, "data": {"groups": []}}"#).unwrap();

        let loaded = store.load_registry();
        assert_eq!(loaded.session_count(), 1);
        assert_eq!(loaded.group_count(), 0);
        assert_eq!(loaded.active_group(), None);
    }

    #[test]
    fn test_corrupt_file_is_ignored() {
        let (_dir, store) = create_test_store();
        fs::create_dir_all(store.dir()).unwrap();
        fs::write(store.dir().join(SESSIONS_FILE), "not json").unwrap();
        assert_eq!(store.load_registry().session_count(), 0);
    }

    #[test]
    fn test_layout_save_and_load() {
        let (_dir, store) = create_test_store();
        let mut layout = LayoutStore::new();
        let group = Uuid::new_v4();
        let terminal = Uuid::new_v4();
        layout.insert_terminal(
            group,
            terminal,
            TerminalMeta::new("/tmp", "shell"),
            None,
            Orientation::Horizontal,
        );
        store.save_layout(&layout).unwrap();

        let loaded = store.load_layout().unwrap();
        assert_eq!(loaded.group_of_terminal(terminal), Some(group));
        assert_eq!(loaded.terminal_meta(terminal).map(|m| m.cwd.as_str()), Some("/tmp"));
    }

    #[test]
    fn test_write_is_atomic_no_temp_left() {
        let (_dir, store) = create_test_store();
        store.save_registry(&sample_registry()).unwrap();
        let leftovers: Vec<_> = fs::read_dir(store.dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_write_empty() {
        let (_dir, store) = create_test_store();
        store.save_registry(&sample_registry()).unwrap();
        store.write_empty().unwrap();
        let loaded = store.load_registry();
        assert_eq!(loaded.session_count(), 0);
        assert_eq!(loaded.group_count(), 0);
        assert!(store.load_layout().unwrap().group_ids().is_empty());
    }
}

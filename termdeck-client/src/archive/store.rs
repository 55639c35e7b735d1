//! Archive collaborator
//!
//! Archived sessions live outside the console, behind a save/list/restore
//! contract. The HTTP store talks to the management console's REST API;
//! the memory store backs tests and setups without an API.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use termdeck_protocol::{GroupId, SessionId};
use termdeck_utils::{Result, TermdeckError};

use crate::registry::{ConsoleSession, SessionKind};

/// A session as persisted by the archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedSession {
    pub session_id: SessionId,
    pub kind: SessionKind,
    pub label: String,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub group_id: Option<GroupId>,
    #[serde(default)]
    pub group_label: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    pub created_at: DateTime<Utc>,
    pub archived_at: DateTime<Utc>,
    /// Serialized terminal screen, when one could be captured
    #[serde(default)]
    pub scrollback: Option<String>,
}

impl ArchivedSession {
    pub fn from_session(session: &ConsoleSession, archived_at: DateTime<Utc>) -> Self {
        Self {
            session_id: session.id,
            kind: session.kind,
            label: session.label.clone(),
            command: session.command.clone(),
            group_id: session.group_id,
            group_label: None,
            cwd: None,
            created_at: session.created_at,
            archived_at,
            scrollback: None,
        }
    }
}

/// Save/list/restore contract of the archive
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Persist a session and its scrollback
    async fn save(&self, record: ArchivedSession) -> Result<()>;

    /// Archived sessions, newest first
    async fn list(&self) -> Result<Vec<ArchivedSession>>;

    /// Fetch one archived session for restoring
    async fn restore(&self, session_id: SessionId) -> Result<Option<ArchivedSession>>;

    /// Activity heartbeat for live sessions
    async fn heartbeat(&self, session_ids: Vec<SessionId>, at: DateTime<Utc>) -> Result<()>;
}

/// Archive kept in memory
#[derive(Debug, Default)]
pub struct MemoryArchiveStore {
    records: Mutex<HashMap<SessionId, ArchivedSession>>,
    heartbeats: Mutex<Vec<(Vec<SessionId>, DateTime<Utc>)>>,
}

impl MemoryArchiveStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn heartbeat_count(&self) -> usize {
        self.heartbeats.lock().len()
    }
}

#[async_trait]
impl ArchiveStore for MemoryArchiveStore {
    async fn save(&self, record: ArchivedSession) -> Result<()> {
        self.records.lock().insert(record.session_id, record);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ArchivedSession>> {
        let mut records: Vec<_> = self.records.lock().values().cloned().collect();
        records.sort_by(|a, b| b.archived_at.cmp(&a.archived_at));
        Ok(records)
    }

    async fn restore(&self, session_id: SessionId) -> Result<Option<ArchivedSession>> {
        Ok(self.records.lock().remove(&session_id))
    }

    async fn heartbeat(&self, session_ids: Vec<SessionId>, at: DateTime<Utc>) -> Result<()> {
        self.heartbeats.lock().push((session_ids, at));
        Ok(())
    }
}

/// Timeout for every archive request
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HeartbeatBody {
    session_ids: Vec<SessionId>,
    last_activity_at: DateTime<Utc>,
}

/// Archive reached over the console's REST API
///
/// `ureq` is blocking, so every call runs on the blocking pool.
#[derive(Clone)]
pub struct HttpArchiveStore {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpArchiveStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(HTTP_TIMEOUT).build();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            agent,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(ureq::Agent) -> std::result::Result<T, ureq::Error> + Send + 'static,
    {
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || f(agent))
            .await
            .map_err(|e| TermdeckError::internal(format!("archive task failed: {}", e)))?
            .map_err(archive_error)
    }
}

fn archive_error(err: ureq::Error) -> TermdeckError {
    match err {
        ureq::Error::Status(code, response) => TermdeckError::archive(format!(
            "HTTP {} from {}",
            code,
            response.get_url()
        )),
        ureq::Error::Transport(transport) => TermdeckError::archive(transport.to_string()),
    }
}

#[async_trait]
impl ArchiveStore for HttpArchiveStore {
    async fn save(&self, record: ArchivedSession) -> Result<()> {
        let url = self.url("/api/console-sessions/archive");
        self.blocking(move |agent| agent.post(&url).send_json(&record).map(|_| ()))
            .await
    }

    async fn list(&self) -> Result<Vec<ArchivedSession>> {
        let url = self.url("/api/console-sessions");
        let body: std::io::Result<Vec<ArchivedSession>> = self
            .blocking(move |agent| {
                agent
                    .get(&url)
                    .query("filter", "archived")
                    .call()
                    .map(|response| response.into_json())
            })
            .await?;
        body.map_err(|e| TermdeckError::archive(format!("invalid archive listing: {}", e)))
    }

    async fn restore(&self, session_id: SessionId) -> Result<Option<ArchivedSession>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .find(|record| record.session_id == session_id))
    }

    async fn heartbeat(&self, session_ids: Vec<SessionId>, at: DateTime<Utc>) -> Result<()> {
        let url = self.url("/api/console-sessions");
        let body = HeartbeatBody {
            session_ids,
            last_activity_at: at,
        };
        self.blocking(move |agent| agent.request("PATCH", &url).send_json(&body).map(|_| ()))
            .await
    }
}

impl std::fmt::Debug for HttpArchiveStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpArchiveStore")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn record(label: &str, archived_minutes_ago: i64) -> ArchivedSession {
        let now = Utc::now();
        let session = ConsoleSession::new(SessionKind::ClaudeLike, label, now);
        ArchivedSession::from_session(&session, now - ChronoDuration::minutes(archived_minutes_ago))
    }

    #[tokio::test]
    async fn test_memory_store_save_list_restore() {
        let store = MemoryArchiveStore::new();
        let older = record("older", 10);
        let newer = record("newer", 1);
        store.save(older.clone()).await.unwrap();
        store.save(newer.clone()).await.unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed, vec![newer.clone(), older.clone()]);

        assert_eq!(store.restore(older.session_id).await.unwrap(), Some(older.clone()));
        assert_eq!(store.restore(older.session_id).await.unwrap(), None);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_heartbeat() {
        let store = MemoryArchiveStore::new();
        store.heartbeat(vec![uuid::Uuid::new_v4()], Utc::now()).await.unwrap();
        assert_eq!(store.heartbeat_count(), 1);
    }

    #[tokio::test]
    async fn test_http_store_unreachable_is_archive_error() {
        // Port 9 (discard) on localhost is not listening in test environments
        let store = HttpArchiveStore::new("http://127.0.0.1:9/");
        let result = store.save(record("x", 0)).await;
        assert!(matches!(result, Err(TermdeckError::Archive(_))));
    }

    #[test]
    fn test_http_store_trims_base_url() {
        let store = HttpArchiveStore::new("http://localhost:3000/");
        assert_eq!(
            store.url("/api/console-sessions"),
            "http://localhost:3000/api/console-sessions"
        );
    }

    #[test]
    fn test_archived_session_wire_names() {
        let json = serde_json::to_string(&record("x", 0)).unwrap();
        assert!(json.contains("\"sessionId\""));
        assert!(json.contains("\"archivedAt\""));
        assert!(json.contains("\"kind\":\"claude-like\""));
    }
}

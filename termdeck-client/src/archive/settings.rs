//! Settings collaborator for the auto-archive threshold

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use termdeck_utils::{Result, TermdeckError};

/// Source of the `autoArchiveDays` setting
#[async_trait]
pub trait SettingsSource: Send + Sync {
    /// Inactivity threshold in days; 0 disables auto-archival
    async fn auto_archive_days(&self) -> Result<u32>;
}

/// Fixed threshold, typically from the client config file
#[derive(Debug, Clone, Copy)]
pub struct StaticSettings {
    pub auto_archive_days: u32,
}

#[async_trait]
impl SettingsSource for StaticSettings {
    async fn auto_archive_days(&self) -> Result<u32> {
        Ok(self.auto_archive_days)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsResponse {
    #[serde(default)]
    auto_archive_days: Option<u32>,
}

/// Settings read from `GET /api/settings`
#[derive(Clone)]
pub struct HttpSettingsSource {
    url: String,
    agent: ureq::Agent,
}

impl HttpSettingsSource {
    pub fn new(base_url: &str) -> Self {
        Self {
            url: format!("{}/api/settings", base_url.trim_end_matches('/')),
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(5))
                .build(),
        }
    }
}

#[async_trait]
impl SettingsSource for HttpSettingsSource {
    async fn auto_archive_days(&self) -> Result<u32> {
        let url = self.url.clone();
        let agent = self.agent.clone();
        let response = tokio::task::spawn_blocking(move || -> Result<SettingsResponse> {
            agent
                .get(&url)
                .call()
                .map_err(|e| TermdeckError::archive(format!("settings request failed: {}", e)))?
                .into_json()
                .map_err(|e| TermdeckError::archive(format!("invalid settings body: {}", e)))
        })
        .await
        .map_err(|e| TermdeckError::internal(format!("settings task failed: {}", e)))??;

        Ok(response.auto_archive_days.unwrap_or(0))
    }
}

/// Threshold that survives fetch failures
///
/// A failed fetch keeps the last value that was read successfully.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveThreshold {
    last_known: u32,
}

impl ArchiveThreshold {
    pub fn new(initial_days: u32) -> Self {
        Self {
            last_known: initial_days,
        }
    }

    pub fn days(&self) -> u32 {
        self.last_known
    }

    pub async fn refresh(&mut self, source: &dyn SettingsSource) -> u32 {
        match source.auto_archive_days().await {
            Ok(days) => self.last_known = days,
            Err(e) => {
                tracing::warn!(
                    "Failed to read auto-archive setting, keeping {} days: {}",
                    self.last_known,
                    e
                );
            }
        }
        self.last_known
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FlakySettings {
        fail: AtomicBool,
        days: u32,
    }

    #[async_trait]
    impl SettingsSource for FlakySettings {
        async fn auto_archive_days(&self) -> Result<u32> {
            if self.fail.load(Ordering::SeqCst) {
                Err(TermdeckError::archive("HTTP 503"))
            } else {
                Ok(self.days)
            }
        }
    }

    #[tokio::test]
    async fn test_static_settings() {
        let settings = StaticSettings { auto_archive_days: 3 };
        assert_eq!(settings.auto_archive_days().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_threshold_keeps_last_known_on_failure() {
        let source = FlakySettings {
            fail: AtomicBool::new(false),
            days: 7,
        };
        let mut threshold = ArchiveThreshold::new(0);
        assert_eq!(threshold.refresh(&source).await, 7);

        source.fail.store(true, Ordering::SeqCst);
        assert_eq!(threshold.refresh(&source).await, 7);
        assert_eq!(threshold.days(), 7);
    }

    #[test]
    fn test_settings_response_missing_field() {
        let parsed: SettingsResponse = serde_json::from_str("{\"theme\":\"dark\"}").unwrap();
        assert_eq!(parsed.auto_archive_days, None);
        let parsed: SettingsResponse = serde_json::from_str("{\"autoArchiveDays\":14}").unwrap();
        assert_eq!(parsed.auto_archive_days, Some(14));
    }

    #[test]
    fn test_http_settings_url() {
        let source = HttpSettingsSource::new("http://localhost:3000/");
        assert_eq!(source.url, "http://localhost:3000/api/settings");
    }
}

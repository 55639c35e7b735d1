//! Configuration loader

use std::path::Path;

use termdeck_utils::{server_config_file, Result, TermdeckError};

use super::AppConfig;

/// Accepted range for the cwd probe debounce
const PROBE_DEBOUNCE_RANGE_MS: std::ops::RangeInclusive<u64> = 150..=200;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from default location
    pub fn load() -> Result<AppConfig> {
        let path = server_config_file();
        if path.exists() {
            Self::load_from_path(&path)
        } else {
            Ok(AppConfig::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<AppConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| TermdeckError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::parse(&content, path)
    }

    /// Parse configuration from string
    pub fn parse(content: &str, path: &Path) -> Result<AppConfig> {
        toml::from_str(content).map_err(|e| TermdeckError::ConfigInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Validate configuration
    pub fn validate(config: &AppConfig) -> Result<()> {
        if !PROBE_DEBOUNCE_RANGE_MS.contains(&config.terminal.cwd_probe_debounce_ms) {
            return Err(TermdeckError::config(format!(
                "cwd_probe_debounce_ms must be between {} and {}",
                PROBE_DEBOUNCE_RANGE_MS.start(),
                PROBE_DEBOUNCE_RANGE_MS.end()
            )));
        }

        if config.terminal.default_cols == 0 || config.terminal.default_rows == 0 {
            return Err(TermdeckError::config(
                "default_cols and default_rows must be non-zero",
            ));
        }

        if let Some(addr) = &config.server.tcp_addr {
            addr.parse::<std::net::SocketAddr>().map_err(|e| {
                TermdeckError::config(format!("Invalid tcp_addr '{}': {}", addr, e))
            })?;
        }

        Ok(())
    }

    /// Load from an explicit path (or the default location) and validate
    pub fn load_and_validate(path: Option<&Path>) -> Result<AppConfig> {
        let config = match path {
            Some(path) => Self::load_from_path(path)?,
            None => Self::load()?,
        };
        Self::validate(&config)?;
        Ok(config)
    }
}

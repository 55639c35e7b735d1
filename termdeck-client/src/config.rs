//! Client configuration
//!
//! Loaded from `~/.config/termdeck/client.toml`. Every field has a default,
//! so a missing file means a local server on the default socket with an
//! in-memory archive.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use termdeck_utils::{client_config_file, client_state_dir, Result, TermdeckError};

use crate::cache::{
    CacheLimits, MAX_CACHED_TERMINALS, MAX_SERIALIZED_TERMINALS, MAX_SERIALIZE_BYTES,
    MAX_TOTAL_SERIALIZED_BYTES,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server address: socket path, `unix://path` or `tcp://host:port`
    pub addr: Option<String>,
    /// Named server addresses usable in place of `addr`
    pub remotes: HashMap<String, String>,
    /// Base URL of the management console's REST API
    pub api_base_url: Option<String>,
    /// Inactivity threshold when no settings API is configured
    pub auto_archive_days: u32,
    pub state_dir: Option<PathBuf>,
    /// Shell for new shell sessions; the server's default when unset
    pub default_shell: Option<String>,
    /// Command for new assistant sessions
    pub assistant_command: String,
    pub default_cols: u16,
    pub default_rows: u16,
    /// Capture terminal output server-side for scrollback restore
    pub capture_output: bool,
    /// Start the server when it is not running
    pub auto_start: bool,
    pub cache: CacheConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addr: None,
            remotes: HashMap::new(),
            api_base_url: None,
            auto_archive_days: 0,
            state_dir: None,
            default_shell: None,
            assistant_command: "claude".into(),
            default_cols: 80,
            default_rows: 24,
            capture_output: true,
            auto_start: true,
            cache: CacheConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(client_state_dir)
    }

    /// Expand a remote alias, or return the address unchanged
    pub fn resolve_addr<'a>(&'a self, addr: &'a str) -> &'a str {
        self.remotes.get(addr).map(String::as_str).unwrap_or(addr)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_cached_terminals: usize,
    pub max_serialized_terminals: usize,
    pub max_serialize_bytes: usize,
    pub max_total_serialized_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_cached_terminals: MAX_CACHED_TERMINALS,
            max_serialized_terminals: MAX_SERIALIZED_TERMINALS,
            max_serialize_bytes: MAX_SERIALIZE_BYTES,
            max_total_serialized_bytes: MAX_TOTAL_SERIALIZED_BYTES,
        }
    }
}

impl From<&CacheConfig> for CacheLimits {
    fn from(config: &CacheConfig) -> Self {
        CacheLimits {
            max_cached_terminals: config.max_cached_terminals,
            max_serialized_terminals: config.max_serialized_terminals,
            max_serialize_bytes: config.max_serialize_bytes,
            max_total_serialized_bytes: config.max_total_serialized_bytes,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load() -> Result<ClientConfig> {
        let path = client_config_file();
        if path.exists() {
            Self::load_from_path(&path)
        } else {
            Ok(ClientConfig::default())
        }
    }

    pub fn load_from_path(path: &Path) -> Result<ClientConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| TermdeckError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::parse(&content, path)
    }

    pub fn parse(content: &str, path: &Path) -> Result<ClientConfig> {
        toml::from_str(content).map_err(|e| TermdeckError::ConfigInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn validate(config: &ClientConfig) -> Result<()> {
        let cache = &config.cache;
        if cache.max_cached_terminals == 0
            || cache.max_serialized_terminals == 0
            || cache.max_serialize_bytes == 0
        {
            return Err(TermdeckError::config("cache limits must be non-zero"));
        }
        if cache.max_serialize_bytes > cache.max_total_serialized_bytes {
            return Err(TermdeckError::config(
                "max_serialize_bytes must not exceed max_total_serialized_bytes",
            ));
        }

        if config.default_cols == 0 || config.default_rows == 0 {
            return Err(TermdeckError::config(
                "default_cols and default_rows must be non-zero",
            ));
        }

        if let Some(base) = &config.api_base_url {
            url::Url::parse(base).map_err(|e| {
                TermdeckError::config(format!("Invalid api_base_url '{}': {}", base, e))
            })?;
        }

        Ok(())
    }

    pub fn load_and_validate(path: Option<&Path>) -> Result<ClientConfig> {
        let config = match path {
            Some(path) => Self::load_from_path(path)?,
            None => Self::load()?,
        };
        Self::validate(&config)?;
        Ok(config)
    }
}

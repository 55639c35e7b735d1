//! Configuration management for the termdeck server
//!
//! Settings are read once at startup and shared through an `ArcSwap`
//! handle so handlers read them without locking.

mod loader;
mod schema;

pub use loader::ConfigLoader;
pub use schema::*;

use arc_swap::ArcSwap;
use std::sync::Arc;

/// Global configuration handle
pub type ConfigHandle = Arc<ArcSwap<AppConfig>>;

/// Create a config handle holding the given configuration
pub fn config_handle(config: AppConfig) -> ConfigHandle {
    Arc::new(ArcSwap::from_pointee(config))
}

/// Create a new config handle with defaults
pub fn new_config_handle() -> ConfigHandle {
    config_handle(AppConfig::default())
}

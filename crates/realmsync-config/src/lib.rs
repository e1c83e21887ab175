//! Operator configuration.
//!
//! Sources, lowest priority first:
//! 1. built-in defaults
//! 2. a TOML file (`realmsync.toml` unless a path is given)
//! 3. `REALMSYNC__SECTION__KEY` environment variables
//!
//! The merged result is validated before it is returned. [`FileWatcher`]
//! reports edits of the file so the binary can reload.

use std::path::PathBuf;

mod loader;
mod settings;
mod watch;

pub use loader::{DEFAULT_CONFIG_FILE, ENV_PREFIX, load_config};
pub use settings::{
    BootstrapConfig, KeycloakConfig, LoggingConfig, OperatorConfig, ReconcileConfig,
};
pub use watch::{FileWatcher, ReloadEvent, WatchHandle};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Unable to load configuration: {0}")]
    Load(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

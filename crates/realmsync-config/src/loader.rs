use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat, Map};
use tracing::debug;

use crate::{ConfigError, OperatorConfig};

/// File read when no path is given, if it exists.
pub const DEFAULT_CONFIG_FILE: &str = "realmsync.toml";

/// Prefix of environment overrides, e.g. `REALMSYNC__RECONCILE__WORKERS=8`.
pub const ENV_PREFIX: &str = "REALMSYNC";

/// Loads the TOML file, applies environment overrides and validates.
///
/// An explicit `path` must exist; the default file is optional.
pub fn load_config(path: Option<&Path>) -> Result<OperatorConfig, ConfigError> {
    build(path, None)
}

pub(crate) fn build(
    path: Option<&Path>,
    env: Option<Map<String, String>>,
) -> Result<OperatorConfig, ConfigError> {
    let mut builder = Config::builder();
    match path {
        Some(p) => {
            if !p.exists() {
                return Err(ConfigError::NotFound(p.to_path_buf()));
            }
            debug!(path = %p.display(), "Loading configuration file");
            builder = builder.add_source(File::from(p.to_path_buf()).format(FileFormat::Toml));
        }
        None => {
            let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                debug!(path = %default_path.display(), "Loading default configuration file");
                builder = builder.add_source(File::from(default_path).format(FileFormat::Toml));
            }
        }
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
            .source(env),
    );

    let config: OperatorConfig = builder
        .build()
        .map_err(|e| ConfigError::Load(e.to_string()))?
        .try_deserialize()
        .map_err(|e| ConfigError::Load(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

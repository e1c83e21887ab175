use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorConfig {
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub keycloak: KeycloakConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

impl OperatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let reconcile = &self.reconcile;
        if reconcile.workers == 0 {
            return Err(ConfigError::invalid("reconcile.workers must be > 0"));
        }
        for (name, value) in [
            ("reconcile.success_interval", reconcile.success_interval),
            ("reconcile.failure_backoff_step", reconcile.failure_backoff_step),
            ("reconcile.unavailable_retry", reconcile.unavailable_retry),
            ("reconcile.default_requeue", reconcile.default_requeue),
            ("keycloak.request_timeout", self.keycloak.request_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::invalid(format!("{name} must be > 0")));
            }
        }
        if reconcile.namespace.as_deref().is_some_and(str::is_empty) {
            return Err(ConfigError::invalid(
                "reconcile.namespace must not be empty when set",
            ));
        }

        let level = self.logging.level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::invalid(format!(
                "logging.level must be one of {LOG_LEVELS:?}"
            )));
        }
        Ok(())
    }

    /// Upper bound for one reconciliation attempt.
    pub fn reconcile_deadline(&self) -> Duration {
        self.keycloak.request_timeout.saturating_mul(10)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Requeue delay after a successful reconciliation.
    #[serde(default = "default_success_interval", with = "humantime_serde")]
    pub success_interval: Duration,
    /// Backoff grows by this much per consecutive failure.
    #[serde(default = "default_failure_backoff_step", with = "humantime_serde")]
    pub failure_backoff_step: Duration,
    /// Retry period while Keycloak is unreachable; does not count as failure.
    #[serde(default = "default_unavailable_retry", with = "humantime_serde")]
    pub unavailable_retry: Duration,
    /// Used when the object itself cannot be read.
    #[serde(default = "default_requeue", with = "humantime_serde")]
    pub default_requeue: Duration,
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Only objects in this namespace are reconciled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            success_interval: default_success_interval(),
            failure_backoff_step: default_failure_backoff_step(),
            unavailable_retry: default_unavailable_retry(),
            default_requeue: default_requeue(),
            workers: default_workers(),
            namespace: None,
        }
    }
}

fn default_success_interval() -> Duration {
    Duration::from_secs(120)
}
fn default_failure_backoff_step() -> Duration {
    Duration::from_secs(10)
}
fn default_unavailable_retry() -> Duration {
    Duration::from_secs(60)
}
fn default_requeue() -> Duration {
    Duration::from_secs(5)
}
fn default_workers() -> usize {
    4
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeycloakConfig {
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Applies to every instance on top of its own setting.
    #[serde(default)]
    pub insecure_skip_verify: bool,
}

impl Default for KeycloakConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            insecure_skip_verify: false,
        }
    }
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// JSON or TOML file of declared objects loaded at startup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = OperatorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.reconcile.success_interval, Duration::from_secs(120));
        assert_eq!(config.reconcile.workers, 4);
        assert_eq!(config.reconcile_deadline(), Duration::from_secs(300));
    }

    #[test]
    fn test_rejects_zero_workers() {
        let mut config = OperatorConfig::default();
        config.reconcile.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_durations() {
        let mut config = OperatorConfig::default();
        config.reconcile.failure_backoff_step = Duration::ZERO;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("failure_backoff_step"));
    }

    #[test]
    fn test_rejects_unknown_log_level() {
        let mut config = OperatorConfig::default();
        config.logging.level = "chatty".into();
        assert!(config.validate().is_err());

        config.logging.level = "DEBUG".into();
        assert!(config.validate().is_ok());
    }
}

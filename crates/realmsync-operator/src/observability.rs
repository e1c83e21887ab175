//! Log setup for the binary.
//!
//! The active filter sits behind a reload layer so a config file edit can
//! change the level of a running engine. An explicit `RUST_LOG` pins the
//! filter: it is used at startup and level changes are ignored afterwards.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

type FilterHandle = reload::Handle<EnvFilter, Registry>;

static FILTER: OnceLock<FilterHandle> = OnceLock::new();

fn rust_log_filter() -> Option<EnvFilter> {
    std::env::var_os("RUST_LOG")?;
    EnvFilter::try_from_default_env().ok()
}

/// Installs the global subscriber. Later calls are no-ops.
pub fn init_tracing(level: &str) {
    let filter = rust_log_filter().unwrap_or_else(|| EnvFilter::new(level));
    let (filter_layer, handle) = reload::Layer::new(filter);
    if FILTER.set(handle).is_err() {
        return;
    }

    let _ = tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_target(false))
        .try_init();
}

/// Switches the running filter to `level` unless `RUST_LOG` pins it.
pub fn apply_logging_level(level: &str) {
    if rust_log_filter().is_some() {
        return;
    }
    let Some(handle) = FILTER.get() else {
        return;
    };
    match handle.reload(EnvFilter::new(level)) {
        Ok(()) => tracing::debug!(level, "Logging level applied"),
        Err(e) => tracing::warn!(error = %e, level, "Unable to apply logging level"),
    }
}

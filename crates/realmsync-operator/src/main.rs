use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use realmsync_auth::{HttpClientFactory, SessionCache};
use realmsync_config::{
    DEFAULT_CONFIG_FILE, FileWatcher, OperatorConfig, ReloadEvent, load_config,
};
use realmsync_db_memory::InMemoryStore;
use realmsync_operator::{Context, Manager, bootstrap, observability, reconcilers};
use realmsync_storage::{DynStore, EventBroadcaster, EventedStore};
use tokio::sync::mpsc;

/// Converges Keycloak servers towards declared realms, clients and roles.
#[derive(Debug, Parser)]
#[command(name = "realmsync", version, about)]
struct Cli {
    /// Configuration file (defaults to realmsync.toml when present)
    #[arg(long, env = "REALMSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Only reconcile objects in this namespace
    #[arg(long, env = "REALMSYNC_NAMESPACE")]
    namespace: Option<String>,

    /// Number of concurrent reconciliations
    #[arg(long, env = "REALMSYNC_WORKERS")]
    workers: Option<usize>,

    /// Log level, overrides logging.level
    #[arg(long, env = "REALMSYNC_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    fn apply(&self, config: &mut OperatorConfig) {
        if let Some(ns) = &self.namespace {
            config.reconcile.namespace = Some(ns.clone());
        }
        if let Some(workers) = self.workers {
            config.reconcile.workers = workers;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }

    fn load(&self) -> Result<OperatorConfig, realmsync_config::ConfigError> {
        let mut config = load_config(self.config.as_deref())?;
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    // .env is optional
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    observability::init_tracing("info");
    let cli = Cli::parse();

    let config = match cli.load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };
    observability::apply_logging_level(&config.logging.level);
    tracing::info!(
        path = ?cli.config,
        workers = config.reconcile.workers,
        namespace = ?config.reconcile.namespace,
        "Configuration loaded"
    );

    if let Err(e) = run(cli, config).await {
        tracing::error!(error = %e, "realmsync failed");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: OperatorConfig) -> anyhow::Result<()> {
    let events = EventBroadcaster::new_shared();
    let store: DynStore = Arc::new(EventedStore::new(InMemoryStore::new(), events.clone()));

    if let Some(manifest) = &config.bootstrap.manifest {
        let namespace = config.reconcile.namespace.as_deref().unwrap_or("default");
        bootstrap::load_manifest(&store, manifest, namespace)
            .await
            .context("bootstrap failed")?;
    }

    let sessions = SessionCache::new(store.clone(), Arc::new(HttpClientFactory))
        .with_request_timeout(config.keycloak.request_timeout);
    let ctx = Context::new(store.clone(), Arc::new(sessions), &config.reconcile)
        .with_deadline(config.reconcile_deadline());

    let manager = Manager::new(
        store,
        events,
        reconcilers::all(&ctx),
        config.reconcile.workers,
    )
    .with_namespace(config.reconcile.namespace.clone());
    let (shutdown, mut tasks) = manager.start();

    let watched = cli.config.clone().or_else(|| {
        let default = PathBuf::from(DEFAULT_CONFIG_FILE);
        default.exists().then_some(default)
    });
    let watcher = watched.map(|path| {
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(reload_on_change(cli, rx));
        FileWatcher::new(path).watch(tx)
    });

    tokio::signal::ctrl_c()
        .await
        .context("unable to listen for shutdown signal")?;
    tracing::info!("Shutting down");

    let _ = shutdown.send(true);
    while tasks.join_next().await.is_some() {}
    if let Some(watcher) = watcher {
        watcher.stop().await;
    }
    Ok(())
}

/// Re-reads the configuration file on change and applies the logging level.
/// Reconcile settings are read once at startup.
async fn reload_on_change(cli: Cli, mut rx: mpsc::Receiver<ReloadEvent>) {
    while let Some(event) = rx.recv().await {
        match cli.load() {
            Ok(config) => {
                observability::apply_logging_level(&config.logging.level);
                tracing::info!(
                    path = %event.path.display(),
                    level = %config.logging.level,
                    "Configuration reloaded"
                );
            }
            Err(e) => {
                tracing::warn!(path = %event.path.display(), error = %e, "Ignoring invalid configuration");
            }
        }
    }
}

//! Debounced configuration file watcher.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// The watched file changed on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadEvent {
    pub path: PathBuf,
}

pub struct FileWatcher {
    path: PathBuf,
    debounce: Duration,
}

impl FileWatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            debounce: Duration::from_millis(500),
        }
    }

    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Starts watching; events go to `tx` until the handle is stopped or the
    /// receiver is dropped.
    ///
    /// The parent directory is watched so editors that replace the file
    /// instead of writing it in place are still seen.
    pub fn watch(self, tx: mpsc::Sender<ReloadEvent>) -> WatchHandle {
        let path = self.path;
        let debounce = self.debounce;
        let watch_path = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let (notify_tx, notify_rx) = std::sync::mpsc::channel();

            let mut debouncer = match new_debouncer(debounce, notify_tx) {
                Ok(d) => d,
                Err(e) => {
                    error!(error = %e, "Failed to create config file watcher");
                    return;
                }
            };
            if let Err(e) = debouncer
                .watcher()
                .watch(&watch_path, RecursiveMode::NonRecursive)
            {
                error!(path = %watch_path.display(), error = %e, "Failed to watch config directory");
                return;
            }
            info!(path = %path.display(), "Watching configuration file");

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        info!("Config file watcher shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_millis(100)) => {
                        while let Ok(result) = notify_rx.try_recv() {
                            let events = match result {
                                Ok(events) => events,
                                Err(e) => {
                                    error!(error = ?e, "Config file watcher error");
                                    continue;
                                }
                            };
                            if !events.iter().any(|e| e.path.file_name() == path.file_name()) {
                                continue;
                            }
                            info!(path = %path.display(), "Configuration file changed");
                            if tx.send(ReloadEvent { path: path.clone() }).await.is_err() {
                                warn!("Config reload receiver dropped");
                                return;
                            }
                        }
                    }
                }
            }
        });

        WatchHandle {
            task,
            shutdown: Some(shutdown_tx),
        }
    }
}

/// Keeps the watcher alive; dropping it leaves the task running until the
/// receiver goes away.
pub struct WatchHandle {
    task: JoinHandle<()>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl WatchHandle {
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::time::timeout;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_reports_changes_to_watched_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("realmsync.toml");
        std::fs::write(&path, "[logging]\nlevel = \"info\"\n").unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let handle = FileWatcher::new(&path)
            .with_debounce(Duration::from_millis(50))
            .watch(tx);
        tokio::time::sleep(Duration::from_millis(200)).await;

        std::fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();

        let event = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no reload event")
            .unwrap();
        assert_eq!(event.path, path);

        handle.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_ignores_sibling_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("realmsync.toml");
        std::fs::write(&path, "").unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let handle = FileWatcher::new(&path)
            .with_debounce(Duration::from_millis(50))
            .watch(tx);
        tokio::time::sleep(Duration::from_millis(200)).await;

        std::fs::write(dir.path().join("other.toml"), "x = 1").unwrap();

        assert!(timeout(Duration::from_millis(600), rx.recv()).await.is_err());
        handle.stop().await;
    }
}

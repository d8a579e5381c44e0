//! Debounced project file watcher
//!
//! Watches the project tree and reports changed paths after a debounce
//! window, so a burst of editor writes becomes one sync trigger.

use std::path::PathBuf;
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_full::{new_debouncer, DebounceEventResult};
use tokio::sync::mpsc;

use hotpush_core::prelude::*;
use hotpush_sync::IgnoreList;

/// Default debounce duration in milliseconds
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// What the watcher reports to the orchestrator.
#[derive(Debug, Clone)]
pub enum WatcherMessage {
    /// Debounced batch of changed paths (project-relative filtering
    /// already applied).
    Changed(Vec<PathBuf>),
    Error(String),
}

/// Configuration for the file watcher
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Paths to watch (relative to project root)
    pub paths: Vec<PathBuf>,
    /// Debounce duration
    pub debounce: Duration,
    /// Ignore patterns applied to project-relative paths
    pub ignore: IgnoreList,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            paths: vec![PathBuf::from(".")],
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            ignore: IgnoreList::default(),
        }
    }
}

impl WatcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.paths = paths;
        self
    }

    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.debounce = Duration::from_millis(ms);
        self
    }

    pub fn with_ignore(mut self, ignore: IgnoreList) -> Self {
        self.ignore = ignore;
        self
    }
}

/// Manages file watching for one project
pub struct FileWatcher {
    /// Project root directory
    project_root: PathBuf,
    /// Configuration
    config: WatcherConfig,
    /// Handle to stop the watcher
    stop_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl FileWatcher {
    pub fn new(project_root: PathBuf, config: WatcherConfig) -> Self {
        Self {
            project_root,
            config,
            stop_tx: None,
        }
    }

    /// Start watching for file changes
    ///
    /// Sends [`WatcherMessage`]s to the channel until stopped.
    pub fn start(&mut self, message_tx: mpsc::Sender<WatcherMessage>) -> Result<()> {
        if self.is_running() {
            return Err(Error::watcher("watcher is already running"));
        }

        let project_root = self.project_root.clone();
        let config = self.config.clone();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel();

        self.stop_tx = Some(stop_tx);

        // The notify debouncer is callback-driven and blocking.
        tokio::task::spawn_blocking(move || {
            Self::run_watcher(project_root, config, message_tx, stop_rx);
        });

        Ok(())
    }

    /// Stop the file watcher
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }

    pub fn is_running(&self) -> bool {
        self.stop_tx.is_some()
    }

    /// Internal: run the blocking watcher
    fn run_watcher(
        project_root: PathBuf,
        config: WatcherConfig,
        message_tx: mpsc::Sender<WatcherMessage>,
        mut stop_rx: tokio::sync::oneshot::Receiver<()>,
    ) {
        let tx_clone = message_tx.clone();
        let ignore = config.ignore.clone();
        let root_for_filter = project_root.clone();

        let debouncer_result = new_debouncer(
            config.debounce,
            None, // No tick rate override
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    let mut changed: Vec<PathBuf> = events
                        .iter()
                        .flat_map(|event| event.paths.iter().cloned())
                        .filter(|path| {
                            let relative = path
                                .strip_prefix(&root_for_filter)
                                .unwrap_or(path)
                                .to_string_lossy()
                                .replace('\\', "/");
                            !ignore.is_ignored(&relative)
                        })
                        .collect();
                    changed.sort();
                    changed.dedup();

                    if changed.is_empty() {
                        return;
                    }

                    debug!("file watcher detected {} change(s)", changed.len());
                    let _ = tx_clone.blocking_send(WatcherMessage::Changed(changed));
                }
                Err(errors) => {
                    for error in errors {
                        warn!("file watcher error: {:?}", error);
                        let _ = tx_clone.blocking_send(WatcherMessage::Error(error.to_string()));
                    }
                }
            },
        );

        let mut debouncer = match debouncer_result {
            Ok(d) => d,
            Err(e) => {
                error!("failed to create file watcher: {}", e);
                let _ = message_tx.blocking_send(WatcherMessage::Error(format!(
                    "failed to create watcher: {e}"
                )));
                return;
            }
        };

        for relative_path in &config.paths {
            let full_path = project_root.join(relative_path);
            if full_path.exists() {
                if let Err(e) = debouncer.watch(&full_path, RecursiveMode::Recursive) {
                    warn!("failed to watch {}: {}", full_path.display(), e);
                } else {
                    info!("watching: {}", full_path.display());
                }
            } else {
                warn!("watch path does not exist: {}", full_path.display());
            }
        }

        // Keep running until stop signal
        loop {
            match stop_rx.try_recv() {
                Ok(()) | Err(tokio::sync::oneshot::error::TryRecvError::Closed) => {
                    info!("file watcher stopping");
                    break;
                }
                Err(tokio::sync::oneshot::error::TryRecvError::Empty) => {
                    std::thread::sleep(Duration::from_millis(100));
                }
            }
        }
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watcher_config_default() {
        let config = WatcherConfig::default();
        assert_eq!(config.debounce, Duration::from_millis(500));
        assert_eq!(config.paths, vec![PathBuf::from(".")]);
    }

    #[test]
    fn test_watcher_config_builder() {
        let config = WatcherConfig::new()
            .with_debounce_ms(1000)
            .with_paths(vec![PathBuf::from("src"), PathBuf::from("assets")]);

        assert_eq!(config.debounce, Duration::from_millis(1000));
        assert_eq!(config.paths.len(), 2);
    }

    #[test]
    fn test_file_watcher_creation() {
        let watcher = FileWatcher::new(PathBuf::from("/tmp/project"), WatcherConfig::default());
        assert!(!watcher.is_running());
    }

    #[tokio::test]
    async fn test_file_watcher_stop_when_not_started() {
        let mut watcher =
            FileWatcher::new(PathBuf::from("/tmp/project"), WatcherConfig::default());
        watcher.stop();
        assert!(!watcher.is_running());
    }

    #[tokio::test]
    async fn test_file_watcher_double_start_error() {
        let temp = tempfile::tempdir().unwrap();
        let mut watcher =
            FileWatcher::new(temp.path().to_path_buf(), WatcherConfig::default());

        let (tx, _rx) = mpsc::channel(32);

        let result1 = watcher.start(tx.clone());
        assert!(result1.is_ok());
        assert!(watcher.is_running());

        let result2 = watcher.start(tx);
        assert!(matches!(result2, Err(Error::Watcher { .. })));

        watcher.stop();
    }

    #[tokio::test]
    async fn test_watcher_reports_changes() {
        let temp = tempfile::tempdir().unwrap();
        let mut watcher = FileWatcher::new(
            temp.path().to_path_buf(),
            WatcherConfig::new().with_debounce_ms(100),
        );

        let (tx, mut rx) = mpsc::channel(32);
        watcher.start(tx).unwrap();

        // Give the blocking watcher a moment to arm.
        tokio::time::sleep(Duration::from_millis(300)).await;
        std::fs::write(temp.path().join("app.js"), "changed").unwrap();

        let message = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("watcher reported nothing")
            .expect("channel closed");

        match message {
            WatcherMessage::Changed(paths) => {
                assert!(paths.iter().any(|p| p.ends_with("app.js")));
            }
            WatcherMessage::Error(e) => panic!("watcher error: {e}"),
        }

        watcher.stop();
    }
}

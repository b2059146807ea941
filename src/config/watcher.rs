//! Configuration file watcher for hot reload.
//!
//! # Design Decisions
//! - Editors and `notify` emit several events per save; a reload is only
//!   forwarded when the parsed config differs from the last one forwarded
//! - A file that fails to parse or validate is logged and skipped, the
//!   running config stays in force

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::GuardConfig;

/// Watches the configuration file and forwards changed configurations.
pub struct ConfigWatcher {
    reloader: Reloader,
}

/// Turns file events into distinct, validated configurations.
struct Reloader {
    path: PathBuf,
    last: GuardConfig,
    update_tx: mpsc::UnboundedSender<GuardConfig>,
}

impl Reloader {
    /// Re-read the file; returns whether a new config was forwarded.
    fn reload(&mut self) -> bool {
        let config = match load_config(&self.path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(
                    path = %self.path.display(),
                    error = %e,
                    "Config reload failed, keeping current configuration"
                );
                return false;
            }
        };
        if config == self.last {
            tracing::debug!(path = %self.path.display(), "Config file touched without changes");
            return false;
        }
        self.last = config.clone();
        self.update_tx.send(config).is_ok()
    }

    fn on_event(&mut self, res: notify::Result<Event>) {
        match res {
            Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                tracing::info!(path = %self.path.display(), kind = ?event.kind, "Config file change detected");
                self.reload();
            }
            Ok(_) => {}
            Err(e) => tracing::error!(path = %self.path.display(), error = %e, "Config watch error"),
        }
    }
}

impl ConfigWatcher {
    /// Create a watcher for `path` whose contents are currently `current`.
    ///
    /// Returns the watcher and a receiver for parsed, validated configurations.
    /// Feed the receiver to [`ConfigStore::follow`](crate::config::ConfigStore::follow).
    pub fn new(path: &Path, current: GuardConfig) -> (Self, mpsc::UnboundedReceiver<GuardConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let reloader = Reloader {
            path: path.to_path_buf(),
            last: current,
            update_tx,
        };
        (Self { reloader }, update_rx)
    }

    /// Start watching the file in a background thread.
    ///
    /// The returned handle must be kept alive for as long as reloads are wanted.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let path = self.reloader.path.clone();
        let mut reloader = self.reloader;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| reloader.on_event(res),
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;
        watcher.watch(&path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %path.display(), "Config watcher started");
        Ok(watcher)
    }
}

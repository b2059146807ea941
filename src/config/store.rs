//! Live configuration snapshot and change feed.
//!
//! Readers take the current [`Snapshot`] at decision time; writers replace it
//! wholesale and publish a [`ConfigChange`] naming what moved. Nothing is ever
//! mutated in place, so an in-flight read keeps a consistent view.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::config::loader::{load_config, ConfigError};
use crate::config::schema::{CommandConfig, GuardConfig};
use crate::config::validation::validate_config;
use crate::observability::metrics;

const CHANGE_CAPACITY: usize = 64;

/// An immutable, versioned configuration.
#[derive(Debug)]
pub struct Snapshot {
    pub revision: Uuid,
    pub config: GuardConfig,
}

/// Notification that the configuration was replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigChange {
    /// Revision of the snapshot now in effect.
    pub revision: Uuid,
    /// Command keys whose own record was added, removed or edited.
    pub commands: Vec<String>,
    /// Pool keys whose record was added, removed or edited.
    pub pools: Vec<String>,
    /// The `[defaults]` record changed.
    pub defaults_changed: bool,
}

impl ConfigChange {
    fn between(old: &GuardConfig, new: &GuardConfig, revision: Uuid) -> Self {
        Self {
            revision,
            commands: changed_keys(&old.commands, &new.commands),
            pools: changed_keys(&old.pools, &new.pools),
            defaults_changed: old.defaults != new.defaults,
        }
    }

    /// Whether the effective policy of `command` may have changed.
    pub fn affects(&self, command: &str) -> bool {
        self.defaults_changed || self.commands.iter().any(|k| k == command)
    }
}

fn changed_keys<V: PartialEq>(old: &HashMap<String, V>, new: &HashMap<String, V>) -> Vec<String> {
    let keys: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
    keys.into_iter()
        .filter(|k| old.get(*k) != new.get(*k))
        .cloned()
        .collect()
}

/// Holds the current configuration and fans out change notifications.
#[derive(Debug)]
pub struct ConfigStore {
    current: ArcSwap<Snapshot>,
    changes: broadcast::Sender<ConfigChange>,
}

impl ConfigStore {
    /// Create a store from an initial configuration.
    pub fn new(config: GuardConfig) -> Result<Self, ConfigError> {
        validate_config(&config).map_err(ConfigError::Validation)?;
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Ok(Self {
            current: ArcSwap::from_pointee(Snapshot {
                revision: Uuid::new_v4(),
                config,
            }),
            changes,
        })
    }

    /// The snapshot in effect right now.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Effective policy record for a command key.
    pub fn command(&self, key: &str) -> CommandConfig {
        *self.current.load().config.command(key)
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChange> {
        self.changes.subscribe()
    }

    /// Validate and swap in a new configuration.
    ///
    /// Returns `Ok(None)` when the new configuration equals the current one;
    /// nothing is swapped or published in that case.
    pub fn apply(&self, config: GuardConfig) -> Result<Option<ConfigChange>, ConfigError> {
        if let Err(errors) = validate_config(&config) {
            metrics::record_config_reload("rejected");
            return Err(ConfigError::Validation(errors));
        }

        let previous = self.current.load_full();
        if previous.config == config {
            tracing::debug!(revision = %previous.revision, "Configuration unchanged");
            return Ok(None);
        }

        let revision = Uuid::new_v4();
        let change = ConfigChange::between(&previous.config, &config, revision);
        self.current.store(Arc::new(Snapshot { revision, config }));
        metrics::record_config_reload("applied");

        tracing::info!(
            %revision,
            commands = ?change.commands,
            pools = ?change.pools,
            defaults_changed = change.defaults_changed,
            "Configuration replaced"
        );

        // No subscribers is fine; the snapshot is read lazily anyway.
        let _ = self.changes.send(change.clone());
        Ok(Some(change))
    }

    /// Re-read a config file and apply it.
    pub fn reload_from(&self, path: &Path) -> Result<Option<ConfigChange>, ConfigError> {
        match load_config(path) {
            Ok(config) => self.apply(config),
            Err(e) => {
                metrics::record_config_reload("rejected");
                Err(e)
            }
        }
    }

    /// Apply configurations arriving from a watcher until the feed closes or
    /// shutdown is signalled.
    pub async fn follow(
        self: Arc<Self>,
        mut updates: mpsc::UnboundedReceiver<GuardConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                update = updates.recv() => {
                    let Some(config) = update else { break };
                    if let Err(e) = self.apply(config) {
                        tracing::error!("Rejected configuration update: {}. Keeping current configuration.", e);
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
        tracing::debug!("Configuration feed stopped");
    }
}

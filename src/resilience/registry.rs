//! Per-command breaker state.
//!
//! # Responsibilities
//! - Map each command key to its {metric window, circuit breaker, bulkhead}
//! - Map each pool key to its worker pool
//! - Create both lazily on first use; keep them for the process lifetime
//! - Publish circuit transitions and export a metrics snapshot
//! - Follow the config change feed and rebuild windows whose geometry moved

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::{ConfigChange, ConfigStore, GuardConfig, IsolationStrategy, Snapshot};
use crate::resilience::bulkhead::{Bulkhead, Compartment};
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitEvent, CircuitState};
use crate::resilience::command::Command;
use crate::resilience::metric_window::{MetricWindow, RollingCounts};
use crate::resilience::policy::Policy;
use crate::resilience::worker_pool::{PoolSnapshot, WorkerPool};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct FallbackCounters {
    success: AtomicU64,
    failure: AtomicU64,
    rejected: AtomicU64,
}

/// Cumulative fallback results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FallbackCounts {
    pub success: u64,
    pub failure: u64,
    pub rejected: u64,
}

/// How a fallback attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackResult {
    Success,
    Failure,
    Rejected,
}

/// Shared breaker state of one command key.
#[derive(Debug)]
pub struct CommandState {
    key: String,
    group: String,
    pool: String,
    breaker: CircuitBreaker,
    bulkhead: Arc<Bulkhead>,
    window: ArcSwap<MetricWindow>,
    fallbacks: FallbackCounters,
}

impl CommandState {
    fn new(command: &Command, policy: &Policy, events: broadcast::Sender<CircuitEvent>) -> Self {
        Self {
            key: command.key().to_string(),
            group: command.group().to_string(),
            pool: command.pool().to_string(),
            breaker: CircuitBreaker::new(command.key(), events),
            bulkhead: Arc::new(Bulkhead::new()),
            window: ArcSwap::from_pointee(build_window(command.key(), policy)),
            fallbacks: FallbackCounters::default(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn pool(&self) -> &str {
        &self.pool
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn bulkhead(&self) -> &Arc<Bulkhead> {
        &self.bulkhead
    }

    /// The rolling window currently in use.
    pub fn window(&self) -> Arc<MetricWindow> {
        self.window.load_full()
    }

    pub fn fallback_counts(&self) -> FallbackCounts {
        FallbackCounts {
            success: self.fallbacks.success.load(Ordering::Relaxed),
            failure: self.fallbacks.failure.load(Ordering::Relaxed),
            rejected: self.fallbacks.rejected.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_fallback(&self, result: FallbackResult) {
        let counter = match result {
            FallbackResult::Success => &self.fallbacks.success,
            FallbackResult::Failure => &self.fallbacks.failure,
            FallbackResult::Rejected => &self.fallbacks.rejected,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Replace the window if the policy asks for a different geometry.
    fn rebuild_window(&self, policy: &Policy) -> bool {
        if self.window.load().geometry() == (policy.window, policy.buckets) {
            return false;
        }
        self.window.store(Arc::new(build_window(&self.key, policy)));
        tracing::info!(
            command = %self.key,
            window_ms = policy.window.as_millis() as u64,
            buckets = policy.buckets,
            "Rolling window rebuilt"
        );
        true
    }

    pub fn snapshot(&self, config: &GuardConfig) -> CommandSnapshot {
        let command = config.command(&self.key);
        let rolling = self.window().counts();
        let (window, buckets) = self.window.load().geometry();
        CommandSnapshot {
            command: self.key.clone(),
            group: self.group.clone(),
            pool: self.pool.clone(),
            state: self.breaker.state(),
            isolation: command.isolation_strategy,
            rolling,
            request_volume: rolling.total(),
            error_percentage: rolling.error_percentage(),
            window_ms: window.as_millis() as u64,
            buckets,
            fallback: self.fallback_counts(),
            executions: Utilisation {
                in_flight: self.bulkhead.in_flight(Compartment::Execution),
                max: command.max_concurrent_execution,
            },
            fallbacks: Utilisation {
                in_flight: self.bulkhead.in_flight(Compartment::Fallback),
                max: command.max_concurrent_fallback,
            },
            transitions: self.breaker.transitions(),
        }
    }
}

fn build_window(key: &str, policy: &Policy) -> MetricWindow {
    MetricWindow::new(policy.window, policy.buckets).unwrap_or_else(|e| {
        tracing::error!(command = %key, error = %e, "Invalid rolling window, using 10s/10 buckets");
        MetricWindow::default()
    })
}

/// In-flight versus allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Utilisation {
    pub in_flight: usize,
    pub max: usize,
}

/// Point-in-time view of one command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandSnapshot {
    pub command: String,
    pub group: String,
    pub pool: String,
    pub state: CircuitState,
    pub isolation: IsolationStrategy,
    pub rolling: RollingCounts,
    pub request_volume: u64,
    pub error_percentage: f64,
    pub window_ms: u64,
    pub buckets: u32,
    pub fallback: FallbackCounts,
    pub executions: Utilisation,
    pub fallbacks: Utilisation,
    pub transitions: u64,
}

/// Point-in-time view of every command and pool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub revision: Uuid,
    pub commands: Vec<CommandSnapshot>,
    pub pools: Vec<PoolSnapshot>,
}

/// Registry of command and pool state.
#[derive(Debug)]
pub struct Registry {
    commands: DashMap<String, Arc<CommandState>>,
    pools: DashMap<String, Arc<WorkerPool>>,
    events: broadcast::Sender<CircuitEvent>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            commands: DashMap::new(),
            pools: DashMap::new(),
            events,
        }
    }

    /// State for `command`, created with `policy` on first use.
    ///
    /// An existing window whose geometry no longer matches `policy` is
    /// replaced here, so a reload reaches the next dispatch even when no
    /// [`follow_config`](Self::follow_config) task is running.
    pub fn command(&self, command: &Command, policy: &Policy) -> Arc<CommandState> {
        if let Some(state) = self.commands.get(command.key()) {
            let state = state.value().clone();
            state.rebuild_window(policy);
            return state;
        }
        self.commands
            .entry(command.key().to_string())
            .or_insert_with(|| {
                tracing::info!(
                    command = %command.key(),
                    group = %command.group(),
                    pool = %command.pool(),
                    "Registered command"
                );
                Arc::new(CommandState::new(command, policy, self.events.clone()))
            })
            .value()
            .clone()
    }

    /// Existing state for a key, if the command ever ran.
    pub fn get(&self, key: &str) -> Option<Arc<CommandState>> {
        self.commands.get(key).map(|r| r.value().clone())
    }

    /// Worker pool for `key`, created on first use.
    pub fn pool(&self, key: &str) -> Arc<WorkerPool> {
        if let Some(pool) = self.pools.get(key) {
            return pool.value().clone();
        }
        self.pools
            .entry(key.to_string())
            .or_insert_with(|| {
                tracing::info!(pool = %key, "Created worker pool");
                Arc::new(WorkerPool::new(key))
            })
            .value()
            .clone()
    }

    /// Subscribe to circuit transitions of every command.
    pub fn subscribe_events(&self) -> broadcast::Receiver<CircuitEvent> {
        self.events.subscribe()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Snapshot of every command and pool, sorted by key.
    pub fn snapshot(&self, config: &Snapshot) -> MetricsSnapshot {
        let mut commands: Vec<CommandSnapshot> = self
            .commands
            .iter()
            .map(|r| r.value().snapshot(&config.config))
            .collect();
        commands.sort_by(|a, b| a.command.cmp(&b.command));

        let mut pools: Vec<PoolSnapshot> = self
            .pools
            .iter()
            .map(|r| {
                let pool = r.value();
                pool.snapshot(self.pool_core_size(&config.config, pool.key()))
            })
            .collect();
        pools.sort_by(|a, b| a.pool.cmp(&b.pool));

        MetricsSnapshot {
            revision: config.revision,
            commands,
            pools,
        }
    }

    fn pool_core_size(&self, config: &GuardConfig, pool: &str) -> usize {
        let owner = self
            .commands
            .iter()
            .find(|r| r.value().pool() == pool)
            .map(|r| *config.command(r.key()))
            .unwrap_or(config.defaults);
        config.pool_core_size(pool, &owner)
    }

    /// Bring existing command state in line with a new configuration.
    ///
    /// Returns the number of rolling windows rebuilt.
    pub fn apply_config(&self, config: &GuardConfig, change: &ConfigChange) -> usize {
        let mut rebuilt = 0;
        for r in self.commands.iter() {
            let state = r.value();
            if !change.affects(state.key()) {
                continue;
            }
            let policy = Policy::derive(config.command(state.key()));
            tracing::debug!(command = %state.key(), revision = %change.revision, "Policy reloaded");
            if state.rebuild_window(&policy) {
                rebuilt += 1;
            }
        }
        rebuilt
    }

    /// Consume the config change feed until shutdown.
    pub async fn follow_config(
        self: Arc<Self>,
        store: Arc<ConfigStore>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut changes = store.subscribe();
        loop {
            tokio::select! {
                change = changes.recv() => match change {
                    Ok(change) => {
                        let snapshot = store.snapshot();
                        self.apply_config(&snapshot.config, &change);
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "Config feed lagged, re-applying current snapshot");
                        let snapshot = store.snapshot();
                        let everything = ConfigChange {
                            revision: snapshot.revision,
                            commands: Vec::new(),
                            pools: Vec::new(),
                            defaults_changed: true,
                        };
                        self.apply_config(&snapshot.config, &everything);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = shutdown.recv() => break,
            }
        }
        tracing::debug!("Registry stopped following configuration");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CommandConfig;
    use crate::resilience::metric_window::Outcome;

    fn policy() -> Policy {
        Policy::derive(&CommandConfig::default())
    }

    #[tokio::test]
    async fn test_same_key_shares_state() {
        let registry = Registry::new();
        let a = registry.command(&Command::new("test"), &policy());
        let b = registry.command(&Command::new("test"), &policy());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);

        let p1 = registry.pool("io");
        let p2 = registry.pool("io");
        assert!(Arc::ptr_eq(&p1, &p2));
    }

    #[tokio::test]
    async fn test_first_registration_fixes_group_and_pool() {
        let registry = Registry::new();
        let state = registry.command(&Command::new("test").with_group("hystrix"), &policy());
        assert_eq!(state.group(), "hystrix");
        assert_eq!(state.pool(), "hystrix");
    }

    #[tokio::test]
    async fn test_geometry_change_rebuilds_window() {
        let registry = Registry::new();
        let state = registry.command(&Command::new("test"), &policy());
        state.window().record(Outcome::Failure);

        let mut config = GuardConfig::default();
        config.commands.insert(
            "test".into(),
            CommandConfig {
                rolling_window_ms: 5_000,
                ..CommandConfig::default()
            },
        );
        let change = ConfigChange {
            revision: Uuid::new_v4(),
            commands: vec!["test".into()],
            pools: Vec::new(),
            defaults_changed: false,
        };

        assert_eq!(registry.apply_config(&config, &change), 1);
        assert_eq!(state.window().geometry().0.as_millis(), 5_000);
        assert_eq!(state.window().request_volume(), 0);

        // Same geometry again: untouched.
        state.window().record(Outcome::Success);
        assert_eq!(registry.apply_config(&config, &change), 0);
        assert_eq!(state.window().request_volume(), 1);
    }

    #[tokio::test]
    async fn test_lookup_with_new_geometry_rebuilds_window() {
        let registry = Registry::new();
        let cmd = Command::new("test");
        let state = registry.command(&cmd, &policy());
        state.window().record(Outcome::Failure);

        let shorter = Policy::derive(&CommandConfig {
            rolling_window_ms: 1_000,
            ..CommandConfig::default()
        });
        let again = registry.command(&cmd, &shorter);
        assert!(Arc::ptr_eq(&state, &again));
        assert_eq!(state.window().geometry().0.as_millis(), 1_000);
        assert_eq!(state.window().request_volume(), 0);
    }

    #[tokio::test]
    async fn test_snapshot_reports_limits() {
        let registry = Registry::new();
        let state = registry.command(&Command::new("test2"), &policy());
        let _permit = state.bulkhead().try_acquire_execution(3).unwrap();
        state.window().record(Outcome::Success);
        state.record_fallback(FallbackResult::Rejected);
        registry.pool("test2");

        let mut config = GuardConfig::default();
        config.commands.insert(
            "test2".into(),
            CommandConfig {
                max_concurrent_execution: 3,
                pool_core_size: 4,
                ..CommandConfig::default()
            },
        );
        let store = ConfigStore::new(config).unwrap();
        let snap = registry.snapshot(&store.snapshot());

        let cmd = &snap.commands[0];
        assert_eq!(cmd.command, "test2");
        assert_eq!(cmd.state, CircuitState::Closed);
        assert_eq!(cmd.executions, Utilisation { in_flight: 1, max: 3 });
        assert_eq!(cmd.request_volume, 1);
        assert_eq!(cmd.fallback.rejected, 1);
        assert_eq!(snap.pools[0].core_size, 4);
        assert_eq!(snap.revision, store.snapshot().revision);
    }

    #[tokio::test]
    async fn test_follow_config_rebuilds_on_change() {
        let registry = Arc::new(Registry::new());
        let store = Arc::new(ConfigStore::new(GuardConfig::default()).unwrap());
        let state = registry.command(&Command::new("test"), &policy());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(registry.clone().follow_config(store.clone(), shutdown_rx));
        tokio::task::yield_now().await;

        let mut config = GuardConfig::default();
        config.defaults.rolling_window_ms = 2_000;
        store.apply(config).unwrap();

        for _ in 0..50 {
            if state.window().geometry().0.as_millis() == 2_000 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(state.window().geometry().0.as_millis(), 2_000);

        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
    }
}

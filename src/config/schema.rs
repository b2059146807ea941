//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the guard.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct GuardConfig {
    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Policy applied to every command without its own record.
    pub defaults: CommandConfig,

    /// Per-command policy records, keyed by command key. When loaded from a
    /// file, fields a record leaves unset come from `defaults`.
    pub commands: HashMap<String, CommandConfig>,

    /// Worker pool sizing, keyed by pool key.
    pub pools: HashMap<String, PoolConfig>,
}

impl GuardConfig {
    /// Resolve the policy record for a command key.
    pub fn command(&self, key: &str) -> &CommandConfig {
        self.commands.get(key).unwrap_or(&self.defaults)
    }

    /// Effective core size of a worker pool.
    ///
    /// An explicit `[pools.<key>]` record wins over the invoking command's
    /// `pool_core_size`.
    pub fn pool_core_size(&self, pool: &str, command: &CommandConfig) -> usize {
        self.pools
            .get(pool)
            .map(|p| p.core_size)
            .unwrap_or(command.pool_core_size)
    }

    /// Copy with secrets masked, for logging and the admin API.
    pub fn redacted(&self) -> Self {
        let mut c = self.clone();
        if !c.admin.api_key.is_empty() {
            c.admin.api_key = "***".into();
        }
        c
    }
}

/// How guarded work is isolated from the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IsolationStrategy {
    /// Work runs as a separate task gated by a bounded worker pool.
    #[default]
    ThreadPool,
    /// Work runs inline in the caller's task, gated by a permit count.
    Semaphore,
}

/// Circuit breaker and bulkhead policy for one command.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CommandConfig {
    /// Whether the circuit breaker may trip at all.
    pub circuit_breaker_enabled: bool,

    /// Minimum requests in the rolling window before the error ratio counts.
    pub request_volume_threshold: u64,

    /// Error percentage (0-100) at or above which the circuit opens.
    pub error_threshold_percentage: u32,

    /// Rolling statistical window length in milliseconds.
    pub rolling_window_ms: u64,

    /// Number of buckets the rolling window is split into.
    pub rolling_window_buckets: u32,

    /// How long an open circuit rejects before admitting a trial.
    pub sleep_window_ms: u64,

    /// Isolation strategy for the guarded work.
    pub isolation_strategy: IsolationStrategy,

    /// Maximum concurrent executions of the guarded work.
    pub max_concurrent_execution: usize,

    /// Maximum concurrent executions of the fallback.
    pub max_concurrent_fallback: usize,

    /// Worker pool size when no `[pools]` record exists (thread pool only).
    pub pool_core_size: usize,

    /// Execution deadline in milliseconds.
    pub execution_timeout_ms: u64,

    /// Whether the execution deadline is enforced.
    pub execution_timeout_enabled: bool,

    /// Whether the fallback runs on non-success outcomes.
    pub fallback_enabled: bool,

    /// Reject every call regardless of statistics.
    pub force_open: bool,

    /// Admit every call regardless of statistics.
    pub force_closed: bool,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            circuit_breaker_enabled: true,
            request_volume_threshold: 20,
            error_threshold_percentage: 50,
            rolling_window_ms: 10_000,
            rolling_window_buckets: 10,
            sleep_window_ms: 5_000,
            isolation_strategy: IsolationStrategy::ThreadPool,
            max_concurrent_execution: 10,
            max_concurrent_fallback: 10,
            pool_core_size: 10,
            execution_timeout_ms: 1_000,
            execution_timeout_enabled: true,
            fallback_enabled: true,
            force_open: false,
            force_closed: false,
        }
    }
}

impl CommandConfig {
    /// Rolling window geometry as `(length_ms, buckets)`.
    pub fn window_geometry(&self) -> (u64, u32) {
        (self.rolling_window_ms, self.rolling_window_buckets)
    }
}

/// Worker pool sizing.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum concurrently running tasks in the pool.
    pub core_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { core_size: 10 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

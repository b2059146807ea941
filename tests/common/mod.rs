//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::convert::Infallible;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use command_guard::config::{CommandConfig, ConfigStore, GuardConfig, IsolationStrategy};
use command_guard::resilience::{Dispatcher, FailureKind, Registry};

/// A dispatcher over a fresh registry and store.
pub fn dispatcher(config: GuardConfig) -> Dispatcher {
    let store = Arc::new(ConfigStore::new(config).expect("valid config"));
    Dispatcher::new(Arc::new(Registry::new()), store)
}

/// A config whose defaults are `command`.
pub fn with_defaults(command: CommandConfig) -> GuardConfig {
    GuardConfig {
        defaults: command,
        ..GuardConfig::default()
    }
}

/// Semaphore isolation with the breaker thresholds from the demo.
pub fn semaphore(volume: u64, percentage: u32) -> CommandConfig {
    CommandConfig {
        isolation_strategy: IsolationStrategy::Semaphore,
        request_volume_threshold: volume,
        error_threshold_percentage: percentage,
        rolling_window_ms: 5_000,
        sleep_window_ms: 2_000,
        ..CommandConfig::default()
    }
}

pub async fn succeed() -> Result<String, io::Error> {
    Ok("NORMAL - ok".to_string())
}

pub async fn fail() -> Result<String, io::Error> {
    Err(io::Error::other("dependency down"))
}

pub async fn slow(delay: Duration) -> Result<String, io::Error> {
    tokio::time::sleep(delay).await;
    Ok("NORMAL - slow".to_string())
}

pub async fn fallback(cause: FailureKind) -> Result<String, Infallible> {
    Ok(format!("FALLBACK - {}", cause.label()))
}

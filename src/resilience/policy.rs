//! Derived thresholds for one command.
//!
//! [`Policy::derive`] is a pure function of a [`CommandConfig`]; a config
//! reload produces a new policy on the next dispatch, nothing is patched.

use std::time::Duration;

use crate::config::{CommandConfig, IsolationStrategy};
use crate::resilience::metric_window::RollingCounts;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Policy {
    pub circuit_enabled: bool,
    pub force_open: bool,
    pub force_closed: bool,
    pub request_volume_threshold: u64,
    pub error_threshold_percentage: f64,
    pub window: Duration,
    pub buckets: u32,
    pub sleep_window: Duration,
    /// `None` when the execution deadline is disabled.
    pub timeout: Option<Duration>,
    pub isolation: IsolationStrategy,
    pub max_concurrent_execution: usize,
    pub max_concurrent_fallback: usize,
    pub fallback_enabled: bool,
}

impl Policy {
    pub fn derive(config: &CommandConfig) -> Self {
        Self {
            circuit_enabled: config.circuit_breaker_enabled,
            force_open: config.force_open,
            force_closed: config.force_closed,
            request_volume_threshold: config.request_volume_threshold,
            error_threshold_percentage: f64::from(config.error_threshold_percentage.min(100)),
            window: Duration::from_millis(config.rolling_window_ms),
            buckets: config.rolling_window_buckets,
            sleep_window: Duration::from_millis(config.sleep_window_ms),
            timeout: config
                .execution_timeout_enabled
                .then(|| Duration::from_millis(config.execution_timeout_ms)),
            isolation: config.isolation_strategy,
            max_concurrent_execution: config.max_concurrent_execution,
            max_concurrent_fallback: config.max_concurrent_fallback,
            fallback_enabled: config.fallback_enabled,
        }
    }

    /// Whether rolling statistics warrant opening a closed circuit.
    pub fn should_trip(&self, counts: &RollingCounts) -> bool {
        let volume = counts.total();
        volume > 0
            && volume >= self.request_volume_threshold
            && counts.error_percentage() >= self.error_threshold_percentage
    }
}

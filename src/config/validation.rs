//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (percentages, durations > 0, sizes > 0)
//! - Validate bind addresses
//! - Detect contradictory flags
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GuardConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{CommandConfig, GuardConfig};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem, located by its config path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GuardConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_command("defaults", &config.defaults, &mut errors);

    let mut keys: Vec<&String> = config.commands.keys().collect();
    keys.sort();
    for key in keys {
        if key.trim().is_empty() {
            errors.push(ValidationError::new("commands", "command key must not be empty"));
        }
        validate_command(&format!("commands.{key}"), &config.commands[key], &mut errors);
    }

    let mut pools: Vec<&String> = config.pools.keys().collect();
    pools.sort();
    for key in pools {
        if config.pools[key].core_size == 0 {
            errors.push(ValidationError::new(
                format!("pools.{key}.core_size"),
                "must be greater than zero",
            ));
        }
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", config.observability.log_level),
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "not a socket address",
        ));
    }

    if config.admin.enabled {
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::new("admin.api_key", "must not be empty"));
        }
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new("admin.bind_address", "not a socket address"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_command(path: &str, c: &CommandConfig, errors: &mut Vec<ValidationError>) {
    let mut positive = |field: &str, value: u64| {
        if value == 0 {
            errors.push(ValidationError::new(
                format!("{path}.{field}"),
                "must be greater than zero",
            ));
        }
    };
    positive("rolling_window_ms", c.rolling_window_ms);
    positive("rolling_window_buckets", c.rolling_window_buckets as u64);
    positive("sleep_window_ms", c.sleep_window_ms);
    positive("max_concurrent_execution", c.max_concurrent_execution as u64);
    positive("max_concurrent_fallback", c.max_concurrent_fallback as u64);
    positive("pool_core_size", c.pool_core_size as u64);
    if c.execution_timeout_enabled {
        positive("execution_timeout_ms", c.execution_timeout_ms);
    }

    if c.error_threshold_percentage > 100 {
        errors.push(ValidationError::new(
            format!("{path}.error_threshold_percentage"),
            "must be between 0 and 100",
        ));
    }

    let (window, buckets) = c.window_geometry();
    if window > 0 && buckets > 0 && window % buckets as u64 != 0 {
        errors.push(ValidationError::new(
            format!("{path}.rolling_window_buckets"),
            format!("{window}ms window does not divide evenly into {buckets} buckets"),
        ));
    }

    if c.force_open && c.force_closed {
        errors.push(ValidationError::new(
            format!("{path}.force_open"),
            "force_open and force_closed are mutually exclusive",
        ));
    }
}

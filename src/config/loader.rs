//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::GuardConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
///
/// Fields a `[commands.<key>]` record leaves unset are taken from
/// `[defaults]`, then from the built-in defaults.
pub fn parse_config(content: &str) -> Result<GuardConfig, ConfigError> {
    let mut table: toml::Table = toml::from_str(content)?;
    inherit_defaults(&mut table);
    let config: GuardConfig = toml::Value::Table(table).try_into()?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

fn inherit_defaults(table: &mut toml::Table) {
    let Some(toml::Value::Table(defaults)) = table.get("defaults").cloned() else {
        return;
    };
    let Some(toml::Value::Table(commands)) = table.get_mut("commands") else {
        return;
    };
    for (_, record) in commands.iter_mut() {
        let toml::Value::Table(record) = record else {
            continue;
        };
        for (field, value) in &defaults {
            if !record.contains_key(field) {
                record.insert(field.clone(), value.clone());
            }
        }
    }
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GuardConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

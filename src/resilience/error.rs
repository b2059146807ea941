//! Dispatch error types.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::resilience::metric_window::Outcome;

/// Boxed error returned by guarded work or a fallback.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why the guarded work did not produce a normal result.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureKind {
    /// The circuit is open (or a half-open trial is already in flight).
    #[error("short-circuited: circuit is open")]
    CircuitOpen,

    /// No execution permit or worker pool slot was available.
    #[error("rejected: bulkhead is full")]
    BulkheadFull,

    /// The work returned an error or panicked.
    #[error("execution failed: {0}")]
    ExecutionFailure(String),

    /// The work exceeded its deadline; its result was discarded.
    #[error("execution timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

impl FailureKind {
    /// The outcome this failure records into the rolling window.
    pub fn outcome(&self) -> Outcome {
        match self {
            Self::CircuitOpen | Self::BulkheadFull => Outcome::Rejected,
            Self::ExecutionFailure(_) => Outcome::Failure,
            Self::Timeout(_) => Outcome::Timeout,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::CircuitOpen => "circuit_open",
            Self::BulkheadFull => "bulkhead_full",
            Self::ExecutionFailure(_) => "execution_failure",
            Self::Timeout(_) => "timeout",
        }
    }
}

/// Terminal errors surfaced to the caller.
///
/// Everything else is recovered by running the fallback.
#[derive(Debug, Error)]
pub enum GuardError {
    /// The fallback is disabled or its bulkhead is full.
    #[error("command {command}: fallback unavailable after {cause}")]
    FallbackUnavailable { command: String, cause: FailureKind },

    /// The fallback itself returned an error or panicked.
    #[error("command {command}: fallback failed after {cause}: {message}")]
    FallbackFailure {
        command: String,
        cause: FailureKind,
        message: String,
    },
}

impl GuardError {
    /// The failure that sent the call to its fallback.
    pub fn cause(&self) -> &FailureKind {
        match self {
            Self::FallbackUnavailable { cause, .. } | Self::FallbackFailure { cause, .. } => cause,
        }
    }

    pub fn command(&self) -> &str {
        match self {
            Self::FallbackUnavailable { command, .. } | Self::FallbackFailure { command, .. } => {
                command
            }
        }
    }
}

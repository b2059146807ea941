//! Command identity and dispatch results.

use crate::resilience::error::FailureKind;

/// Identity of a guarded operation.
///
/// The group defaults to the command key and the pool defaults to the group,
/// so commands of one group share a worker pool unless told otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Command {
    key: String,
    group: Option<String>,
    pool: Option<String>,
}

impl Command {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            group: None,
            pool: None,
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_pool(mut self, pool: impl Into<String>) -> Self {
        self.pool = Some(pool.into());
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn group(&self) -> &str {
        self.group.as_deref().unwrap_or(&self.key)
    }

    pub fn pool(&self) -> &str {
        self.pool.as_deref().unwrap_or_else(|| self.group())
    }
}

/// A value produced either by the work or by its fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult<T> {
    /// The work succeeded.
    Normal(T),
    /// The fallback answered after `cause`.
    Degraded { value: T, cause: FailureKind },
}

impl<T> CommandResult<T> {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    pub fn value(&self) -> &T {
        match self {
            Self::Normal(value) | Self::Degraded { value, .. } => value,
        }
    }

    pub fn cause(&self) -> Option<&FailureKind> {
        match self {
            Self::Normal(_) => None,
            Self::Degraded { cause, .. } => Some(cause),
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Self::Normal(value) | Self::Degraded { value, .. } => value,
        }
    }
}

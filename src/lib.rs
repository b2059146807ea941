//! Circuit-breaker and bulkhead dispatch core with a hot-reloaded policy
//! configuration.

pub mod admin;
pub mod config;
pub mod demo;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::{ConfigStore, GuardConfig};
pub use lifecycle::Shutdown;
pub use resilience::{Command, CommandResult, Dispatcher, FailureKind, GuardError, Registry};

//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Guarded call:
//!     → dispatcher.rs (resolve policy + per-command state from registry.rs)
//!     → circuit_breaker.rs (admit, short-circuit while open)
//!     → bulkhead.rs / worker_pool.rs (bound concurrency)
//!     → timeouts.rs (enforce execution deadline)
//!     → metric_window.rs (record outcome, feed the breaker)
//!     → fallback on any non-success outcome
//! ```
//!
//! # Design Decisions
//! - State is per command key and shared by every caller of that key
//! - Policies are derived from the live config on every call
//! - Rejections are immediate; nothing queues
//! - Circuit breaker prevents cascading failures

pub mod bulkhead;
pub mod circuit_breaker;
pub mod command;
pub mod dispatcher;
pub mod error;
pub mod metric_window;
pub mod policy;
pub mod registry;
pub mod timeouts;
pub mod worker_pool;

pub use circuit_breaker::{CircuitEvent, CircuitState};
pub use command::{Command, CommandResult};
pub use dispatcher::Dispatcher;
pub use error::{BoxError, FailureKind, GuardError};
pub use metric_window::{MetricWindow, Outcome, RollingCounts};
pub use policy::Policy;
pub use registry::{CommandSnapshot, MetricsSnapshot, Registry};

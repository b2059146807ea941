//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GuardConfig (validated, immutable)
//!     → store.rs (ArcSwap<Snapshot>, read at dispatch time)
//!
//! On change (file event or SIGHUP):
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → store.rs swaps the snapshot
//!     → ConfigChange broadcast to subscribers
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full replacement
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - The dispatcher never waits on the change feed; it reads the latest snapshot

pub mod loader;
pub mod schema;
pub mod store;
pub mod validation;
pub mod watcher;

pub use loader::ConfigError;
pub use schema::{CommandConfig, GuardConfig, IsolationStrategy, PoolConfig};
pub use store::{ConfigChange, ConfigStore, Snapshot};

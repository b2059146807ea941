//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Admin API (registry snapshots)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Command key is a field on every dispatch event
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;

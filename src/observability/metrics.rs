//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define dispatch metrics (outcomes, fallbacks, transitions, latency)
//! - Expose a Prometheus-compatible metrics endpoint
//! - Track per-command metrics
//!
//! # Metrics
//! - `guard_outcomes_total` (counter): recorded outcomes by command, outcome
//! - `guard_fallbacks_total` (counter): fallback results by command, result
//! - `guard_circuit_transitions_total` (counter): transitions by command, target state
//! - `guard_circuit_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `guard_execution_duration_seconds` (histogram): time spent running work
//! - `guard_config_reloads_total` (counter): reload attempts by result
//!
//! # Design Decisions
//! - Recording without an installed exporter is a no-op
//! - Labels are command keys and fixed label values only

use std::net::SocketAddr;
use std::sync::Once;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::resilience::circuit_breaker::CircuitState;
use crate::resilience::metric_window::Outcome;

static DESCRIBE: Once = Once::new();

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    describe();
    tracing::info!(address = %addr, "Prometheus exporter listening");
    Ok(())
}

fn describe() {
    DESCRIBE.call_once(|| {
        metrics::describe_counter!("guard_outcomes_total", "Outcomes recorded per command");
        metrics::describe_counter!("guard_fallbacks_total", "Fallback results per command");
        metrics::describe_counter!(
            "guard_circuit_transitions_total",
            "Circuit breaker state transitions"
        );
        metrics::describe_gauge!("guard_circuit_state", "Current circuit breaker state");
        metrics::describe_histogram!(
            "guard_execution_duration_seconds",
            "Time spent running guarded work"
        );
        metrics::describe_counter!("guard_config_reloads_total", "Configuration reload attempts");
    });
}

pub fn record_outcome(command: &str, outcome: Outcome) {
    metrics::counter!(
        "guard_outcomes_total",
        "command" => command.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

pub fn record_execution_latency(command: &str, elapsed: Duration) {
    metrics::histogram!("guard_execution_duration_seconds", "command" => command.to_string())
        .record(elapsed.as_secs_f64());
}

/// `result` is one of `success`, `failure`, `rejected`, `disabled`.
pub fn record_fallback(command: &str, result: &'static str) {
    metrics::counter!(
        "guard_fallbacks_total",
        "command" => command.to_string(),
        "result" => result
    )
    .increment(1);
}

pub fn record_circuit_transition(command: &str, to: CircuitState) {
    let state = match to {
        CircuitState::Closed => "closed",
        CircuitState::Open => "open",
        CircuitState::HalfOpen => "half_open",
    };
    metrics::counter!(
        "guard_circuit_transitions_total",
        "command" => command.to_string(),
        "to" => state
    )
    .increment(1);
    metrics::gauge!("guard_circuit_state", "command" => command.to_string()).set(f64::from(to as u8));
}

/// `result` is `applied` or `rejected`.
pub fn record_config_reload(result: &'static str) {
    metrics::counter!("guard_config_reloads_total", "result" => result).increment(1);
}

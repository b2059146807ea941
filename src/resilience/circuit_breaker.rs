//! Circuit breaker for guarded commands.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: calls fail fast without running the work
//! - Half-Open: a single trial call tests whether the dependency recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: volume >= threshold AND error % >= threshold, after each outcome
//! Open → Half-Open: first admission attempt after the sleep window
//! Half-Open → Closed: trial succeeds
//! Half-Open → Open: trial fails (sleep window restarts)
//! ```
//!
//! # Design Decisions
//! - Per-command circuit breaker (not global)
//! - No background timer; Open → Half-Open is checked lazily on admission
//! - Every transition is a compare-and-set on the state byte, so exactly one
//!   caller wins the Half-Open trial
//! - Transitions are broadcast as events and never block callers

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::observability::metrics;
use crate::resilience::metric_window::RollingCounts;
use crate::resilience::policy::Policy;

/// Circuit state.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(val: u8) -> Self {
        match val {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Admission decision for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Run normally.
    Allowed,
    /// Run as the single Half-Open trial; the caller must settle it.
    Trial,
    /// Short-circuit.
    Rejected,
}

/// A recorded state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitEvent {
    pub command: String,
    pub from: CircuitState,
    pub to: CircuitState,
}

/// Lock-free three-state circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    command: String,
    origin: Instant,
    state: AtomicU8,
    /// Milliseconds after `origin` at which the circuit last opened.
    opened_at_ms: AtomicU64,
    transitions: AtomicU64,
    events: broadcast::Sender<CircuitEvent>,
}

impl CircuitBreaker {
    /// Create a closed breaker publishing transitions on `events`.
    pub fn new(command: impl Into<String>, events: broadcast::Sender<CircuitEvent>) -> Self {
        Self {
            command: command.into(),
            origin: Instant::now(),
            state: AtomicU8::new(CircuitState::Closed as u8),
            opened_at_ms: AtomicU64::new(0),
            transitions: AtomicU64::new(0),
            events,
        }
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Number of transitions since creation.
    pub fn transitions(&self) -> u64 {
        self.transitions.load(Ordering::Relaxed)
    }

    /// Decide whether a call may run.
    pub fn admit(&self, policy: &Policy) -> Admission {
        if policy.force_open {
            return Admission::Rejected;
        }
        if policy.force_closed || !policy.circuit_enabled {
            return Admission::Allowed;
        }

        match self.state() {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::HalfOpen => Admission::Rejected,
            CircuitState::Open => {
                if self.since_opened_ms() < policy.sleep_window.as_millis() as u64 {
                    return Admission::Rejected;
                }
                if self.transition(CircuitState::Open, CircuitState::HalfOpen) {
                    Admission::Trial
                } else {
                    Admission::Rejected
                }
            }
        }
    }

    /// Trip a closed circuit if the statistics warrant it.
    ///
    /// Returns `true` if this call opened the circuit.
    pub fn evaluate(&self, policy: &Policy, counts: &RollingCounts) -> bool {
        if !policy.circuit_enabled || policy.force_closed {
            return false;
        }
        if self.state() != CircuitState::Closed || !policy.should_trip(counts) {
            return false;
        }
        // Stamp before publishing Open so admissions never see a stale time.
        self.stamp_opened();
        let tripped = self.transition(CircuitState::Closed, CircuitState::Open);
        if tripped {
            tracing::warn!(
                command = %self.command,
                volume = counts.total(),
                error_percentage = counts.error_percentage(),
                "Error threshold reached"
            );
        }
        tripped
    }

    /// Settle a successful trial.
    pub fn trial_succeeded(&self) -> bool {
        self.transition(CircuitState::HalfOpen, CircuitState::Closed)
    }

    /// Settle a failed trial; the sleep window restarts.
    pub fn trial_failed(&self) -> bool {
        self.stamp_opened();
        self.transition(CircuitState::HalfOpen, CircuitState::Open)
    }

    fn stamp_opened(&self) {
        let now = Instant::now().saturating_duration_since(self.origin).as_millis() as u64;
        self.opened_at_ms.store(now, Ordering::Release);
    }

    fn since_opened_ms(&self) -> u64 {
        let now = Instant::now().saturating_duration_since(self.origin).as_millis() as u64;
        now.saturating_sub(self.opened_at_ms.load(Ordering::Acquire))
    }

    fn transition(&self, from: CircuitState, to: CircuitState) -> bool {
        if self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        self.transitions.fetch_add(1, Ordering::Relaxed);
        metrics::record_circuit_transition(&self.command, to);
        match to {
            CircuitState::Closed => {
                tracing::info!(command = %self.command, %from, "Circuit breaker → closed")
            }
            CircuitState::HalfOpen => {
                tracing::info!(command = %self.command, %from, "Circuit breaker → half-open")
            }
            CircuitState::Open => {
                tracing::warn!(command = %self.command, %from, "Circuit breaker → open")
            }
        }
        // Nobody listening is fine.
        let _ = self.events.send(CircuitEvent {
            command: self.command.clone(),
            from,
            to,
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CommandConfig;
    use std::sync::Arc;
    use std::time::Duration;

    fn policy() -> Policy {
        Policy::derive(&CommandConfig {
            request_volume_threshold: 3,
            error_threshold_percentage: 10,
            sleep_window_ms: 2_000,
            ..CommandConfig::default()
        })
    }

    fn failing() -> RollingCounts {
        RollingCounts {
            success: 1,
            failure: 3,
            ..RollingCounts::default()
        }
    }

    fn breaker() -> (CircuitBreaker, broadcast::Receiver<CircuitEvent>) {
        let (tx, rx) = broadcast::channel(16);
        (CircuitBreaker::new("test", tx), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_starts_closed() {
        let (cb, _rx) = breaker();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.admit(&policy()), Admission::Allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trips_and_rejects_during_sleep_window() {
        let (cb, mut rx) = breaker();
        let p = policy();
        assert!(cb.evaluate(&p, &failing()));
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.admit(&p), Admission::Rejected);

        tokio::time::advance(Duration::from_millis(1_999)).await;
        assert_eq!(cb.admit(&p), Admission::Rejected);

        let event = rx.try_recv().unwrap();
        assert_eq!((event.from, event.to), (CircuitState::Closed, CircuitState::Open));
    }

    #[tokio::test(start_paused = true)]
    async fn test_below_threshold_stays_closed() {
        let (cb, _rx) = breaker();
        let counts = RollingCounts {
            failure: 2,
            ..RollingCounts::default()
        };
        assert!(!cb.evaluate(&policy(), &counts));
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_trial_after_sleep_window() {
        let (cb, _rx) = breaker();
        let p = policy();
        cb.evaluate(&p, &failing());
        tokio::time::advance(Duration::from_millis(2_000)).await;

        assert_eq!(cb.admit(&p), Admission::Trial);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert_eq!(cb.admit(&p), Admission::Rejected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trial_success_closes() {
        let (cb, _rx) = breaker();
        let p = policy();
        cb.evaluate(&p, &failing());
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(cb.admit(&p), Admission::Trial);

        assert!(cb.trial_succeeded());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.transitions(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trial_failure_restarts_sleep_window() {
        let (cb, _rx) = breaker();
        let p = policy();
        cb.evaluate(&p, &failing());
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(cb.admit(&p), Admission::Trial);

        assert!(cb.trial_failed());
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.admit(&p), Admission::Rejected);

        tokio::time::advance(Duration::from_millis(1_500)).await;
        assert_eq!(cb.admit(&p), Admission::Rejected);
        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(cb.admit(&p), Admission::Trial);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_states() {
        let (cb, _rx) = breaker();
        let mut p = policy();
        p.force_open = true;
        assert_eq!(cb.admit(&p), Admission::Rejected);

        let mut p = policy();
        p.force_closed = true;
        assert!(!cb.evaluate(&p, &failing()));
        assert_eq!(cb.admit(&p), Admission::Allowed);

        let mut p = policy();
        p.circuit_enabled = false;
        assert!(!cb.evaluate(&p, &failing()));
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_exactly_one_trial_under_contention() {
        let (tx, _rx) = broadcast::channel(16);
        let cb = Arc::new(CircuitBreaker::new("race", tx));
        let mut p = policy();
        p.sleep_window = Duration::ZERO;
        cb.evaluate(&p, &failing());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cb = cb.clone();
                std::thread::spawn(move || cb.admit(&p))
            })
            .collect();
        let trials = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|a| *a == Admission::Trial)
            .count();
        assert_eq!(trials, 1);
    }
}

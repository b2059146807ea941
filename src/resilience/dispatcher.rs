//! Command dispatch.
//!
//! # Responsibilities
//! - Resolve the live policy and shared state of a command
//! - Admit, isolate and time out the work
//! - Record exactly one outcome per call and drive the breaker with it
//! - Run the fallback on every non-success outcome
//!
//! # Data Flow
//! ```text
//! execute(command, work, fallback)
//!     → circuit_breaker.rs (admission; OPEN → CircuitOpen)
//!     → bulkhead.rs (execution permit; full → BulkheadFull)
//!     → worker_pool.rs (thread_pool isolation only; saturated → BulkheadFull)
//!     → timeouts.rs (deadline; elapsed → Timeout)
//!     → metric_window.rs (record outcome) → circuit_breaker.rs (evaluate / settle trial)
//!     → on failure: bulkhead.rs (fallback permit) → fallback
//! ```
//!
//! # Design Decisions
//! - The outcome is recorded before the fallback runs, so fallbacks never
//!   affect circuit statistics
//! - Panics in work or fallback are caught and reported as failures
//! - A half-open trial that is dropped before settling reopens the circuit

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::time::Instant;

use crate::config::{CommandConfig, ConfigStore, IsolationStrategy, Snapshot};
use crate::observability::metrics;
use crate::resilience::circuit_breaker::{Admission, CircuitBreaker};
use crate::resilience::command::{Command, CommandResult};
use crate::resilience::error::{BoxError, FailureKind, GuardError};
use crate::resilience::metric_window::Outcome;
use crate::resilience::policy::Policy;
use crate::resilience::registry::{CommandState, FallbackResult, Registry};
use crate::resilience::timeouts::run_with_timeout;

/// Entry point for guarded work.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    config: Arc<ConfigStore>,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, config: Arc<ConfigStore>) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    /// Run `work` under the command's breaker, bulkhead and timeout.
    ///
    /// On any failure `fallback` is called with the reason. Only a missing or
    /// failing fallback reaches the caller as an error.
    pub async fn execute<T, E, F, Fut, Fb, FbFut, E2>(
        &self,
        command: &Command,
        work: F,
        fallback: Fb,
    ) -> Result<CommandResult<T>, GuardError>
    where
        T: Send + 'static,
        E: Into<BoxError> + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        Fb: FnOnce(FailureKind) -> FbFut,
        FbFut: Future<Output = Result<T, E2>>,
        E2: Into<BoxError>,
    {
        let snapshot = self.config.snapshot();
        let config = *snapshot.config.command(command.key());
        let policy = Policy::derive(&config);
        let state = self.registry.command(command, &policy);

        let admission = state.breaker().admit(&policy);
        if admission == Admission::Rejected {
            tracing::debug!(command = %state.key(), state = %state.breaker().state(), "Short-circuited");
            settle(&state, &policy, None, Outcome::Rejected);
            return self
                .fallback(&state, &policy, FailureKind::CircuitOpen, fallback)
                .await;
        }

        let trial = (admission == Admission::Trial).then(|| TrialGuard::new(state.breaker()));
        let result = self.run(&snapshot, &state, &config, &policy, work).await;
        let outcome = match &result {
            Ok(_) => Outcome::Success,
            Err(cause) => cause.outcome(),
        };
        settle(&state, &policy, trial, outcome);

        match result {
            Ok(value) => Ok(CommandResult::Normal(value)),
            Err(cause) => {
                tracing::debug!(command = %state.key(), cause = %cause, "Execution did not succeed");
                self.fallback(&state, &policy, cause, fallback).await
            }
        }
    }

    async fn run<T, E, F, Fut>(
        &self,
        snapshot: &Snapshot,
        state: &CommandState,
        config: &CommandConfig,
        policy: &Policy,
        work: F,
    ) -> Result<T, FailureKind>
    where
        T: Send + 'static,
        E: Into<BoxError> + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let Some(_permit) = state
            .bulkhead()
            .try_acquire_execution(policy.max_concurrent_execution)
        else {
            tracing::debug!(
                command = %state.key(),
                max = policy.max_concurrent_execution,
                "Execution bulkhead full"
            );
            return Err(FailureKind::BulkheadFull);
        };

        let started = Instant::now();
        let result = match policy.isolation {
            IsolationStrategy::Semaphore => {
                let guarded = AssertUnwindSafe(async move { work().await }).catch_unwind();
                match run_with_timeout(policy.timeout, guarded).await {
                    Ok(Ok(Ok(value))) => Ok(value),
                    Ok(Ok(Err(e))) => Err(FailureKind::ExecutionFailure(error_message(e))),
                    Ok(Err(panic)) => Err(FailureKind::ExecutionFailure(panic_message(&*panic))),
                    Err(limit) => Err(FailureKind::Timeout(limit)),
                }
            }
            IsolationStrategy::ThreadPool => {
                let pool = self.registry.pool(state.pool());
                let core_size = snapshot.config.pool_core_size(state.pool(), config);
                let Some(slot) = pool.try_acquire(core_size) else {
                    return Err(FailureKind::BulkheadFull);
                };
                // Building the future runs caller code before anything is spawned.
                match std::panic::catch_unwind(AssertUnwindSafe(work)) {
                    Err(panic) => Err(FailureKind::ExecutionFailure(panic_message(&*panic))),
                    Ok(future) => match run_with_timeout(policy.timeout, slot.spawn(future)).await {
                        Ok(Ok(Ok(value))) => Ok(value),
                        Ok(Ok(Err(e))) => Err(FailureKind::ExecutionFailure(error_message(e))),
                        Ok(Err(join)) if join.is_panic() => Err(FailureKind::ExecutionFailure(
                            panic_message(&*join.into_panic()),
                        )),
                        Ok(Err(join)) => Err(FailureKind::ExecutionFailure(join.to_string())),
                        Err(limit) => {
                            tracing::warn!(
                                command = %state.key(),
                                pool = %state.pool(),
                                timeout_ms = limit.as_millis() as u64,
                                "Timed out; pooled task left running"
                            );
                            Err(FailureKind::Timeout(limit))
                        }
                    },
                }
            }
        };
        metrics::record_execution_latency(state.key(), started.elapsed());
        result
    }

    async fn fallback<T, Fb, FbFut, E2>(
        &self,
        state: &CommandState,
        policy: &Policy,
        cause: FailureKind,
        fallback: Fb,
    ) -> Result<CommandResult<T>, GuardError>
    where
        Fb: FnOnce(FailureKind) -> FbFut,
        FbFut: Future<Output = Result<T, E2>>,
        E2: Into<BoxError>,
    {
        if !policy.fallback_enabled {
            metrics::record_fallback(state.key(), "disabled");
            return Err(GuardError::FallbackUnavailable {
                command: state.key().to_string(),
                cause,
            });
        }

        let Some(_permit) = state
            .bulkhead()
            .try_acquire_fallback(policy.max_concurrent_fallback)
        else {
            state.record_fallback(FallbackResult::Rejected);
            metrics::record_fallback(state.key(), "rejected");
            tracing::warn!(command = %state.key(), cause = %cause, "Fallback bulkhead full");
            return Err(GuardError::FallbackUnavailable {
                command: state.key().to_string(),
                cause,
            });
        };

        let reason = cause.clone();
        let result = AssertUnwindSafe(async move { fallback(reason).await })
            .catch_unwind()
            .await;
        let message = match result {
            Ok(Ok(value)) => {
                state.record_fallback(FallbackResult::Success);
                metrics::record_fallback(state.key(), "success");
                return Ok(CommandResult::Degraded { value, cause });
            }
            Ok(Err(e)) => error_message(e),
            Err(panic) => panic_message(&*panic),
        };

        state.record_fallback(FallbackResult::Failure);
        metrics::record_fallback(state.key(), "failure");
        tracing::error!(command = %state.key(), cause = %cause, error = %message, "Fallback failed");
        Err(GuardError::FallbackFailure {
            command: state.key().to_string(),
            cause,
            message,
        })
    }
}

/// Record one outcome and let it drive the breaker.
fn settle(state: &CommandState, policy: &Policy, trial: Option<TrialGuard<'_>>, outcome: Outcome) {
    let window = state.window();
    window.record(outcome);
    metrics::record_outcome(state.key(), outcome);

    match trial {
        Some(trial) if outcome == Outcome::Success => {
            window.reset();
            trial.succeed();
        }
        Some(trial) => trial.fail(),
        None => {
            state.breaker().evaluate(policy, &window.counts());
        }
    }
}

/// The half-open trial held by one call; reopens the circuit unless settled.
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    settled: bool,
}

impl<'a> TrialGuard<'a> {
    fn new(breaker: &'a CircuitBreaker) -> Self {
        Self {
            breaker,
            settled: false,
        }
    }

    fn succeed(mut self) {
        self.settled = true;
        self.breaker.trial_succeeded();
    }

    fn fail(mut self) {
        self.settled = true;
        self.breaker.trial_failed();
    }
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.trial_failed();
        }
    }
}

fn error_message<E: Into<BoxError>>(e: E) -> String {
    let e: BoxError = e.into();
    e.to_string()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

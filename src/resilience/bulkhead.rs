//! Concurrency limiter (bulkhead).
//!
//! # Responsibilities
//! - Bound concurrent executions of a command's work
//! - Bound concurrent executions of its fallback, independently
//! - Hand out RAII permits that release on drop, on every exit path
//!
//! # Design Decisions
//! - Non-blocking: a full compartment is an immediate rejection
//! - Limits are passed in at acquisition so a config reload applies at once
//! - Lowering a limit never evicts holders; new callers wait for the drain

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Which half of the bulkhead a permit belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compartment {
    Execution,
    Fallback,
}

/// Two independent permit counters.
#[derive(Debug, Default)]
pub struct Bulkhead {
    executions: AtomicUsize,
    fallbacks: AtomicUsize,
}

impl Bulkhead {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to take an execution permit while fewer than `max` are out.
    pub fn try_acquire_execution(self: &Arc<Self>, max: usize) -> Option<BulkheadPermit> {
        self.try_acquire(Compartment::Execution, max)
    }

    /// Try to take a fallback permit while fewer than `max` are out.
    pub fn try_acquire_fallback(self: &Arc<Self>, max: usize) -> Option<BulkheadPermit> {
        self.try_acquire(Compartment::Fallback, max)
    }

    /// Permits currently held in a compartment.
    pub fn in_flight(&self, compartment: Compartment) -> usize {
        self.counter(compartment).load(Ordering::Acquire)
    }

    fn try_acquire(self: &Arc<Self>, compartment: Compartment, max: usize) -> Option<BulkheadPermit> {
        if !try_increment(self.counter(compartment), max) {
            return None;
        }
        Some(BulkheadPermit {
            bulkhead: self.clone(),
            compartment,
        })
    }

    fn counter(&self, compartment: Compartment) -> &AtomicUsize {
        match compartment {
            Compartment::Execution => &self.executions,
            Compartment::Fallback => &self.fallbacks,
        }
    }
}

/// Increment `counter` unless it already reached `max`.
pub(crate) fn try_increment(counter: &AtomicUsize, max: usize) -> bool {
    let mut prev = counter.load(Ordering::Relaxed);
    loop {
        if prev >= max {
            return false;
        }
        match counter.compare_exchange_weak(prev, prev + 1, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return true,
            Err(x) => prev = x,
        }
    }
}

/// A RAII permit that returns its slot on drop.
#[derive(Debug)]
pub struct BulkheadPermit {
    bulkhead: Arc<Bulkhead>,
    compartment: Compartment,
}

impl BulkheadPermit {
    pub fn compartment(&self) -> Compartment {
        self.compartment
    }

    /// Return the permit now.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for BulkheadPermit {
    fn drop(&mut self) {
        self.bulkhead
            .counter(self.compartment)
            .fetch_sub(1, Ordering::AcqRel);
    }
}

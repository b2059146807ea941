//! Bounded worker pools for thread-pool isolation.
//!
//! A pool is a named slot counter; each admitted unit of work is spawned as
//! its own task and holds one slot until it actually finishes. A caller that
//! stops waiting (timeout) does not free the slot, so a pool full of stuck
//! work rejects new work instead of piling it up.

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::resilience::bulkhead::try_increment;

#[derive(Debug)]
pub struct WorkerPool {
    key: String,
    active: AtomicUsize,
    completed: AtomicU64,
    rejected: AtomicU64,
}

/// Point-in-time view of a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolSnapshot {
    pub pool: String,
    pub active: usize,
    pub core_size: usize,
    pub completed: u64,
    pub rejected: u64,
}

impl WorkerPool {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            active: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Try to take a slot while fewer than `core_size` are busy.
    pub fn try_acquire(self: &Arc<Self>, core_size: usize) -> Option<PoolSlot> {
        if try_increment(&self.active, core_size) {
            Some(PoolSlot { pool: self.clone() })
        } else {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(pool = %self.key, core_size, "Worker pool saturated");
            None
        }
    }

    pub fn snapshot(&self, core_size: usize) -> PoolSnapshot {
        PoolSnapshot {
            pool: self.key.clone(),
            active: self.active(),
            core_size,
            completed: self.completed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// One busy slot in a [`WorkerPool`].
#[derive(Debug)]
pub struct PoolSlot {
    pool: Arc<WorkerPool>,
}

impl PoolSlot {
    /// Run `work` as a separate task that owns this slot until it finishes.
    pub fn spawn<F>(self, work: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        tokio::spawn(async move {
            let _slot = self;
            work.await
        })
    }
}

impl Drop for PoolSlot {
    fn drop(&mut self) {
        self.pool.active.fetch_sub(1, Ordering::AcqRel);
        self.pool.completed.fetch_add(1, Ordering::Relaxed);
    }
}

//! Rolling outcome statistics.
//!
//! # Responsibilities
//! - Count success / failure / timeout / rejected outcomes per time bucket
//! - Report error percentage and request volume over the live buckets
//! - Evict expired buckets lazily on every read and write
//!
//! # Design Decisions
//! - One mutex guards all buckets so a read never sees half an outcome
//! - Bucket index is derived from elapsed time since creation, no timer task
//! - Geometry is fixed per instance; a geometry change builds a new window

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

/// Terminal outcome of one guarded call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
    Timeout,
    Rejected,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Timeout => "timeout",
            Self::Rejected => "rejected",
        }
    }
}

/// Outcome counters over some span of buckets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RollingCounts {
    pub success: u64,
    pub failure: u64,
    pub timeout: u64,
    pub rejected: u64,
}

impl RollingCounts {
    fn add(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Success => self.success += 1,
            Outcome::Failure => self.failure += 1,
            Outcome::Timeout => self.timeout += 1,
            Outcome::Rejected => self.rejected += 1,
        }
    }

    fn merge(&mut self, other: &RollingCounts) {
        self.success += other.success;
        self.failure += other.failure;
        self.timeout += other.timeout;
        self.rejected += other.rejected;
    }

    /// Request volume: every recorded outcome.
    pub fn total(&self) -> u64 {
        self.success + self.failure + self.timeout + self.rejected
    }

    /// Failures and timeouts as a percentage of the volume; 0 when empty.
    pub fn error_percentage(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        (self.failure + self.timeout) as f64 * 100.0 / total as f64
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("rolling window must be longer than zero")]
    ZeroWindow,
    #[error("rolling window needs at least one bucket")]
    ZeroBuckets,
    #[error("rolling window of {window:?} is too short for {buckets} buckets")]
    BucketTooSmall { window: Duration, buckets: u32 },
}

#[derive(Debug)]
struct Bucket {
    index: u64,
    counts: RollingCounts,
}

/// Fixed-duration rolling counters, bucketed for smooth aging.
#[derive(Debug)]
pub struct MetricWindow {
    origin: Instant,
    window: Duration,
    buckets: u32,
    bucket_ms: u64,
    slots: Mutex<VecDeque<Bucket>>,
}

impl MetricWindow {
    pub fn new(window: Duration, buckets: u32) -> Result<Self, WindowError> {
        if window.is_zero() {
            return Err(WindowError::ZeroWindow);
        }
        if buckets == 0 {
            return Err(WindowError::ZeroBuckets);
        }
        let bucket_ms = window.as_millis() as u64 / buckets as u64;
        if bucket_ms == 0 {
            return Err(WindowError::BucketTooSmall { window, buckets });
        }
        Ok(Self {
            origin: Instant::now(),
            window,
            buckets,
            bucket_ms,
            slots: Mutex::new(VecDeque::with_capacity(buckets as usize)),
        })
    }

    /// Window length and bucket count.
    pub fn geometry(&self) -> (Duration, u32) {
        (self.window, self.buckets)
    }

    /// Append one outcome to the current bucket.
    pub fn record(&self, outcome: Outcome) {
        let mut slots = self.lock();
        let now = Instant::now();
        self.record_locked(&mut slots, outcome, now);
    }

    /// Append one outcome as of `now`.
    pub fn record_at(&self, outcome: Outcome, now: Instant) {
        let mut slots = self.lock();
        self.record_locked(&mut slots, outcome, now);
    }

    /// Counters over the live buckets.
    pub fn counts(&self) -> RollingCounts {
        self.counts_at(Instant::now())
    }

    pub fn counts_at(&self, now: Instant) -> RollingCounts {
        let mut slots = self.lock();
        self.evict(&mut slots, self.index_of(now));
        let mut total = RollingCounts::default();
        for bucket in slots.iter() {
            total.merge(&bucket.counts);
        }
        total
    }

    pub fn error_percentage(&self) -> f64 {
        self.counts().error_percentage()
    }

    pub fn request_volume(&self) -> u64 {
        self.counts().total()
    }

    /// Drop every bucket.
    pub fn reset(&self) {
        self.lock().clear();
    }

    fn record_locked(&self, slots: &mut VecDeque<Bucket>, outcome: Outcome, now: Instant) {
        let index = self.index_of(now);
        self.evict(slots, index);

        let newest = slots.back().map(|b| b.index);
        match newest {
            Some(newest) if newest >= index => {
                // A caller that sampled the clock before a newer bucket was
                // opened lands in the closest bucket not after its sample.
                let bucket = slots
                    .iter()
                    .rposition(|b| b.index <= index)
                    .unwrap_or(0);
                if let Some(b) = slots.get_mut(bucket) {
                    b.counts.add(outcome);
                }
            }
            _ => {
                let mut counts = RollingCounts::default();
                counts.add(outcome);
                slots.push_back(Bucket { index, counts });
            }
        }
    }

    fn evict(&self, slots: &mut VecDeque<Bucket>, current: u64) {
        let horizon = current.saturating_sub(self.buckets as u64 - 1);
        while slots.front().is_some_and(|b| b.index < horizon) {
            slots.pop_front();
        }
    }

    fn index_of(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.origin).as_millis() as u64 / self.bucket_ms
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Bucket>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MetricWindow {
    /// Ten one-second buckets.
    fn default() -> Self {
        Self {
            origin: Instant::now(),
            window: Duration::from_secs(10),
            buckets: 10,
            bucket_ms: 1_000,
            slots: Mutex::new(VecDeque::with_capacity(10)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> MetricWindow {
        MetricWindow::new(Duration::from_millis(5_000), 10).unwrap()
    }

    #[test]
    fn test_rejects_bad_geometry() {
        assert_eq!(
            MetricWindow::new(Duration::ZERO, 10).unwrap_err(),
            WindowError::ZeroWindow
        );
        assert_eq!(
            MetricWindow::new(Duration::from_secs(1), 0).unwrap_err(),
            WindowError::ZeroBuckets
        );
        assert!(matches!(
            MetricWindow::new(Duration::from_millis(5), 10),
            Err(WindowError::BucketTooSmall { .. })
        ));
    }

    #[test]
    fn test_empty_window() {
        let w = window();
        assert_eq!(w.request_volume(), 0);
        assert_eq!(w.error_percentage(), 0.0);
    }

    #[test]
    fn test_error_percentage() {
        let w = window();
        let now = Instant::now();
        w.record_at(Outcome::Success, now);
        for _ in 0..3 {
            w.record_at(Outcome::Failure, now);
        }
        let counts = w.counts_at(now);
        assert_eq!(counts.total(), 4);
        assert_eq!(counts.error_percentage(), 75.0);
    }

    #[test]
    fn test_rejections_count_toward_volume_only() {
        let w = window();
        let now = Instant::now();
        w.record_at(Outcome::Timeout, now);
        w.record_at(Outcome::Rejected, now);
        let counts = w.counts_at(now);
        assert_eq!(counts.total(), 2);
        assert_eq!(counts.error_percentage(), 50.0);
    }

    #[test]
    fn test_buckets_age_out() {
        let w = window();
        let start = Instant::now();
        w.record_at(Outcome::Failure, start);
        w.record_at(Outcome::Success, start + Duration::from_millis(2_600));

        // Both still inside the 5s window.
        let mid = start + Duration::from_millis(4_900);
        assert_eq!(w.counts_at(mid).total(), 2);

        // The first bucket [0, 500ms) has left the window.
        let later = start + Duration::from_millis(5_100);
        let counts = w.counts_at(later);
        assert_eq!(counts.failure, 0);
        assert_eq!(counts.success, 1);

        // Everything gone after another full window.
        assert_eq!(w.counts_at(later + Duration::from_secs(5)).total(), 0);
    }

    #[test]
    fn test_late_sample_lands_in_existing_bucket() {
        let w = window();
        let start = Instant::now();
        w.record_at(Outcome::Success, start + Duration::from_millis(1_200));
        w.record_at(Outcome::Failure, start + Duration::from_millis(600));
        let counts = w.counts_at(start + Duration::from_millis(1_300));
        assert_eq!(counts.total(), 2);
    }

    #[test]
    fn test_reset() {
        let w = window();
        w.record(Outcome::Failure);
        w.reset();
        assert_eq!(w.request_volume(), 0);
    }

    #[test]
    fn test_concurrent_records_are_all_counted() {
        let w = std::sync::Arc::new(window());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let w = w.clone();
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        w.record(Outcome::Success);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(w.counts().success, 2_000);
    }
}

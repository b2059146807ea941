//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap guarded work with its execution deadline
//! - Report the deadline that elapsed so it can be attached to the outcome
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors
//! - Cancellation is best-effort only. An inline future is dropped and stops
//!   at its next suspension point; a spawned task is detached and keeps
//!   running to completion. Neither interrupts blocking code.

use std::future::Future;
use std::time::Duration;

/// Await `fut`, giving up after `limit` if one is set.
///
/// On expiry returns `Err(limit)`.
pub async fn run_with_timeout<F: Future>(limit: Option<Duration>, fut: F) -> Result<F::Output, Duration> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| limit),
        None => Ok(fut.await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_completes_within_limit() {
        let out = run_with_timeout(Some(Duration::from_millis(100)), async { 5 }).await;
        assert_eq!(out, Ok(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_elapsed_limit() {
        let limit = Duration::from_millis(100);
        let out = run_with_timeout(Some(limit), tokio::time::sleep(Duration::from_secs(1))).await;
        assert_eq!(out, Err(limit));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_limit_waits() {
        let out = run_with_timeout(None, async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            "done"
        })
        .await;
        assert_eq!(out, Ok("done"));
    }
}

//! Shutdown coordination for background tasks.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinSet;

/// Coordinator for graceful shutdown.
///
/// Every long-running task (config feed, registry follower, admin API, demo
/// workload) subscribes and exits when the signal fires.
#[derive(Debug)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Fire the signal. Safe to call more than once.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Tasks still listening.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Trigger, then wait up to `deadline` for `tasks` to finish.
    ///
    /// Returns `false` if the deadline passed and the rest were aborted.
    pub async fn drain(&self, tasks: &mut JoinSet<()>, deadline: Duration) -> bool {
        self.trigger();
        let drained = tokio::time::timeout(deadline, async {
            while let Some(res) = tasks.join_next().await {
                if let Err(e) = res {
                    tracing::error!(error = %e, "Background task failed");
                }
            }
        })
        .await
        .is_ok();

        if !drained {
            tracing::warn!(remaining = tasks.len(), "Shutdown deadline passed, aborting tasks");
            tasks.abort_all();
        }
        drained
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_drain_waits_for_subscribers() {
        let shutdown = Shutdown::new();
        let mut tasks = JoinSet::new();
        let mut rx = shutdown.subscribe();
        tasks.spawn(async move {
            let _ = rx.recv().await;
        });

        assert!(shutdown.drain(&mut tasks, Duration::from_secs(1)).await);
        assert!(tasks.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_aborts_stragglers() {
        let shutdown = Shutdown::new();
        let mut tasks = JoinSet::new();
        tasks.spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        assert!(!shutdown.drain(&mut tasks, Duration::from_millis(100)).await);
    }
}

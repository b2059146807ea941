//! Demo workload.
//!
//! Drives two commands that fail for their first twenty invocations and
//! succeed afterwards: `test` (thread-pool isolated) and `test2`
//! (semaphore isolated). Watching the output shows the circuit opening,
//! short-circuiting to the fallback, and closing again after a trial.

use std::convert::Infallible;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::config::{CommandConfig, GuardConfig, IsolationStrategy, PoolConfig};
use crate::resilience::{Command, CommandResult, Dispatcher, GuardError};

pub const GROUP: &str = "hystrix-group";
pub const POOL: &str = "hystrix-pool";
pub const THREAD_POOL_COMMAND: &str = "test";
pub const SEMAPHORE_COMMAND: &str = "test2";

/// Invocations below this index fail.
const FAILING_INVOCATIONS: usize = 20;

/// Configuration used when `--demo` runs without a config file.
pub fn default_config() -> GuardConfig {
    let breaker = CommandConfig {
        request_volume_threshold: 3,
        error_threshold_percentage: 10,
        rolling_window_ms: 5_000,
        sleep_window_ms: 2_000,
        ..CommandConfig::default()
    };

    let mut config = GuardConfig::default();
    config.commands.insert(THREAD_POOL_COMMAND.to_string(), breaker);
    config.commands.insert(
        SEMAPHORE_COMMAND.to_string(),
        CommandConfig {
            isolation_strategy: IsolationStrategy::Semaphore,
            max_concurrent_execution: 3,
            max_concurrent_fallback: 10,
            ..breaker
        },
    );
    config.pools.insert(POOL.to_string(), PoolConfig { core_size: 10 });
    config
}

fn worker_name() -> String {
    std::thread::current()
        .name()
        .unwrap_or("unnamed")
        .to_string()
}

/// One invocation of a demo command. Returns the line the demo prints.
pub async fn invoke(
    dispatcher: &Dispatcher,
    command: &Command,
    index: usize,
) -> Result<String, GuardError> {
    let result = dispatcher
        .execute(
            command,
            move || async move {
                if index < FAILING_INVOCATIONS {
                    return Err(format!("invocation {index} failed"));
                }
                Ok(format!("NORMAL - {}", worker_name()))
            },
            |_cause| async { Ok::<_, Infallible>(format!("FALLBACK - {}", worker_name())) },
        )
        .await?;

    let value = match result {
        CommandResult::Normal(value) | CommandResult::Degraded { value, .. } => value,
    };
    Ok(format!(
        "{index} --> {}_{}_{}_{value}",
        command.group(),
        command.key(),
        command.pool()
    ))
}

/// Run `requests` invocations of each demo command with jittered pacing.
pub async fn run(dispatcher: Dispatcher, requests: usize, mut shutdown: broadcast::Receiver<()>) {
    let pooled = Command::new(THREAD_POOL_COMMAND)
        .with_group(GROUP)
        .with_pool(POOL);
    let inline = Command::new(SEMAPHORE_COMMAND).with_group(GROUP);

    for index in 0..requests {
        for command in [&pooled, &inline] {
            match invoke(&dispatcher, command, index).await {
                Ok(line) => tracing::info!(command = %command.key(), "{line}"),
                Err(e) => tracing::warn!(command = %command.key(), error = %e, "Demo invocation failed"),
            }
        }

        let pause = Duration::from_millis(100 + fastrand::u64(0..200));
        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            _ = shutdown.recv() => {
                tracing::info!(completed = index + 1, "Demo workload interrupted");
                return;
            }
        }
    }
    tracing::info!(requests, "Demo workload finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigStore;
    use crate::resilience::{CircuitState, Registry};
    use std::sync::Arc;

    fn dispatcher() -> Dispatcher {
        let store = Arc::new(ConfigStore::new(default_config()).unwrap());
        Dispatcher::new(Arc::new(Registry::new()), store)
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = default_config();
        assert!(crate::config::validation::validate_config(&config).is_ok());
        assert_eq!(
            config.command(SEMAPHORE_COMMAND).isolation_strategy,
            IsolationStrategy::Semaphore
        );
    }

    #[tokio::test]
    async fn test_early_invocations_fall_back() {
        let d = dispatcher();
        let cmd = Command::new(SEMAPHORE_COMMAND).with_group(GROUP);
        let line = invoke(&d, &cmd, 0).await.unwrap();
        assert!(line.starts_with("0 --> hystrix-group_test2_hystrix-group_FALLBACK - "));
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_recovers_after_failures() {
        let d = dispatcher();
        let cmd = Command::new(THREAD_POOL_COMMAND)
            .with_group(GROUP)
            .with_pool(POOL);

        for index in 0..3 {
            invoke(&d, &cmd, index).await.unwrap();
        }
        let state = d.registry().get(THREAD_POOL_COMMAND).unwrap();
        assert_eq!(state.breaker().state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(2_100)).await;
        let line = invoke(&d, &cmd, 20).await.unwrap();
        assert!(line.contains("NORMAL - "), "{line}");
        assert_eq!(state.breaker().state(), CircuitState::Closed);
    }
}

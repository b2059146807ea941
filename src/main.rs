//! command-guard
//!
//! Guards units of work behind per-command circuit breakers and bulkheads,
//! with policies hot-reloaded from a TOML file.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                    COMMAND GUARD                      │
//!                 │                                                       │
//!   caller ──────▶│  dispatcher ─▶ breaker ─▶ bulkhead ─▶ pool/inline ───┼──▶ work
//!                 │       │                                   │           │
//!                 │       ▼                                   ▼           │
//!   caller ◀──────│  fallback ◀──────── metric window ◀── outcome         │
//!                 │                                                       │
//!                 │  ┌─────────────────────────────────────────────────┐  │
//!                 │  │ config file ─▶ watcher ─▶ store ─▶ change feed   │  │
//!                 │  │                             │          │         │  │
//!                 │  │                         admin API   registry     │  │
//!                 │  └─────────────────────────────────────────────────┘  │
//!                 └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use command_guard::lifecycle::{signals, startup, Shutdown};
use command_guard::{demo, observability};

const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "command-guard")]
#[command(about = "Circuit breaker and bulkhead dispatch service", long_about = None)]
struct Args {
    /// Path to the TOML configuration file (watched for changes)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run the built-in demo workload
    #[arg(long)]
    demo: bool,

    /// Invocations per demo command
    #[arg(long, default_value_t = 40)]
    demo_requests: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = startup::load(args.config.as_deref(), args.demo)?;
    observability::logging::init(&config.observability)?;

    tracing::info!("command-guard v{} starting", env!("CARGO_PKG_VERSION"));

    let shutdown = Shutdown::new();
    let mut services = startup::start(config, args.config.as_deref(), &shutdown).await?;

    if let Some(addr) = services.admin_addr {
        tracing::info!(address = %addr, "Admin API ready");
    }

    if args.demo {
        services.tasks.spawn(demo::run(
            services.dispatcher.clone(),
            args.demo_requests,
            shutdown.subscribe(),
        ));
    }

    signals::wait_for_signals(|| services.reload()).await?;

    shutdown.drain(&mut services.tasks, SHUTDOWN_DEADLINE).await;
    tracing::info!("Shutdown complete");
    Ok(())
}

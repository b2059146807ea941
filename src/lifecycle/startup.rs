//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Initialize all subsystems in dependency order
//! - Start background tasks (config feed, registry follower, admin API)
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::RecommendedWatcher;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinSet;

use crate::admin::{self, AdminState};
use crate::config::loader::load_config;
use crate::config::watcher::ConfigWatcher;
use crate::config::{ConfigError, ConfigStore, GuardConfig};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::resilience::{Dispatcher, Registry};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid {field} address {value:?}")]
    Address { field: &'static str, value: String },

    #[error("metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("config watcher: {0}")]
    Watch(#[from] notify::Error),

    #[error("failed to bind admin API on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
}

/// Resolve the initial configuration.
///
/// A file wins; otherwise the demo profile or the built-in defaults.
pub fn load(path: Option<&Path>, demo: bool) -> Result<GuardConfig, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None if demo => Ok(crate::demo::default_config()),
        None => Ok(GuardConfig::default()),
    }
}

/// Everything a running instance owns.
pub struct Services {
    pub config: Arc<ConfigStore>,
    pub registry: Arc<Registry>,
    pub dispatcher: Dispatcher,
    pub tasks: JoinSet<()>,
    pub admin_addr: Option<SocketAddr>,
    config_path: Option<PathBuf>,
    _watcher: Option<RecommendedWatcher>,
}

impl Services {
    /// Re-read the config file, if there is one.
    pub fn reload(&self) {
        let Some(path) = &self.config_path else {
            tracing::info!("No config file to reload");
            return;
        };
        match self.config.reload_from(path) {
            Ok(Some(change)) => tracing::info!(
                revision = %change.revision,
                commands = ?change.commands,
                "Configuration reloaded"
            ),
            Ok(None) => tracing::info!("Configuration unchanged"),
            Err(e) => tracing::error!("Reload failed: {}. Keeping current configuration.", e),
        }
    }
}

fn parse_addr(field: &'static str, value: &str) -> Result<SocketAddr, StartupError> {
    value.parse().map_err(|_| StartupError::Address {
        field,
        value: value.to_string(),
    })
}

/// Build the services and spawn their background tasks.
pub async fn start(
    config: GuardConfig,
    config_path: Option<&Path>,
    shutdown: &Shutdown,
) -> Result<Services, StartupError> {
    let observability = config.observability.clone();
    let admin_config = config.admin.clone();

    let store = Arc::new(ConfigStore::new(config)?);
    let registry = Arc::new(Registry::new());
    let dispatcher = Dispatcher::new(registry.clone(), store.clone());
    let mut tasks = JoinSet::new();

    tracing::info!(
        revision = %store.snapshot().revision,
        commands = store.snapshot().config.commands.len(),
        pools = store.snapshot().config.pools.len(),
        "Configuration loaded"
    );

    if observability.metrics_enabled {
        let addr = parse_addr("metrics", &observability.metrics_address)?;
        metrics::init_metrics(addr)?;
    }

    tasks.spawn(registry.clone().follow_config(store.clone(), shutdown.subscribe()));

    let watcher = match config_path {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path, store.snapshot().config.clone());
            let handle = watcher.run()?;
            tasks.spawn(store.clone().follow(updates, shutdown.subscribe()));
            Some(handle)
        }
        None => None,
    };

    let admin_addr = if admin_config.enabled {
        let addr = parse_addr("admin", &admin_config.bind_address)?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| StartupError::Bind { addr, source })?;
        let local = listener.local_addr().unwrap_or(addr);
        let state = AdminState {
            registry: registry.clone(),
            config: store.clone(),
        };
        let rx = shutdown.subscribe();
        tasks.spawn(async move {
            if let Err(e) = admin::serve(listener, state, rx).await {
                tracing::error!(error = %e, "Admin API failed");
            }
        });
        Some(local)
    } else {
        None
    };

    Ok(Services {
        config: store,
        registry,
        dispatcher,
        tasks,
        admin_addr,
        config_path: config_path.map(Path::to_path_buf),
        _watcher: watcher,
    })
}

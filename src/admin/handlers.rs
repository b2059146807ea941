use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::admin::AdminState;
use crate::config::GuardConfig;
use crate::resilience::registry::{CommandSnapshot, MetricsSnapshot};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub revision: Uuid,
    pub commands: usize,
    pub open_circuits: usize,
}

#[derive(Serialize)]
pub struct ConfigView {
    pub revision: Uuid,
    pub config: GuardConfig,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let snapshot = state.registry.snapshot(&state.config.snapshot());
    let open_circuits = snapshot
        .commands
        .iter()
        .filter(|c| c.state != crate::resilience::CircuitState::Closed)
        .count();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if open_circuits == 0 { "operational" } else { "degraded" },
        revision: snapshot.revision,
        commands: snapshot.commands.len(),
        open_circuits,
    })
}

pub async fn get_commands(State(state): State<AdminState>) -> Json<MetricsSnapshot> {
    Json(state.registry.snapshot(&state.config.snapshot()))
}

pub async fn get_command(
    State(state): State<AdminState>,
    Path(key): Path<String>,
) -> Result<Json<CommandSnapshot>, StatusCode> {
    let command = state.registry.get(&key).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(command.snapshot(&state.config.snapshot().config)))
}

/// Current configuration with secrets redacted.
pub async fn get_config(State(state): State<AdminState>) -> Json<ConfigView> {
    let snapshot = state.config.snapshot();
    Json(ConfigView {
        revision: snapshot.revision,
        config: snapshot.config.redacted(),
    })
}

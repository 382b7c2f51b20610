//! Container endpoints: stop, inspect, and logs.

use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use arcadia_control::{GameSession, Orchestrator};
use arcadia_core::ContainerId;
use arcadia_pairing::SidecarClient;
use arcadia_store::Store;

use crate::error::ApiError;
use crate::state::GatewayState;

/// Log lines returned when `tail` is not given.
const DEFAULT_TAIL: usize = 100;

/// Upper bound on requested log lines.
const MAX_TAIL: usize = 10_000;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Query parameters for the logs endpoint.
#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    /// Number of trailing lines.
    #[serde(default)]
    pub tail: Option<usize>,
}

/// Response for a stop request.
#[derive(Debug, Serialize)]
pub struct StopResponse {
    /// The stopped container.
    pub container_id: ContainerId,
    /// The session the container belonged to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<GameSession>,
}

/// Response for the logs endpoint.
#[derive(Debug, Serialize)]
pub struct LogsResponse {
    /// The container.
    pub container_id: ContainerId,
    /// Log lines, oldest first.
    pub lines: Vec<String>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Stop a container and close its session.
///
/// # Errors
///
/// Returns an error if the engine could not remove the container.
pub async fn stop_container<O, S, C>(
    State(state): State<Arc<GatewayState<O, S, C>>>,
    Path(container_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    O: Orchestrator + 'static,
    S: Store + 'static,
    C: SidecarClient + 'static,
{
    let container_id = ContainerId::new(container_id)?;
    let session = state.orchestrator.stop_game(&container_id).await?;

    Ok(Json(StopResponse {
        container_id,
        session,
    }))
}

/// Engine view of a container.
///
/// # Errors
///
/// Returns `NotFound` if the engine does not know the container.
pub async fn inspect_container<O, S, C>(
    State(state): State<Arc<GatewayState<O, S, C>>>,
    Path(container_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    O: Orchestrator + 'static,
    S: Store + 'static,
    C: SidecarClient + 'static,
{
    let container_id = ContainerId::new(container_id)?;
    let info = state.orchestrator.inspect_container(&container_id).await?;

    Ok(Json(info))
}

/// Trailing log lines of a container.
///
/// # Errors
///
/// Returns `Timeout` if the engine does not answer in time.
pub async fn get_logs<O, S, C>(
    State(state): State<Arc<GatewayState<O, S, C>>>,
    Path(container_id): Path<String>,
    query: Result<Query<LogsQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError>
where
    O: Orchestrator + 'static,
    S: Store + 'static,
    C: SidecarClient + 'static,
{
    let container_id = ContainerId::new(container_id)?;
    let Query(query) = query?;
    let tail = query.tail.unwrap_or(DEFAULT_TAIL).min(MAX_TAIL);

    let lines = state
        .orchestrator
        .get_container_logs(&container_id, tail)
        .await?;

    Ok(Json(LogsResponse {
        container_id,
        lines,
    }))
}

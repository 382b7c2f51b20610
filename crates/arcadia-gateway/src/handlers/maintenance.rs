//! Maintenance endpoints for stale containers and volumes.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use arcadia_control::Orchestrator;
use arcadia_pairing::SidecarClient;
use arcadia_store::Store;

use crate::error::ApiError;
use crate::state::GatewayState;

/// Remove exited managed containers.
///
/// # Errors
///
/// Returns an error if the engine cannot list containers.
pub async fn cleanup_containers<O, S, C>(
    State(state): State<Arc<GatewayState<O, S, C>>>,
) -> Result<impl IntoResponse, ApiError>
where
    O: Orchestrator + 'static,
    S: Store + 'static,
    C: SidecarClient + 'static,
{
    let report = state.orchestrator.cleanup_stopped_containers().await?;
    tracing::info!(removed = report.removed, "Cleaned up stopped containers");
    Ok(Json(report))
}

/// Remove managed volumes no container mounts.
///
/// # Errors
///
/// Returns an error if the engine cannot list volumes.
pub async fn cleanup_volumes<O, S, C>(
    State(state): State<Arc<GatewayState<O, S, C>>>,
) -> Result<impl IntoResponse, ApiError>
where
    O: Orchestrator + 'static,
    S: Store + 'static,
    C: SidecarClient + 'static,
{
    let report = state.orchestrator.cleanup_orphaned_volumes().await?;
    tracing::info!(removed = report.removed, "Cleaned up orphaned volumes");
    Ok(Json(report))
}

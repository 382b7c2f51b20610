//! Game launch and install endpoints.
//!
//! Each request carries the game descriptor and platform profile to run. The
//! game id in the path must match the descriptor.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use arcadia_control::{InstallRequest, Orchestrator};
use arcadia_core::{GameId, SessionId};
use arcadia_pairing::SidecarClient;
use arcadia_runtime::{GameDescriptor, LaunchMode, Platform};
use arcadia_store::Store;

use crate::error::ApiError;
use crate::state::GatewayState;

// =============================================================================
// Request Types
// =============================================================================

/// Request to start a game or debug container.
#[derive(Debug, Deserialize)]
pub struct LaunchGameRequest {
    /// Session id to use. Generated when absent.
    #[serde(default)]
    pub session_id: Option<SessionId>,
    /// The game to run.
    pub game: GameDescriptor,
    /// Platform profile selecting the runner image.
    pub platform: Platform,
}

/// Request to run a game's installer.
#[derive(Debug, Deserialize)]
pub struct InstallGameRequest {
    /// Session id to use. Generated when absent.
    #[serde(default)]
    pub session_id: Option<SessionId>,
    /// The game being installed.
    pub game: GameDescriptor,
    /// Platform profile selecting the installer image.
    pub platform: Platform,
    /// Installer location and arguments.
    #[serde(flatten)]
    pub install: InstallRequest,
}

// =============================================================================
// Handlers
// =============================================================================

/// Launch a game in play mode.
///
/// # Errors
///
/// Returns `BadRequest` for an invalid descriptor and `BadGateway` if the
/// engine fails to create or start the container.
pub async fn launch_game<O, S, C>(
    State(state): State<Arc<GatewayState<O, S, C>>>,
    Path(game_id): Path<String>,
    body: Result<Json<LaunchGameRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
    O: Orchestrator + 'static,
    S: Store + 'static,
    C: SidecarClient + 'static,
{
    let Json(request) = body?;
    check_game_id(&game_id, &request.game)?;
    let session_id = request.session_id.unwrap_or_else(SessionId::generate);

    let launched = state
        .orchestrator
        .launch_game(session_id, &request.game, &request.platform, LaunchMode::Play)
        .await?;

    Ok((StatusCode::CREATED, Json(launched)))
}

/// Run a game's installer and watch it in the background.
///
/// # Errors
///
/// Returns `Conflict` if an installer is already running for the game.
pub async fn install_game<O, S, C>(
    State(state): State<Arc<GatewayState<O, S, C>>>,
    Path(game_id): Path<String>,
    body: Result<Json<InstallGameRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
    O: Orchestrator + 'static,
    S: Store + 'static,
    C: SidecarClient + 'static,
{
    let Json(request) = body?;
    check_game_id(&game_id, &request.game)?;
    let session_id = request.session_id.unwrap_or_else(SessionId::generate);

    let launched = state
        .orchestrator
        .install_game(session_id, &request.game, &request.platform, request.install)
        .await?;

    Ok((StatusCode::ACCEPTED, Json(launched)))
}

/// Start an interactive debug container.
///
/// # Errors
///
/// Same as [`launch_game`].
pub async fn debug_game<O, S, C>(
    State(state): State<Arc<GatewayState<O, S, C>>>,
    Path(game_id): Path<String>,
    body: Result<Json<LaunchGameRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
    O: Orchestrator + 'static,
    S: Store + 'static,
    C: SidecarClient + 'static,
{
    let Json(request) = body?;
    check_game_id(&game_id, &request.game)?;
    let session_id = request.session_id.unwrap_or_else(SessionId::generate);

    let launched = state
        .orchestrator
        .launch_debug_container(session_id, &request.game, &request.platform)
        .await?;

    Ok((StatusCode::CREATED, Json(launched)))
}

/// Current installation state of a game.
///
/// # Errors
///
/// Returns `NotFound` if the game has never been installed or launched.
pub async fn get_install_status<O, S, C>(
    State(state): State<Arc<GatewayState<O, S, C>>>,
    Path(game_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    O: Orchestrator + 'static,
    S: Store + 'static,
    C: SidecarClient + 'static,
{
    let game_id = GameId::new(game_id)?;
    let installation = state.orchestrator.check_install_status(&game_id).await?;

    Ok(Json(installation))
}

// =============================================================================
// Helpers
// =============================================================================

fn check_game_id(path_id: &str, game: &GameDescriptor) -> Result<(), ApiError> {
    let path_id = GameId::new(path_id)?;
    if path_id != game.game_id {
        return Err(ApiError::BadRequest(format!(
            "game id {} in body does not match {path_id} in path",
            game.game_id
        )));
    }
    Ok(())
}

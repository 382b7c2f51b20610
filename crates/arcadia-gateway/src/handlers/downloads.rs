//! Download endpoints.
//!
//! Downloads are keyed by game id. Progress for every task is broadcast on
//! `GET /v1/downloads/events` as Server-Sent Events.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;

use arcadia_control::Orchestrator;
use arcadia_core::GameId;
use arcadia_download::{DownloadRequest, DownloadSummary, DownloadTask};
use arcadia_pairing::SidecarClient;
use arcadia_store::Store;

use super::sse_event;
use crate::error::ApiError;
use crate::state::GatewayState;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Response for listing downloads.
#[derive(Debug, Serialize)]
pub struct ListDownloadsResponse {
    /// Every known task, oldest first.
    pub downloads: Vec<DownloadTask>,
    /// Aggregate counters.
    pub summary: DownloadSummary,
}

/// Request to change the number of concurrent downloads.
#[derive(Debug, Deserialize)]
pub struct ConcurrencyRequest {
    /// New limit. Must be at least 1.
    pub max_concurrent: usize,
}

/// Query parameters for the event stream.
#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    /// Only stream events for this game.
    #[serde(default)]
    pub game_id: Option<GameId>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Start (or join) a download.
///
/// Returns the task as it stands after admission: `queued` or `downloading`.
///
/// # Errors
///
/// Returns `BadRequest` for an empty file list, a non-HTTP URL, or a file name
/// that sanitizes to nothing.
pub async fn start_download<O, S, C>(
    State(state): State<Arc<GatewayState<O, S, C>>>,
    body: Result<Json<DownloadRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
    O: Orchestrator + 'static,
    S: Store + 'static,
    C: SidecarClient + 'static,
{
    let Json(request) = body?;
    let task = state.downloads.start(request).await?;

    Ok((StatusCode::ACCEPTED, Json(task)))
}

/// List every known download.
///
/// # Errors
///
/// Returns an error if persisted tasks cannot be read.
pub async fn list_downloads<O, S, C>(
    State(state): State<Arc<GatewayState<O, S, C>>>,
) -> Result<impl IntoResponse, ApiError>
where
    O: Orchestrator + 'static,
    S: Store + 'static,
    C: SidecarClient + 'static,
{
    let downloads = state.downloads.list_downloads()?;

    Ok(Json(ListDownloadsResponse {
        downloads,
        summary: state.downloads.summary(),
    }))
}

/// Get one game's download.
///
/// # Errors
///
/// Returns `NotFound` if the game has no download.
pub async fn get_download<O, S, C>(
    State(state): State<Arc<GatewayState<O, S, C>>>,
    Path(game_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    O: Orchestrator + 'static,
    S: Store + 'static,
    C: SidecarClient + 'static,
{
    let game_id = GameId::new(game_id)?;
    let task = state
        .downloads
        .get_download_status(&game_id)?
        .ok_or_else(|| ApiError::NotFound(format!("download {game_id}")))?;

    Ok(Json(task))
}

/// Cancel a queued or running download. Partial files are kept.
///
/// # Errors
///
/// Returns `NotFound` if the game has no download.
pub async fn cancel_download<O, S, C>(
    State(state): State<Arc<GatewayState<O, S, C>>>,
    Path(game_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    O: Orchestrator + 'static,
    S: Store + 'static,
    C: SidecarClient + 'static,
{
    let game_id = GameId::new(game_id)?;
    let task = state.downloads.cancel_download(&game_id)?;

    Ok(Json(task))
}

/// Change the number of concurrent downloads.
///
/// # Errors
///
/// Returns `BadRequest` if the limit is zero.
pub async fn set_concurrency<O, S, C>(
    State(state): State<Arc<GatewayState<O, S, C>>>,
    body: Result<Json<ConcurrencyRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
    O: Orchestrator + 'static,
    S: Store + 'static,
    C: SidecarClient + 'static,
{
    let Json(request) = body?;
    state
        .downloads
        .set_max_concurrent_downloads(request.max_concurrent)?;

    Ok(Json(state.downloads.summary()))
}

/// Stream download events.
///
/// A subscriber that falls behind skips the events it missed; the next event
/// for a task carries its full progress snapshot.
///
/// # Errors
///
/// Returns `BadRequest` for an invalid `game_id` filter.
pub async fn download_events<O, S, C>(
    State(state): State<Arc<GatewayState<O, S, C>>>,
    query: Result<Query<EventsQuery>, QueryRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError>
where
    O: Orchestrator + 'static,
    S: Store + 'static,
    C: SidecarClient + 'static,
{
    let Query(query) = query?;
    let receiver = state.downloads.subscribe();

    let events = stream::unfold(
        (receiver, query.game_id),
        |(mut receiver, filter)| async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        if filter.as_ref().is_some_and(|id| *id != event.game_id) {
                            continue;
                        }
                        let sse = sse_event(event.event_name(), &event);
                        return Some((Ok(sse), (receiver, filter)));
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Download event subscriber lagged");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        },
    );

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

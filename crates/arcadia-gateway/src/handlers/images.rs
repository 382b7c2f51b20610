//! Image pull endpoint.
//!
//! The pull runs in a background task; its progress is streamed to the caller
//! as Server-Sent Events named `progress`, `complete`, and `error`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::stream::{self, Stream};
use serde::Deserialize;
use tokio::sync::mpsc;

use arcadia_control::Orchestrator;
use arcadia_pairing::SidecarClient;
use arcadia_store::Store;

use super::sse_event;
use crate::error::ApiError;
use crate::state::GatewayState;

/// Progress events buffered between the pull and the response stream.
const PULL_EVENT_BUFFER: usize = 32;

/// Request to pull a runner image.
#[derive(Debug, Deserialize)]
pub struct PullImageRequest {
    /// Image reference, e.g. `arcadia/runner-wine:latest`.
    pub image: String,
}

/// Pull an image and stream its progress.
///
/// The pull keeps running if the caller disconnects.
///
/// # Errors
///
/// Returns `BadRequest` if the image reference is empty. Pull failures are
/// reported as an `error` event on the stream.
pub async fn pull_image<O, S, C>(
    State(state): State<Arc<GatewayState<O, S, C>>>,
    body: Result<Json<PullImageRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError>
where
    O: Orchestrator + 'static,
    S: Store + 'static,
    C: SidecarClient + 'static,
{
    let Json(request) = body?;
    let image = request.image.trim().to_string();
    if image.is_empty() {
        return Err(ApiError::BadRequest("image must not be empty".into()));
    }

    let (tx, rx) = mpsc::channel(PULL_EVENT_BUFFER);
    let orchestrator = Arc::clone(&state.orchestrator);
    tokio::spawn(async move {
        if let Err(e) = orchestrator.pull_image(&image, tx).await {
            tracing::debug!(image = %image, error = %e, "Streamed image pull ended with error");
        }
    });

    let events = stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        Some((Ok(sse_event(event.event_name(), &event)), rx))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

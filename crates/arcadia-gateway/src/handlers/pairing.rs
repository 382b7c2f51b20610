//! Streaming client pairing endpoints.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use arcadia_control::Orchestrator;
use arcadia_pairing::SidecarClient;
use arcadia_store::Store;

use crate::error::ApiError;
use crate::state::GatewayState;

/// Request to pair a client.
#[derive(Deserialize)]
pub struct PairRequest {
    /// Secret the sidecar issued for the pending request.
    pub pair_secret: String,
    /// PIN shown on the client.
    pub pin: String,
}

impl std::fmt::Debug for PairRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairRequest")
            .field("pair_secret", &self.pair_secret)
            .field("pin", &"****")
            .finish()
    }
}

/// Sidecar reachability, pending requests, and paired clients.
///
/// Never fails; an unreachable sidecar is reported in the body.
pub async fn get_status<O, S, C>(
    State(state): State<Arc<GatewayState<O, S, C>>>,
) -> impl IntoResponse
where
    O: Orchestrator + 'static,
    S: Store + 'static,
    C: SidecarClient + 'static,
{
    Json(state.pairing.status().await)
}

/// Submit a PIN for a pending pairing request.
///
/// A refused PIN or unknown secret is a normal `200` answer with
/// `"outcome": "rejected"`.
///
/// # Errors
///
/// Returns `BadRequest` for a malformed PIN and `ServiceUnavailable` if the
/// sidecar cannot be reached.
pub async fn pair<O, S, C>(
    State(state): State<Arc<GatewayState<O, S, C>>>,
    body: Result<Json<PairRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
    O: Orchestrator + 'static,
    S: Store + 'static,
    C: SidecarClient + 'static,
{
    let Json(request) = body?;
    let outcome = state.pairing.pair(&request.pair_secret, &request.pin).await?;

    Ok(Json(outcome))
}

/// Unpair every client on the sidecar and forget local records.
///
/// # Errors
///
/// Returns an error if local records cannot be removed. Sidecar failures are
/// reported in the body.
pub async fn clear<O, S, C>(
    State(state): State<Arc<GatewayState<O, S, C>>>,
) -> Result<impl IntoResponse, ApiError>
where
    O: Orchestrator + 'static,
    S: Store + 'static,
    C: SidecarClient + 'static,
{
    let report = state.pairing.clear().await?;

    Ok(Json(report))
}

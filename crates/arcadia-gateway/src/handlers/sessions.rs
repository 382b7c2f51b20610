//! Session query endpoints.
//!
//! Sessions are created by the game endpoints and closed by stopping their
//! container. This module only reads them.

use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use arcadia_control::{GameSession, Orchestrator, SessionFilter};
use arcadia_core::SessionId;
use arcadia_pairing::SidecarClient;
use arcadia_store::Store;

use crate::error::ApiError;
use crate::state::GatewayState;

// =============================================================================
// Response Types
// =============================================================================

/// Response for listing sessions.
#[derive(Debug, Serialize)]
pub struct ListSessionsResponse {
    /// Matching sessions, most recent first.
    pub sessions: Vec<GameSession>,
}

// =============================================================================
// Handlers
// =============================================================================

/// List sessions, optionally filtered by `game_id`, `status`, and `mode`.
///
/// # Errors
///
/// Returns `BadRequest` for an unknown filter value.
pub async fn list_sessions<O, S, C>(
    State(state): State<Arc<GatewayState<O, S, C>>>,
    filter: Result<Query<SessionFilter>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError>
where
    O: Orchestrator + 'static,
    S: Store + 'static,
    C: SidecarClient + 'static,
{
    let Query(filter) = filter?;
    let mut sessions = state.orchestrator.list_sessions(&filter).await?;
    sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    Ok(Json(ListSessionsResponse { sessions }))
}

/// Get a session by ID.
///
/// # Errors
///
/// Returns `NotFound` if the session does not exist.
pub async fn get_session<O, S, C>(
    State(state): State<Arc<GatewayState<O, S, C>>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    O: Orchestrator + 'static,
    S: Store + 'static,
    C: SidecarClient + 'static,
{
    let session_id = parse_session_id(&session_id)?;
    let session = state.orchestrator.get_session(&session_id).await?;

    Ok(Json(session))
}

// =============================================================================
// Helpers
// =============================================================================

fn parse_session_id(s: &str) -> Result<SessionId, ApiError> {
    s.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid session ID: {s}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_parsing() {
        let id = SessionId::generate();
        assert_eq!(parse_session_id(&id.to_string()).unwrap(), id);
        assert!(matches!(
            parse_session_id("not-a-uuid"),
            Err(ApiError::BadRequest(_))
        ));
    }
}

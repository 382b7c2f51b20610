//! Health check endpoint.
//!
//! This module provides the public health check endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use arcadia_control::Orchestrator;
use arcadia_download::DownloadSummary;
use arcadia_pairing::SidecarClient;
use arcadia_store::Store;

use crate::state::GatewayState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: &'static str,
    /// Service version.
    pub version: &'static str,
    /// True if the container engine answered a ping.
    pub engine_reachable: bool,
    /// Download table summary.
    pub downloads: DownloadSummary,
}

/// Health check handler.
///
/// Always answers 200. An unreachable container engine is reported as
/// `"degraded"` rather than failing the check.
///
/// # Example
///
/// ```text
/// GET /health
///
/// Response: 200 OK
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "engine_reachable": true,
///   "downloads": {"active": 0, "queued": 0, "max_concurrent": 2, "bytes_per_second": 0}
/// }
/// ```
pub async fn health<O, S, C>(State(state): State<Arc<GatewayState<O, S, C>>>) -> impl IntoResponse
where
    O: Orchestrator + 'static,
    S: Store + 'static,
    C: SidecarClient + 'static,
{
    let engine_reachable = match state.orchestrator.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Container engine ping failed");
            false
        }
    };

    let response = HealthResponse {
        status: if engine_reachable { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        engine_reachable,
        downloads: state.downloads.summary(),
    };

    (StatusCode::OK, Json(response))
}

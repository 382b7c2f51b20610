//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use arcadia_control::Orchestrator;
use arcadia_pairing::SidecarClient;
use arcadia_store::Store;

use crate::handlers::{
    containers, downloads, games, health, images, maintenance, pairing, sessions,
};
use crate::state::GatewayState;

/// Create the gateway router with all routes and middleware.
///
/// # Routes
///
/// - `GET /health` - Health check
///
/// ## Sessions
/// - `GET /v1/sessions` - List sessions (`?game_id=&status=&mode=`)
/// - `GET /v1/sessions/:session_id` - Get session
///
/// ## Games
/// - `POST /v1/games/:game_id/launch` - Launch in play mode
/// - `POST /v1/games/:game_id/install` - Run the installer
/// - `GET /v1/games/:game_id/install` - Installation state
/// - `POST /v1/games/:game_id/debug` - Start a debug container
///
/// ## Containers
/// - `POST /v1/containers/:container_id/stop` - Stop and close the session
/// - `GET /v1/containers/:container_id` - Inspect
/// - `GET /v1/containers/:container_id/logs` - Trailing logs (`?tail=N`)
///
/// ## Maintenance and images
/// - `POST /v1/maintenance/containers` - Remove exited containers
/// - `POST /v1/maintenance/volumes` - Remove orphaned volumes
/// - `POST /v1/images/pull` - Pull an image (SSE)
///
/// ## Downloads
/// - `POST /v1/downloads` - Start a download
/// - `GET /v1/downloads` - List downloads
/// - `GET /v1/downloads/events` - Progress events (SSE)
/// - `PUT /v1/downloads/concurrency` - Set the concurrency limit
/// - `GET /v1/downloads/:game_id` - Get a download
/// - `DELETE /v1/downloads/:game_id` - Cancel a download
///
/// ## Pairing
/// - `GET /v1/pairing` - Pairing status
/// - `POST /v1/pairing` - Submit a PIN
/// - `DELETE /v1/pairing` - Unpair all clients
pub fn create_router<O, S, C>(state: GatewayState<O, S, C>) -> Router
where
    O: Orchestrator + 'static,
    S: Store + 'static,
    C: SidecarClient + 'static,
{
    // Extract config values before moving state
    let cors = build_cors_layer(&state.config.cors_origins);
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout = state.config.request_timeout();

    let state = Arc::new(state);

    Router::new()
        .route("/health", get(health::health::<O, S, C>))
        // Sessions
        .route("/v1/sessions", get(sessions::list_sessions::<O, S, C>))
        .route(
            "/v1/sessions/:session_id",
            get(sessions::get_session::<O, S, C>),
        )
        // Games
        .route(
            "/v1/games/:game_id/launch",
            post(games::launch_game::<O, S, C>),
        )
        .route(
            "/v1/games/:game_id/install",
            post(games::install_game::<O, S, C>).get(games::get_install_status::<O, S, C>),
        )
        .route(
            "/v1/games/:game_id/debug",
            post(games::debug_game::<O, S, C>),
        )
        // Containers
        .route(
            "/v1/containers/:container_id",
            get(containers::inspect_container::<O, S, C>),
        )
        .route(
            "/v1/containers/:container_id/stop",
            post(containers::stop_container::<O, S, C>),
        )
        .route(
            "/v1/containers/:container_id/logs",
            get(containers::get_logs::<O, S, C>),
        )
        // Maintenance
        .route(
            "/v1/maintenance/containers",
            post(maintenance::cleanup_containers::<O, S, C>),
        )
        .route(
            "/v1/maintenance/volumes",
            post(maintenance::cleanup_volumes::<O, S, C>),
        )
        .route("/v1/images/pull", post(images::pull_image::<O, S, C>))
        // Downloads
        .route(
            "/v1/downloads",
            get(downloads::list_downloads::<O, S, C>).post(downloads::start_download::<O, S, C>),
        )
        .route(
            "/v1/downloads/events",
            get(downloads::download_events::<O, S, C>),
        )
        .route(
            "/v1/downloads/concurrency",
            put(downloads::set_concurrency::<O, S, C>),
        )
        .route(
            "/v1/downloads/:game_id",
            get(downloads::get_download::<O, S, C>).delete(downloads::cancel_download::<O, S, C>),
        )
        // Pairing
        .route(
            "/v1/pairing",
            get(pairing::get_status::<O, S, C>)
                .post(pairing::pair::<O, S, C>)
                .delete(pairing::clear::<O, S, C>),
        )
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

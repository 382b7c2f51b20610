//! Arcadia Gateway - HTTP/SSE API for game sessions and downloads
//!
//! This is the main entry point for the gateway service. It wires the Docker
//! runtime, the RocksDB store, the orchestrator, the download manager, and the
//! pairing coordinator together and serves the HTTP API.
//!
//! Configuration comes from environment variables; see each crate's
//! `from_env` for the supported names.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use arcadia_control::{ControlConfig, OrchestratorService};
use arcadia_download::{DownloadConfig, DownloadManager};
use arcadia_gateway::{create_router, GatewayConfig, GatewayState};
use arcadia_pairing::{HttpSidecarClient, PairingConfig, PairingCoordinator};
use arcadia_runtime::{DockerRuntime, HostCapabilities, RuntimeConfig};
use arcadia_store::RocksStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,arcadia=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Arcadia Gateway");

    // Load configuration from environment
    let gateway_config = GatewayConfig::from_env();
    let runtime_config = RuntimeConfig::from_env();
    let control_config = ControlConfig::from_env();
    let download_config = DownloadConfig::from_env();
    let pairing_config = PairingConfig::from_env();

    tracing::info!(
        listen_addr = %gateway_config.listen_addr,
        data_dir = %gateway_config.data_dir.display(),
        install_root = %control_config.install_root.display(),
        cache_root = %download_config.cache_root.display(),
        sidecar_url = %pairing_config.sidecar_url,
        "Gateway configuration loaded"
    );

    // Initialize RocksDB store
    tracing::info!(path = %gateway_config.data_dir.display(), "Opening RocksDB store");
    let store = Arc::new(RocksStore::open(&gateway_config.data_dir)?);

    // Connect to the container engine
    let runtime = Arc::new(DockerRuntime::connect(&runtime_config)?);
    let host = HostCapabilities::detect();
    tracing::info!(gpu = host.has_gpu(), "Host capabilities detected");

    let orchestrator = Arc::new(OrchestratorService::new(
        runtime,
        Arc::clone(&store),
        host,
        control_config,
    ));

    // Downloads interrupted by a restart pick up where they left off
    let downloads = DownloadManager::new(Arc::clone(&store), download_config)?;
    let resumed = downloads.resume_interrupted().await?;
    if resumed > 0 {
        tracing::info!(resumed, "Resumed interrupted downloads");
    }

    let sidecar = Arc::new(HttpSidecarClient::new(&pairing_config)?);
    let pairing = Arc::new(PairingCoordinator::new(sidecar, Arc::clone(&store)));

    // Build gateway state and router
    let listen_addr = gateway_config.listen_addr.clone();
    let state = GatewayState::new(orchestrator, downloads, pairing, gateway_config);
    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    // Start HTTP server
    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

//! HTTP and SSE gateway for the arcadia game orchestration engine.
//!
//! This crate exposes the engine's operations over HTTP:
//!
//! - Game launch, install, and debug sessions
//! - Container stop, inspection, logs, and maintenance sweeps
//! - Image pulls and download progress as Server-Sent Events
//! - Streaming client pairing
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Clients                              │
//! │                     (HTTP / SSE)                            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     arcadia-gateway                         │
//! │        Router + Handlers ──► ApiError {"error":{..}}        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┼──────────────┐
//!               ▼              ▼              ▼
//!        ┌──────────┐   ┌──────────┐   ┌──────────┐
//!        │Orchestr- │   │ Download │   │ Pairing  │
//!        │  ator    │   │ Manager  │   │Coordinat.│
//!        └──────────┘   └──────────┘   └──────────┘
//!              │              │              │
//!           Docker       HTTP mirrors     Sidecar
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use arcadia_gateway::{create_router, GatewayConfig, GatewayState};
//! use arcadia_control::{ControlConfig, OrchestratorService};
//! use arcadia_download::{DownloadConfig, DownloadManager};
//! use arcadia_pairing::{HttpSidecarClient, PairingConfig, PairingCoordinator};
//! use arcadia_runtime::{DockerRuntime, HostCapabilities, RuntimeConfig};
//! use arcadia_store::RocksStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/tmp/arcadia")?);
//! let runtime = Arc::new(DockerRuntime::connect(&RuntimeConfig::default())?);
//! let orchestrator = Arc::new(OrchestratorService::new(
//!     runtime,
//!     Arc::clone(&store),
//!     HostCapabilities::detect(),
//!     ControlConfig::default(),
//! ));
//! let downloads = DownloadManager::new(Arc::clone(&store), DownloadConfig::default())?;
//! let sidecar = Arc::new(HttpSidecarClient::new(&PairingConfig::default())?);
//! let pairing = Arc::new(PairingCoordinator::new(sidecar, store));
//!
//! let state = GatewayState::new(orchestrator, downloads, pairing, GatewayConfig::default());
//! let app = create_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::GatewayConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::GatewayState;

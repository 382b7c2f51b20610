//! Game session orchestration for arcadia.
//!
//! This crate turns launch, install, and debug requests into supervised
//! containers. It builds container specs, drives the container runtime, tracks
//! sessions, watches installers in the background, and sweeps up the containers
//! and volumes left behind.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Gateway (HTTP/SSE)                      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    OrchestratorService                      │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐    │
//! │  │  Session    │ │  Install    │ │    Executable       │    │
//! │  │  Registry   │ │  Monitors   │ │    Scan             │    │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┼──────────────┐
//!               ▼              ▼              ▼
//!        ┌──────────┐   ┌──────────┐   ┌──────────┐
//!        │  Store   │   │ Builder  │   │ Runtime  │
//!        │ (RocksDB)│   │  (spec)  │   │ (Docker) │
//!        └──────────┘   └──────────┘   └──────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use arcadia_control::{ControlConfig, Orchestrator, OrchestratorService};
//! use arcadia_runtime::{DockerRuntime, GameDescriptor, HostCapabilities, LaunchMode, Platform, RuntimeConfig};
//! use arcadia_store::RocksStore;
//! use arcadia_core::SessionId;
//!
//! # async fn example(game: GameDescriptor, platform: Platform) -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/tmp/arcadia")?);
//! let runtime = Arc::new(DockerRuntime::connect(&RuntimeConfig::default())?);
//!
//! let orchestrator = OrchestratorService::new(
//!     runtime,
//!     store,
//!     HostCapabilities::detect(),
//!     ControlConfig::from_env(),
//! );
//!
//! let launched = orchestrator
//!     .launch_game(SessionId::generate(), &game, &platform, LaunchMode::Play)
//!     .await?;
//! orchestrator.stop_game(&launched.container_id).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # State Machine
//!
//! Sessions follow a strict state machine:
//!
//! - `Starting` → `Running`, `Stopping`, or `Error`
//! - `Running` → `Paused`, `Stopping`, or `Error`
//! - `Paused` → `Running`, `Stopping`, or `Error`
//! - `Stopping` → `Stopped` or `Error`
//! - `Error` → `Stopped` (acknowledged by a later stop)
//!
//! Installations move `not_installed` → `installing` → `installed` | `failed`,
//! and back to `installing` or `not_installed` from either outcome. See the
//! [`lifecycle`] module for transition validation helpers.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
mod install;
pub mod lifecycle;
pub mod orchestrator;
pub mod registry;
pub mod scan;
pub mod types;

pub use error::{ControlError, Result};
pub use orchestrator::{Orchestrator, OrchestratorService};
pub use registry::SessionRegistry;
pub use types::{
    CleanupReport, ControlConfig, DebugLaunch, InstallRequest, LaunchResponse, SessionFilter,
    SessionPatch,
};

// Re-export commonly used types from dependencies for convenience
pub use arcadia_core::{ContainerId, GameId, SessionId};
pub use arcadia_store::{GameSession, Installation, InstallStatus, SessionMode, SessionStatus};

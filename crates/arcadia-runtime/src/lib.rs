//! Container engine client and launch spec builder for arcadia.
//!
//! This crate provides:
//!
//! - The [`ContainerRuntime`] trait and the [`DockerRuntime`] implementation that
//!   drives the Docker Engine over its local socket
//! - [`build_spec`], which turns a game, a platform profile, and a launch mode into
//!   a [`ContainerSpec`] with GPU, display, audio, and input passthrough
//! - [`HostCapabilities`], the one-time probe of host devices and sockets the
//!   builder reads
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Orchestrator                             │
//! └─────────────────────────────────────────────────────────────────┘
//!            │ GameDescriptor + Platform + LaunchMode
//!            ▼
//! ┌───────────────────────┐      ┌───────────────────────────────┐
//! │      build_spec       │◄─────│  HostCapabilities::detect()   │
//! │   (pure, no I/O)      │      │  /dev/dri, /dev/input, X11,   │
//! └───────────────────────┘      │  Wayland, PulseAudio          │
//!            │ ContainerSpec     └───────────────────────────────┘
//!            ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                ContainerRuntime (DockerRuntime)                  │
//! │  create · start · stop · kill · remove · inspect · logs · pull   │
//! └─────────────────────────────────────────────────────────────────┘
//!            │
//!            ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Docker Engine (Unix socket)                   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use arcadia_runtime::{
//!     build_spec, ContainerRuntime, DockerRuntime, GameDescriptor, HostCapabilities,
//!     LaunchMode, Platform, RuntimeConfig,
//! };
//! use arcadia_core::SessionId;
//!
//! # async fn example(game: GameDescriptor, platform: Platform) -> Result<(), Box<dyn std::error::Error>> {
//! let runtime = DockerRuntime::connect(&RuntimeConfig::from_env())?;
//! let host = HostCapabilities::detect();
//!
//! let spec = build_spec(&SessionId::generate(), &game, &platform, &LaunchMode::Play, &host)?;
//! let id = runtime.create_container(&spec).await?;
//! runtime.start_container(&id).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Testing
//!
//! Enable the `test-utils` feature to use the in-memory [`MockRuntime`], which
//! supports failure injection for create, start, stop, and pull.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod builder;
pub mod docker;
pub mod error;
pub mod host;
pub mod types;

pub use builder::{build_spec, container_name, effective_display, parse_memory};
pub use docker::{ContainerRuntime, DockerRuntime};
pub use error::{Result, RuntimeError, SpecError};
pub use host::HostCapabilities;
pub use types::{
    labels, BindMount, ContainerInfo, ContainerPhase, ContainerSpec, ContainerStatus,
    DeviceConfig, DeviceMapping, DisplayConfig, DisplayMethod, GameDescriptor,
    LaunchConfiguration, LaunchMode, Platform, PlatformKind, PullProgress, ResourceConfig,
    ResourceLimits, RuntimeConfig, VolumeInfo, WineConfig,
};

#[cfg(any(test, feature = "test-utils"))]
pub use docker::mock::MockRuntime;

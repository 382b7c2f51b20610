//! Core types and utilities for arcadia.
//!
//! This crate provides the foundational types shared by every arcadia crate:
//!
//! - **Identifiers**: Strongly-typed IDs for sessions, games, platforms, and containers
//! - **Stream events**: The SSE-shaped progress messages emitted by image pulls and downloads
//! - **Error types**: Common error definitions shared across crates
//!
//! # Example
//!
//! ```
//! use arcadia_core::{GameId, SessionId};
//!
//! // Game IDs are validated slugs
//! let game_id: GameId = "half-life-2".parse().unwrap();
//!
//! // Session IDs are random UUIDs
//! let session_id = SessionId::generate();
//! assert_ne!(session_id, SessionId::generate());
//! # let _ = game_id;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod events;
pub mod ids;

pub use error::{CoreError, Result};
pub use events::StreamEvent;
pub use ids::{ContainerId, GameId, IdError, PlatformId, SessionId};

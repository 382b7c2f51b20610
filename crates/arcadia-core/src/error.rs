//! Common error types for arcadia.
//!
//! This module provides shared error types that are used across multiple crates.

use crate::ids::{GameId, SessionId};
use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur throughout the arcadia system.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A session with the specified ID was not found.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// A game with the specified ID was not found.
    #[error("game not found: {0}")]
    GameNotFound(GameId),

    /// An invalid identifier was provided.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] crate::ids::IdError),

    /// A stream event could not be encoded.
    #[error("event encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

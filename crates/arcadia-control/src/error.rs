//! Error types for the orchestrator.
//!
//! This module defines all errors that can occur while launching, installing,
//! stopping, and maintaining game containers.

use arcadia_core::{ContainerId, GameId, SessionId};
use arcadia_runtime::{RuntimeError, SpecError};
use arcadia_store::{InstallStatus, SessionStatus};
use thiserror::Error;

/// A result type using `ControlError`.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Errors that can occur in orchestrator operations.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The requested session was not found.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// The requested game was not found.
    #[error("game not found: {0}")]
    GameNotFound(GameId),

    /// A session with this id already exists.
    #[error("session {0} already exists")]
    SessionExists(SessionId),

    /// The requested session state transition is not valid.
    #[error(
        "invalid state transition for session {session_id}: cannot transition from {from:?} to {to:?}"
    )]
    InvalidState {
        /// The session being transitioned.
        session_id: SessionId,
        /// The current state.
        from: SessionStatus,
        /// The requested target state.
        to: SessionStatus,
    },

    /// The requested installation state transition is not valid.
    #[error("invalid install transition for game {game_id}: cannot transition from {from:?} to {to:?}")]
    InvalidInstallTransition {
        /// The game being transitioned.
        game_id: GameId,
        /// The current installation state.
        from: InstallStatus,
        /// The requested installation state.
        to: InstallStatus,
    },

    /// The session already has a different container.
    #[error("session {session_id} already has container {existing}")]
    ContainerAlreadyAssigned {
        /// The session being updated.
        session_id: SessionId,
        /// The container already assigned.
        existing: ContainerId,
    },

    /// An installer is already running for this game.
    #[error("an installation is already in progress for game {0}")]
    InstallInProgress(GameId),

    /// The launch request could not be turned into a container spec.
    #[error("invalid launch request: {0}")]
    Spec(#[from] SpecError),

    /// The request is malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The engine failed to create or start the container.
    #[error("failed to launch session {session_id}: {message}")]
    LaunchError {
        /// The session whose container failed.
        session_id: SessionId,
        /// Engine failure message.
        message: String,
    },

    /// Container engine error.
    #[error("container runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// A diagnostic call did not finish in time.
    #[error("timed out during {0}")]
    Timeout(&'static str),

    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(#[from] arcadia_store::StoreError),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ControlError {
    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::SessionNotFound(_) | Self::GameNotFound(_) => 404,
            Self::Spec(_) | Self::InvalidRequest(_) => 400,
            Self::SessionExists(_)
            | Self::InvalidState { .. }
            | Self::InvalidInstallTransition { .. }
            | Self::ContainerAlreadyAssigned { .. }
            | Self::InstallInProgress(_) => 409,
            Self::LaunchError { .. } => 502,
            Self::Runtime(e) => e.http_status_code(),
            Self::Timeout(_) => 504,
            Self::Store(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Runtime(e) => e.is_retriable(),
            Self::Timeout(_) | Self::Store(_) => true,
            _ => false,
        }
    }
}

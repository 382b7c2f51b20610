//! Session and installation state machines.
//!
//! This module defines the valid transitions for game sessions and game
//! installations, and provides validation that keeps both machines consistent.
//!
//! # Session State Machine
//!
//! ```text
//!     ┌──────────┐
//!     │ Starting │──────────────────────────────┐
//!     └────┬─────┘                              │
//!          │ (container started)                │
//!          ▼                                    │
//!     ┌──────────┐  (pause)   ┌────────┐        │
//!     │ Running  │◄──────────▶│ Paused │        │
//!     └────┬─────┘  (resume)  └───┬────┘        │
//!          │ (stop)               │ (stop)      │ (stop)
//!          ▼                      ▼             │
//!     ┌──────────────────────────────────┐      │
//!     │            Stopping              │◄─────┘
//!     └────────────────┬─────────────────┘
//!                      │ (engine confirmed)
//!                      ▼
//!                ┌──────────┐       ┌─────────┐
//!                │ Stopped  │◄──────│  Error  │◄── (any non-terminal state)
//!                └──────────┘ (ack) └─────────┘
//! ```
//!
//! # Installation State Machine
//!
//! ```text
//!   not_installed ──▶ installing ──▶ installed
//!         ▲               │  ▲           │
//!         │               ▼  └───────────┤ (reinstall)
//!         └─────────── failed ◄──────────┘ (uninstall goes to not_installed)
//! ```

use arcadia_core::{GameId, SessionId};
use arcadia_store::{InstallStatus, SessionStatus};

use crate::error::{ControlError, Result};

// =============================================================================
// Sessions
// =============================================================================

/// Validates a session transition and returns the target state if valid.
///
/// # Errors
///
/// Returns `ControlError::InvalidState` if the transition is not allowed.
pub fn validate_transition(
    session_id: &SessionId,
    from: SessionStatus,
    to: SessionStatus,
) -> Result<SessionStatus> {
    if is_valid_transition(from, to) {
        Ok(to)
    } else {
        Err(ControlError::InvalidState {
            session_id: *session_id,
            from,
            to,
        })
    }
}

/// Check if a session transition is valid according to the state machine.
#[must_use]
pub const fn is_valid_transition(from: SessionStatus, to: SessionStatus) -> bool {
    use SessionStatus::{Error, Paused, Running, Starting, Stopped, Stopping};

    matches!(
        (from, to),
        (Starting | Paused, Running)
            | (Running, Paused)
            | (Starting | Running | Paused, Stopping)
            | (Stopping | Error, Stopped)
            | (Starting | Running | Paused | Stopping, Error)
    )
}

/// Returns the list of valid target states from the given state.
#[must_use]
pub fn valid_transitions_from(status: SessionStatus) -> Vec<SessionStatus> {
    use SessionStatus::{Error, Paused, Running, Starting, Stopped, Stopping};

    match status {
        Starting => vec![Running, Stopping, Error],
        Running => vec![Paused, Stopping, Error],
        Paused => vec![Running, Stopping, Error],
        Stopping => vec![Stopped, Error],
        Error => vec![Stopped],
        Stopped => vec![],
    }
}

/// Returns true if the session has ended (stopped or error).
#[must_use]
pub const fn is_terminal(status: SessionStatus) -> bool {
    matches!(status, SessionStatus::Stopped | SessionStatus::Error)
}

/// Returns true if the session may still own a live container.
#[must_use]
pub const fn is_active(status: SessionStatus) -> bool {
    matches!(
        status,
        SessionStatus::Starting
            | SessionStatus::Running
            | SessionStatus::Paused
            | SessionStatus::Stopping
    )
}

// =============================================================================
// Installations
// =============================================================================

/// Validates an installation transition.
///
/// # Errors
///
/// Returns `ControlError::InvalidInstallTransition` if the transition is not allowed.
pub fn validate_install_transition(
    game_id: &GameId,
    from: InstallStatus,
    to: InstallStatus,
) -> Result<InstallStatus> {
    if is_valid_install_transition(from, to) {
        Ok(to)
    } else {
        Err(ControlError::InvalidInstallTransition {
            game_id: game_id.clone(),
            from,
            to,
        })
    }
}

/// Check if an installation transition is valid.
#[must_use]
pub const fn is_valid_install_transition(from: InstallStatus, to: InstallStatus) -> bool {
    use InstallStatus::{Failed, Installed, Installing, NotInstalled};

    matches!(
        (from, to),
        (NotInstalled | Installed | Failed, Installing)
            | (Installing, Installed | Failed)
            | (Installed | Failed, NotInstalled)
    )
}

//! Request and response types for orchestrator operations.
//!
//! These types define the contracts for launching, installing, and maintaining
//! game containers, plus the patch and filter types used by the session registry.

use std::path::PathBuf;
use std::time::Duration;

use arcadia_core::{ContainerId, GameId, SessionId};
use arcadia_store::{GameSession, ResourceUsage, SessionMode, SessionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of a successful launch or install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchResponse {
    /// Session that owns the container.
    pub session_id: SessionId,
    /// The started container.
    pub container_id: ContainerId,
}

/// Result of starting a debug container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugLaunch {
    /// Session that owns the container.
    pub session_id: SessionId,
    /// The started container.
    pub container_id: ContainerId,
    /// Command to attach a shell to the container.
    pub exec_command: String,
}

/// Installer details for `install_game`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRequest {
    /// Installer file on the host.
    pub installer_path: PathBuf,
    /// Host directory to install into.
    pub install_path: PathBuf,
    /// Arguments passed to the installer.
    #[serde(default)]
    pub installer_args: Vec<String>,
}

/// Outcome of a maintenance sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Number of resources removed.
    pub removed: usize,
    /// Ids (containers) or names (volumes) of removed resources.
    pub ids: Vec<String>,
}

impl CleanupReport {
    /// Record a removed resource.
    pub fn push(&mut self, id: impl Into<String>) {
        self.ids.push(id.into());
        self.removed = self.ids.len();
    }
}

/// A partial update applied to a session by the registry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionPatch {
    /// New lifecycle state.
    pub status: Option<SessionStatus>,
    /// Container to assign. Only accepted while none is set.
    pub container_id: Option<ContainerId>,
    /// Latest resource sample.
    pub resources: Option<ResourceUsage>,
    /// Replacement screenshot list.
    pub screenshots: Option<Vec<String>>,
    /// Failure reason.
    pub error_message: Option<String>,
    /// Time the change happened. Defaults to now.
    pub at: Option<DateTime<Utc>>,
}

impl SessionPatch {
    /// A patch that only changes the status.
    #[must_use]
    pub fn status(status: SessionStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// A patch that moves the session to `Error` with a reason.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Some(SessionStatus::Error),
            error_message: Some(message.into()),
            ..Self::default()
        }
    }

    /// A patch that assigns a container.
    #[must_use]
    pub fn container(container_id: ContainerId) -> Self {
        Self {
            container_id: Some(container_id),
            ..Self::default()
        }
    }

    /// Set the time the change happened.
    #[must_use]
    pub const fn at(mut self, at: DateTime<Utc>) -> Self {
        self.at = Some(at);
        self
    }

    /// Set the screenshot list.
    #[must_use]
    pub fn with_screenshots(mut self, screenshots: Vec<String>) -> Self {
        self.screenshots = Some(screenshots);
        self
    }
}

/// Filter for listing sessions. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFilter {
    /// Only sessions for this game.
    #[serde(default)]
    pub game_id: Option<GameId>,
    /// Only sessions in this state.
    #[serde(default)]
    pub status: Option<SessionStatus>,
    /// Only sessions started in this mode.
    #[serde(default)]
    pub mode: Option<SessionMode>,
}

impl SessionFilter {
    /// Check whether a session passes the filter.
    #[must_use]
    pub fn matches(&self, session: &GameSession) -> bool {
        self.game_id.as_ref().is_none_or(|g| *g == session.game_id)
            && self.status.is_none_or(|s| s == session.status)
            && self.mode.is_none_or(|m| m == session.mode)
    }
}

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Root directory holding per-game install directories.
    pub install_root: PathBuf,
    /// Root directory holding per-session screenshot directories.
    pub screenshot_root: PathBuf,
    /// Delay between install monitor polls.
    pub install_poll_interval: Duration,
    /// Bound on a single install monitor poll.
    pub install_poll_timeout: Duration,
    /// Bound on logs and inspect calls.
    pub diagnostic_timeout: Duration,
    /// Grace period before a stop request falls back to kill.
    pub stop_grace: Duration,
    /// Maximum directory depth for executable scans.
    pub scan_max_depth: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            install_root: PathBuf::from("/var/lib/arcadia/games"),
            screenshot_root: PathBuf::from("/var/lib/arcadia/screenshots"),
            install_poll_interval: Duration::from_secs(2),
            install_poll_timeout: Duration::from_secs(10),
            diagnostic_timeout: Duration::from_secs(5),
            stop_grace: Duration::from_secs(10),
            scan_max_depth: 4,
        }
    }
}

impl ControlConfig {
    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `INSTALL_ROOT`: Root directory for game installs
    /// - `SCREENSHOT_ROOT`: Root directory for session screenshots
    /// - `INSTALL_POLL_INTERVAL_MS`: Delay between install monitor polls
    /// - `INSTALL_POLL_TIMEOUT_SECS`: Bound on a single install poll
    /// - `DIAGNOSTIC_TIMEOUT_SECS`: Bound on logs and inspect calls
    /// - `STOP_GRACE_SECS`: Grace period before kill
    /// - `SCAN_MAX_DEPTH`: Executable scan depth
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("INSTALL_ROOT") {
            config.install_root = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("SCREENSHOT_ROOT") {
            config.screenshot_root = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("INSTALL_POLL_INTERVAL_MS") {
            if let Ok(ms) = val.parse() {
                config.install_poll_interval = Duration::from_millis(ms);
            }
        }
        if let Ok(val) = std::env::var("INSTALL_POLL_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse() {
                config.install_poll_timeout = Duration::from_secs(secs);
            }
        }
        if let Ok(val) = std::env::var("DIAGNOSTIC_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse() {
                config.diagnostic_timeout = Duration::from_secs(secs);
            }
        }
        if let Ok(val) = std::env::var("STOP_GRACE_SECS") {
            if let Ok(secs) = val.parse() {
                config.stop_grace = Duration::from_secs(secs);
            }
        }
        if let Ok(val) = std::env::var("SCAN_MAX_DEPTH") {
            if let Ok(depth) = val.parse() {
                config.scan_max_depth = depth;
            }
        }

        config
    }

    /// Default install directory for a game.
    #[must_use]
    pub fn install_path_for(&self, game_id: &GameId) -> PathBuf {
        self.install_root.join(game_id.as_str())
    }

    /// Screenshot directory for a session.
    #[must_use]
    pub fn screenshot_dir_for(&self, session_id: &SessionId) -> PathBuf {
        self.screenshot_root.join(session_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arcadia_core::PlatformId;

    #[test]
    fn control_config_defaults() {
        let config = ControlConfig::default();
        assert_eq!(config.diagnostic_timeout, Duration::from_secs(5));
        assert_eq!(config.install_poll_timeout, Duration::from_secs(10));
        assert_eq!(config.scan_max_depth, 4);
    }

    #[test]
    fn per_game_and_session_paths() {
        let config = ControlConfig {
            install_root: PathBuf::from("/installed"),
            screenshot_root: PathBuf::from("/shots"),
            ..ControlConfig::default()
        };
        let game = GameId::new("quake").unwrap();
        assert_eq!(config.install_path_for(&game), PathBuf::from("/installed/quake"));

        let session = SessionId::generate();
        assert_eq!(
            config.screenshot_dir_for(&session),
            PathBuf::from(format!("/shots/{session}"))
        );
    }

    #[test]
    fn cleanup_report_counts() {
        let mut report = CleanupReport::default();
        assert_eq!(report.removed, 0);
        report.push("abc");
        report.push("def");
        assert_eq!(report.removed, 2);
        assert_eq!(report.ids, vec!["abc", "def"]);
    }

    #[test]
    fn session_filter_matches() {
        let session = GameSession::starting(
            SessionId::generate(),
            GameId::new("quake").unwrap(),
            PlatformId::new("native").unwrap(),
            SessionMode::Play,
        );

        assert!(SessionFilter::default().matches(&session));
        assert!(SessionFilter {
            game_id: Some(GameId::new("quake").unwrap()),
            status: Some(SessionStatus::Starting),
            mode: None,
        }
        .matches(&session));
        assert!(!SessionFilter {
            mode: Some(SessionMode::Install),
            ..SessionFilter::default()
        }
        .matches(&session));
    }
}

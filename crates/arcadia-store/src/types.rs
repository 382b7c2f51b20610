//! Domain types stored in the database.
//!
//! These types represent the persisted state of game sessions, download tasks,
//! game installation records, and paired streaming clients.

use std::path::PathBuf;

use arcadia_core::{ContainerId, GameId, PlatformId, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Sessions
// =============================================================================

/// A game session record stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSession {
    /// Unique identifier for the session.
    pub id: SessionId,
    /// The game being played, installed, or debugged.
    pub game_id: GameId,
    /// Platform profile used to build the container.
    pub platform_id: PlatformId,
    /// Engine container id. Set once, cleared when the session stops.
    pub container_id: Option<ContainerId>,
    /// Current lifecycle state.
    pub status: SessionStatus,
    /// Why the container was started.
    pub mode: SessionMode,
    /// Timing information.
    #[serde(default)]
    pub performance: Performance,
    /// Last sampled resource usage.
    #[serde(default)]
    pub resources: ResourceUsage,
    /// Ordered capture references collected when the session stops.
    #[serde(default)]
    pub screenshots: Vec<String>,
    /// Failure reason when the session is in `Error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl GameSession {
    /// Create a new session in the `Starting` state.
    #[must_use]
    pub fn starting(
        id: SessionId,
        game_id: GameId,
        platform_id: PlatformId,
        mode: SessionMode,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            game_id,
            platform_id,
            container_id: None,
            status: SessionStatus::Starting,
            mode,
            performance: Performance::default(),
            resources: ResourceUsage::default(),
            screenshots: Vec::new(),
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Lifecycle states for a game session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SessionStatus {
    /// Container is being created and started.
    Starting = 1,
    /// Container is running.
    Running = 2,
    /// Container is paused.
    Paused = 3,
    /// Stop requested, waiting for the engine.
    Stopping = 4,
    /// Container terminated and post-processing finished.
    Stopped = 5,
    /// Unrecoverable failure.
    Error = 6,
}

impl SessionStatus {
    /// Convert the state to its numeric representation.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Try to convert a numeric value to a `SessionStatus`.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Starting),
            2 => Some(Self::Running),
            3 => Some(Self::Paused),
            4 => Some(Self::Stopping),
            5 => Some(Self::Stopped),
            6 => Some(Self::Error),
            _ => None,
        }
    }
}

/// Why a session's container was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Gameplay.
    #[default]
    Play,
    /// Running a game installer.
    Install,
    /// Interactive troubleshooting shell.
    Debug,
}

impl SessionMode {
    /// Label value used on containers.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Install => "install",
            Self::Debug => "debug",
        }
    }
}

/// Session timing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Performance {
    /// When the container was reported started.
    pub start_time: Option<DateTime<Utc>>,
    /// When the container was confirmed stopped.
    pub end_time: Option<DateTime<Utc>>,
    /// `end_time - start_time`, present only when both exist.
    pub duration_seconds: Option<i64>,
}

/// Sampled resource usage of a session's container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// CPU usage in percent of one core.
    pub cpu_percent: f64,
    /// Resident memory in bytes.
    pub memory_bytes: u64,
    /// Network counters.
    #[serde(default)]
    pub network: NetworkUsage,
}

/// Network byte counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkUsage {
    /// Bytes received.
    pub bytes_in: u64,
    /// Bytes sent.
    pub bytes_out: u64,
}

// =============================================================================
// Downloads
// =============================================================================

/// One file of a multi-file download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadFile {
    /// Source URL.
    pub url: String,
    /// Sanitized file name inside the cache directory.
    pub filename: String,
    /// Expected size, when the source advertises it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_size_bytes: Option<u64>,
}

/// Lifecycle states for a download task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    /// Waiting for a worker slot.
    Queued,
    /// A worker is fetching files.
    Downloading,
    /// All files are on disk.
    Completed,
    /// A file failed; earlier files are retained.
    Failed,
    /// Cancelled by the caller; partial files are retained.
    Cancelled,
}

impl DownloadStatus {
    /// Returns true for completed, failed, and cancelled tasks.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true for queued and downloading tasks.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Queued | Self::Downloading)
    }
}

/// A multi-file download for one game, keyed by game id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadTask {
    /// The game the files belong to.
    pub game_id: GameId,
    /// Directory name under the cache root.
    pub cache_directory_name: String,
    /// Display title.
    pub title: String,
    /// Files in download order.
    pub files: Vec<DownloadFile>,
    /// Current lifecycle state.
    pub status: DownloadStatus,
    /// Number of files fully on disk.
    pub completed_files: usize,
    /// Number of files in the task.
    pub total_files: usize,
    /// File currently being fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_file: Option<String>,
    /// Progress of the current file, 0-100.
    pub current_file_progress_percent: f64,
    /// Aggregate progress, 0-100.
    pub total_progress_percent: f64,
    /// Bytes fetched over the network by the current run.
    #[serde(default)]
    pub bytes_downloaded: u64,
    /// Most recent transfer rate.
    #[serde(default)]
    pub bytes_per_second: u64,
    /// Failure reason when the task is `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl DownloadTask {
    /// Create a new queued task.
    #[must_use]
    pub fn queued(
        game_id: GameId,
        cache_directory_name: String,
        title: String,
        files: Vec<DownloadFile>,
    ) -> Self {
        let now = Utc::now();
        let total_files = files.len();
        Self {
            game_id,
            cache_directory_name,
            title,
            files,
            status: DownloadStatus::Queued,
            completed_files: 0,
            total_files,
            current_file: None,
            current_file_progress_percent: 0.0,
            total_progress_percent: 0.0,
            bytes_downloaded: 0,
            bytes_per_second: 0,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// =============================================================================
// Games
// =============================================================================

/// Installation state of a game, with the data each state carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Installation {
    /// No installation has been attempted or it was removed.
    #[default]
    NotInstalled,
    /// An installer container is running.
    Installing {
        /// Session that runs the installer.
        session_id: SessionId,
        /// Installer container.
        container_id: ContainerId,
        /// Directory the game is being installed into.
        install_path: PathBuf,
        /// When installation started.
        started_at: DateTime<Utc>,
    },
    /// Installation finished and a launch target is known (or the installer succeeded).
    Installed {
        /// Directory the game was installed into.
        install_path: PathBuf,
        /// Preferred executable, absolute host path.
        file_path: Option<PathBuf>,
        /// Ranked executables relative to `install_path`.
        executables: Vec<String>,
        /// When installation finished.
        installed_at: DateTime<Utc>,
    },
    /// Installation finished without a usable result.
    Failed {
        /// Failure reason.
        reason: String,
        /// Installer exit code, if the engine reported one.
        exit_code: Option<i64>,
        /// When the failure was recorded.
        failed_at: DateTime<Utc>,
    },
}

impl Installation {
    /// Return the discriminant of this installation state.
    #[must_use]
    pub const fn status(&self) -> InstallStatus {
        match self {
            Self::NotInstalled => InstallStatus::NotInstalled,
            Self::Installing { .. } => InstallStatus::Installing,
            Self::Installed { .. } => InstallStatus::Installed,
            Self::Failed { .. } => InstallStatus::Failed,
        }
    }
}

/// Discriminant of [`Installation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStatus {
    /// Not installed.
    NotInstalled,
    /// Installer running.
    Installing,
    /// Installed.
    Installed,
    /// Installation failed.
    Failed,
}

/// One completed play session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayStats {
    /// When the session started.
    pub played_at: DateTime<Utc>,
    /// Session length.
    pub duration_seconds: i64,
}

/// A game library record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    /// Game identifier.
    pub game_id: GameId,
    /// Display title.
    pub title: String,
    /// Platform profile the game runs on.
    pub platform_id: PlatformId,
    /// Installation state.
    #[serde(default)]
    pub installation: Installation,
    /// Completed play sessions, oldest first.
    #[serde(default)]
    pub play_stats: Vec<PlayStats>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl GameRecord {
    /// Create a new record for a game that is not installed.
    #[must_use]
    pub fn new(game_id: GameId, title: impl Into<String>, platform_id: PlatformId) -> Self {
        let now = Utc::now();
        Self {
            game_id,
            title: title.into(),
            platform_id,
            installation: Installation::NotInstalled,
            play_stats: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

// =============================================================================
// Pairing
// =============================================================================

/// A streaming client that completed PIN pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairedClient {
    /// Secret the pairing was accepted for.
    pub pair_secret: String,
    /// Address the client paired from.
    pub client_ip: String,
    /// When pairing was accepted.
    pub paired_at: DateTime<Utc>,
}

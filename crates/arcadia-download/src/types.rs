//! Request, event, and configuration types for downloads.

use std::path::PathBuf;
use std::time::Duration;

use arcadia_core::{GameId, StreamEvent};
use arcadia_store::{DownloadFile, DownloadStatus, DownloadTask};
use serde::{Deserialize, Serialize};

/// A request to download a set of files for a game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// The game the files belong to.
    pub game_id: GameId,
    /// Directory name under the cache root. Derived from the first URL when absent.
    #[serde(default)]
    pub cache_directory_name: Option<String>,
    /// Display title.
    pub title: String,
    /// Files in download order.
    pub files: Vec<DownloadFile>,
}

/// Snapshot of a task carried by progress events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadProgress {
    /// Lifecycle state at the time of the event.
    pub status: DownloadStatus,
    /// File currently being fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_file: Option<String>,
    /// Progress of the current file, 0-100.
    pub current_file_progress_percent: f64,
    /// Aggregate progress, 0-100.
    pub total_progress_percent: f64,
    /// Number of files fully on disk.
    pub completed_files: usize,
    /// Number of files in the task.
    pub total_files: usize,
    /// Bytes fetched by the current run.
    pub bytes_downloaded: u64,
    /// Most recent transfer rate.
    pub bytes_per_second: u64,
}

impl From<&DownloadTask> for DownloadProgress {
    fn from(task: &DownloadTask) -> Self {
        Self {
            status: task.status,
            current_file: task.current_file.clone(),
            current_file_progress_percent: task.current_file_progress_percent,
            total_progress_percent: task.total_progress_percent,
            completed_files: task.completed_files,
            total_files: task.total_files,
            bytes_downloaded: task.bytes_downloaded,
            bytes_per_second: task.bytes_per_second,
        }
    }
}

/// A progress event for one game, as broadcast to subscribers.
///
/// Serializes flat: `{"game_id":"doom","type":"progress",...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadEvent {
    /// The game the event belongs to.
    pub game_id: GameId,
    /// The event itself.
    #[serde(flatten)]
    pub event: StreamEvent<DownloadProgress>,
}

impl DownloadEvent {
    /// Returns the SSE event name.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        self.event.event_name()
    }
}

/// Aggregate view of the download table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadSummary {
    /// Tasks currently holding a worker slot.
    pub active: usize,
    /// Tasks waiting for a slot.
    pub queued: usize,
    /// Current concurrency limit.
    pub max_concurrent: usize,
    /// Sum of the transfer rates of active tasks.
    pub bytes_per_second: u64,
}

/// Configuration for the download manager and its workers.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Directory holding one cache directory per download.
    pub cache_root: PathBuf,
    /// Initial concurrency limit.
    pub max_concurrent: usize,
    /// Redirects followed per request.
    pub max_redirects: usize,
    /// Minimum delay between progress events of one task.
    pub progress_interval: Duration,
    /// Connect timeout for file requests.
    pub connect_timeout: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            cache_root: PathBuf::from("/var/lib/arcadia/cache"),
            max_concurrent: 2,
            max_redirects: 5,
            progress_interval: Duration::from_millis(250),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl DownloadConfig {
    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `CACHE_ROOT`: Directory for download cache directories
    /// - `MAX_CONCURRENT_DOWNLOADS`: Initial concurrency limit (at least 1)
    /// - `MAX_REDIRECTS`: Redirects followed per request
    /// - `PROGRESS_INTERVAL_MS`: Minimum delay between progress events
    /// - `DOWNLOAD_CONNECT_TIMEOUT_SECS`: Connect timeout for file requests
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("CACHE_ROOT") {
            config.cache_root = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("MAX_CONCURRENT_DOWNLOADS") {
            if let Ok(n) = val.parse::<usize>() {
                config.max_concurrent = n.max(1);
            }
        }
        if let Ok(val) = std::env::var("MAX_REDIRECTS") {
            if let Ok(n) = val.parse() {
                config.max_redirects = n;
            }
        }
        if let Ok(val) = std::env::var("PROGRESS_INTERVAL_MS") {
            if let Ok(ms) = val.parse() {
                config.progress_interval = Duration::from_millis(ms);
            }
        }
        if let Ok(val) = std::env::var("DOWNLOAD_CONNECT_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse() {
                config.connect_timeout = Duration::from_secs(secs);
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = DownloadConfig::default();
        assert_eq!(config.max_concurrent, 2);
        assert_eq!(config.max_redirects, 5);
        assert_eq!(config.progress_interval, Duration::from_millis(250));
    }

    #[test]
    fn event_serializes_flat() {
        let task = DownloadTask::queued(
            GameId::new("doom").unwrap(),
            "doom-0011223344556677".into(),
            "Doom".into(),
            vec![DownloadFile {
                url: "http://mirror/doom.zip".into(),
                filename: "doom.zip".into(),
                expected_size_bytes: None,
            }],
        );
        let event = DownloadEvent {
            game_id: task.game_id.clone(),
            event: StreamEvent::Progress(DownloadProgress::from(&task)),
        };

        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["game_id"], "doom");
        assert_eq!(json["type"], "progress");
        assert_eq!(json["status"], "queued");
        assert_eq!(json["total_files"], 1);
        assert_eq!(event.event_name(), "progress");
    }

    #[test]
    fn error_event_keeps_game_id() {
        let event = DownloadEvent {
            game_id: GameId::new("doom").unwrap(),
            event: StreamEvent::error("mirror returned HTTP 503"),
        };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["game_id"], "doom");
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "mirror returned HTTP 503");
    }
}

//! Types for the runtime crate.
//!
//! Two groups live here: the engine-facing description of a container
//! ([`ContainerSpec`], [`ContainerInfo`], [`VolumeInfo`]) and the caller-facing
//! launch inputs ([`GameDescriptor`], [`Platform`], [`LaunchMode`],
//! [`LaunchConfiguration`]) that the builder turns into a spec.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use arcadia_core::{ContainerId, GameId, PlatformId, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Label keys carried by every managed container.
pub mod labels {
    /// Marks a container or volume as created by arcadia.
    pub const MANAGED: &str = "arcadia.managed";
    /// Session that owns the container.
    pub const SESSION_ID: &str = "arcadia.session-id";
    /// Game the container runs.
    pub const GAME_ID: &str = "arcadia.game-id";
    /// Launch mode (`play`, `install`, `debug`).
    pub const MODE: &str = "arcadia.mode";
}

// =============================================================================
// Container specification
// =============================================================================

/// A complete, engine-ready container description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Container name.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Entrypoint override.
    pub entrypoint: Option<Vec<String>>,
    /// Command arguments.
    pub cmd: Vec<String>,
    /// Environment variables.
    pub env: BTreeMap<String, String>,
    /// Host bind mounts.
    pub binds: Vec<BindMount>,
    /// Host devices passed through.
    pub devices: Vec<DeviceMapping>,
    /// Container labels.
    pub labels: BTreeMap<String, String>,
    /// Working directory inside the container.
    pub working_dir: Option<String>,
    /// Allocate a TTY.
    pub tty: bool,
    /// Keep stdin open.
    pub open_stdin: bool,
    /// CPU and memory limits.
    pub limits: ResourceLimits,
    /// Size of `/dev/shm`.
    pub shm_size_bytes: Option<i64>,
}

/// A host path bound into the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindMount {
    /// Path on the host.
    pub host_path: PathBuf,
    /// Path inside the container.
    pub container_path: String,
    /// Mount read-only.
    pub read_only: bool,
}

impl BindMount {
    /// Create a read-write bind.
    pub fn rw(host_path: impl Into<PathBuf>, container_path: impl Into<String>) -> Self {
        Self {
            host_path: host_path.into(),
            container_path: container_path.into(),
            read_only: false,
        }
    }

    /// Create a read-only bind.
    pub fn ro(host_path: impl Into<PathBuf>, container_path: impl Into<String>) -> Self {
        Self {
            read_only: true,
            ..Self::rw(host_path, container_path)
        }
    }

    /// Render the bind in the engine's `host:container[:ro]` form.
    #[must_use]
    pub fn to_engine_string(&self) -> String {
        let suffix = if self.read_only { ":ro" } else { "" };
        format!(
            "{}:{}{suffix}",
            self.host_path.display(),
            self.container_path
        )
    }
}

/// A host device node passed into the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMapping {
    /// Device path on the host.
    pub host_path: PathBuf,
    /// Device path inside the container.
    pub container_path: String,
}

impl DeviceMapping {
    /// Map a device to the same path inside the container.
    pub fn same_path(host_path: impl Into<PathBuf>) -> Self {
        let host_path = host_path.into();
        let container_path = host_path.display().to_string();
        Self {
            host_path,
            container_path,
        }
    }
}

/// Resource limits in engine units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// CPU quota in units of 1e-9 CPUs.
    pub nano_cpus: i64,
    /// Memory limit in bytes.
    pub memory_bytes: i64,
}

// =============================================================================
// Engine state
// =============================================================================

/// Coarse container state reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContainerPhase {
    /// Created but never started.
    Created,
    /// Running.
    Running,
    /// Paused.
    Paused,
    /// Being restarted by the engine.
    Restarting,
    /// Process exited.
    Exited,
    /// Engine could not clean the container up.
    Dead,
    /// State cannot be determined.
    #[default]
    Unknown,
}

impl ContainerPhase {
    /// Check if the container has stopped for good.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Exited | Self::Dead)
    }

    /// Check if the container is running, paused, or restarting.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Paused | Self::Restarting)
    }
}

/// Status of a container as reported by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatus {
    /// Current phase.
    pub phase: ContainerPhase,
    /// Exit code once the process has exited.
    pub exit_code: Option<i64>,
    /// When the process started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the process exited.
    pub finished_at: Option<DateTime<Utc>>,
    /// Engine error message, if any.
    pub error: Option<String>,
}

/// Information about a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    /// Engine container id.
    pub id: ContainerId,
    /// Container name without the leading slash.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Container labels.
    pub labels: HashMap<String, String>,
    /// Current status.
    pub status: ContainerStatus,
    /// Named volumes mounted by the container.
    pub volumes: Vec<String>,
}

impl ContainerInfo {
    /// Check whether arcadia created this container.
    #[must_use]
    pub fn is_managed(&self) -> bool {
        self.labels.get(labels::MANAGED).is_some_and(|v| v == "true")
    }

    /// Session id from the container labels.
    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        self.labels.get(labels::SESSION_ID)?.parse().ok()
    }

    /// Game id from the container labels.
    #[must_use]
    pub fn game_id(&self) -> Option<GameId> {
        GameId::new(self.labels.get(labels::GAME_ID)?.as_str()).ok()
    }
}

/// Information about a named volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeInfo {
    /// Volume name.
    pub name: String,
    /// Volume labels.
    pub labels: HashMap<String, String>,
    /// Host mountpoint.
    pub mountpoint: String,
}

impl VolumeInfo {
    /// Check whether arcadia created this volume.
    #[must_use]
    pub fn is_managed(&self) -> bool {
        self.labels.get(labels::MANAGED).is_some_and(|v| v == "true")
    }
}

/// Aggregated progress of an image pull.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullProgress {
    /// Image being pulled.
    pub image: String,
    /// Latest engine status line.
    pub status: String,
    /// Layer the status line refers to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
    /// Bytes fetched across all known layers.
    pub current_bytes: u64,
    /// Bytes expected across all known layers.
    pub total_bytes: u64,
    /// `current_bytes / total_bytes` as a percentage.
    pub percent: f64,
}

impl PullProgress {
    /// Build a progress snapshot and compute its percentage.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(
        image: impl Into<String>,
        status: impl Into<String>,
        layer: Option<String>,
        current_bytes: u64,
        total_bytes: u64,
    ) -> Self {
        let percent = if total_bytes == 0 {
            0.0
        } else {
            (current_bytes.min(total_bytes) as f64 / total_bytes as f64) * 100.0
        };
        Self {
            image: image.into(),
            status: status.into(),
            layer,
            current_bytes,
            total_bytes,
            percent,
        }
    }
}

// =============================================================================
// Launch inputs
// =============================================================================

/// The game a container is built for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameDescriptor {
    /// Game identifier.
    pub game_id: GameId,
    /// Display title.
    pub title: String,
    /// Host directory holding the game files, mounted at `/game`.
    pub install_path: PathBuf,
    /// Executable relative to `install_path`. Required for play mode.
    #[serde(default)]
    pub executable: Option<String>,
    /// Arguments passed to the executable.
    #[serde(default)]
    pub launch_args: Vec<String>,
    /// Display, device, and resource configuration.
    #[serde(default)]
    pub config: LaunchConfiguration,
}

/// A platform profile: which runner image applies to a class of games.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    /// Platform identifier.
    pub id: PlatformId,
    /// Compatibility layer.
    pub kind: PlatformKind,
    /// Runner image for play and debug.
    pub image: String,
    /// Image used to run installers, if different from `image`.
    #[serde(default)]
    pub install_image: Option<String>,
}

/// Compatibility layer a platform uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlatformKind {
    /// Native Linux binaries.
    Native,
    /// Windows binaries through Wine.
    Wine,
    /// Windows binaries through Proton.
    Proton,
    /// ROMs through a libretro core.
    Emulator {
        /// Core path inside the runner image.
        core: String,
    },
}

impl PlatformKind {
    /// Check if the platform needs a Wine prefix.
    #[must_use]
    pub const fn uses_wine(&self) -> bool {
        matches!(self, Self::Wine | Self::Proton)
    }
}

/// What the container is started for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum LaunchMode {
    /// Run the game.
    Play,
    /// Run an installer.
    Install {
        /// Installer file on the host.
        installer_path: PathBuf,
        /// Host directory the game is installed into.
        install_path: PathBuf,
        /// Arguments passed to the installer.
        #[serde(default)]
        installer_args: Vec<String>,
    },
    /// Keep an interactive container alive for troubleshooting.
    Debug,
}

impl LaunchMode {
    /// Label value for the mode.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Install { .. } => "install",
            Self::Debug => "debug",
        }
    }
}

/// Caller-supplied launch configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchConfiguration {
    /// Display forwarding.
    pub display: DisplayConfig,
    /// Resource overrides.
    pub resources: ResourceConfig,
    /// Device passthrough toggles.
    pub devices: DeviceConfig,
    /// Extra environment variables.
    pub environment: BTreeMap<String, String>,
    /// Wine settings for Wine and Proton platforms.
    pub wine: Option<WineConfig>,
}

/// Display forwarding settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Forwarding method.
    pub method: DisplayMethod,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            method: DisplayMethod::X11,
        }
    }
}

/// How the container reaches a display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMethod {
    /// Host X server socket.
    #[default]
    X11,
    /// Host Wayland compositor socket.
    Wayland,
    /// No display forwarding.
    Headless,
}

impl DisplayMethod {
    /// Lowercase name of the method.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::X11 => "x11",
            Self::Wayland => "wayland",
            Self::Headless => "headless",
        }
    }
}

/// CPU and memory overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Number of CPUs, fractional allowed.
    pub cpu: Option<f64>,
    /// Memory limit such as `"4g"` or `"512m"`.
    pub memory: Option<String>,
}

/// Device passthrough toggles. All default to on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// GPU render nodes.
    pub gpu: bool,
    /// Input event devices and uinput.
    pub input: bool,
    /// Sound devices and the PulseAudio socket.
    pub audio: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            gpu: true,
            input: true,
            audio: true,
        }
    }
}

/// Wine prefix settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WineConfig {
    /// Wine version the runner image should select.
    pub version: Option<String>,
    /// Host directory holding the prefix.
    pub prefix_path: Option<PathBuf>,
    /// DLL overrides, e.g. `d3d9 -> "n,b"`.
    pub dll_overrides: BTreeMap<String, String>,
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the container engine client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Engine socket. Uses the local defaults (`DOCKER_HOST` or `/var/run/docker.sock`) when unset.
    pub socket_path: Option<PathBuf>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            timeout_secs: 120,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `DOCKER_SOCKET`: Path of the engine's Unix socket
    /// - `DOCKER_TIMEOUT_SECS`: Request timeout in seconds
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("DOCKER_SOCKET") {
            if !val.is_empty() {
                config.socket_path = Some(PathBuf::from(val));
            }
        }
        if let Ok(val) = std::env::var("DOCKER_TIMEOUT_SECS") {
            if let Ok(n) = val.parse() {
                config.timeout_secs = n;
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_phase_states() {
        assert!(ContainerPhase::Exited.is_terminal());
        assert!(ContainerPhase::Dead.is_terminal());
        assert!(!ContainerPhase::Running.is_terminal());

        assert!(ContainerPhase::Running.is_active());
        assert!(ContainerPhase::Paused.is_active());
        assert!(!ContainerPhase::Created.is_active());
        assert!(!ContainerPhase::Exited.is_active());
    }

    #[test]
    fn bind_engine_string() {
        assert_eq!(
            BindMount::rw("/srv/games/quake", "/game").to_engine_string(),
            "/srv/games/quake:/game"
        );
        assert_eq!(
            BindMount::ro("/cache/setup", "/installer").to_engine_string(),
            "/cache/setup:/installer:ro"
        );
    }

    #[test]
    fn pull_progress_percent() {
        assert!((PullProgress::new("img", "Downloading", None, 50, 200).percent - 25.0).abs() < f64::EPSILON);
        assert!(PullProgress::new("img", "Waiting", None, 0, 0).percent.abs() < f64::EPSILON);
        assert!((PullProgress::new("img", "Done", None, 300, 200).percent - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn launch_configuration_defaults() {
        let config: LaunchConfiguration = serde_json::from_str("{}").unwrap();
        assert!(config.devices.gpu && config.devices.input && config.devices.audio);
        assert_eq!(config.display.method, DisplayMethod::X11);
        assert_eq!(config.display.width, 1920);
        assert!(config.wine.is_none());
    }

    #[test]
    fn launch_mode_is_tagged() {
        let mode: LaunchMode = serde_json::from_str(
            r#"{"mode":"install","installer_path":"/cache/x/setup.exe","install_path":"/installed/x"}"#,
        )
        .unwrap();
        assert_eq!(mode.as_str(), "install");
        assert!(matches!(mode, LaunchMode::Install { installer_args, .. } if installer_args.is_empty()));
    }

    #[test]
    fn managed_labels() {
        let session_id = SessionId::generate();
        let info = ContainerInfo {
            id: ContainerId::new("abc").unwrap(),
            name: "arcadia-play-quake".into(),
            image: "runner:latest".into(),
            labels: HashMap::from([
                (labels::MANAGED.to_string(), "true".to_string()),
                (labels::SESSION_ID.to_string(), session_id.to_string()),
                (labels::GAME_ID.to_string(), "quake".to_string()),
            ]),
            status: ContainerStatus::default(),
            volumes: Vec::new(),
        };
        assert!(info.is_managed());
        assert_eq!(info.session_id(), Some(session_id));
        assert_eq!(info.game_id().unwrap().as_str(), "quake");
    }

    #[test]
    fn runtime_config_defaults() {
        let config = RuntimeConfig::default();
        assert!(config.socket_path.is_none());
        assert_eq!(config.timeout_secs, 120);
    }
}

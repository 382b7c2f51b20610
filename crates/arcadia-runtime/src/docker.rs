//! Container runtime client.
//!
//! This module provides the [`ContainerRuntime`] trait and the [`DockerRuntime`]
//! implementation that talks to the Docker Engine API over its Unix socket.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bollard::errors::Error as BollardError;
use bollard::models::{
    ContainerCreateBody, ContainerInspectResponse, ContainerState, DeviceMapping as EngineDevice,
    HostConfig,
};
use bollard::query_parameters::{
    CreateContainerOptionsBuilder, CreateImageOptionsBuilder, InspectContainerOptions,
    KillContainerOptions, ListContainersOptionsBuilder, ListVolumesOptions, LogsOptionsBuilder,
    RemoveContainerOptionsBuilder, RemoveVolumeOptions, StartContainerOptions,
    StopContainerOptionsBuilder,
};
use bollard::{Docker, API_DEFAULT_VERSION};
use chrono::{DateTime, Datelike, Utc};
use futures::{StreamExt, TryStreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use arcadia_core::ContainerId;

use crate::types::{
    ContainerInfo, ContainerPhase, ContainerSpec, ContainerStatus, PullProgress, RuntimeConfig,
    VolumeInfo,
};
use crate::{Result, RuntimeError};

/// The `ContainerRuntime` trait defines the container engine operations the
/// orchestrator relies on. Operations are addressed by container id.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create a container from a spec without starting it.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the spec.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerId>;

    /// Start a created container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be started.
    async fn start_container(&self, id: &ContainerId) -> Result<()>;

    /// Ask the container to stop, letting the engine kill it after `grace`.
    ///
    /// Stopping an already stopped container succeeds.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::NotFound` if the container does not exist.
    async fn stop_container(&self, id: &ContainerId, grace: Duration) -> Result<()>;

    /// Kill the container immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine refuses.
    async fn kill_container(&self, id: &ContainerId) -> Result<()>;

    /// Force-remove a container and its anonymous volumes.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::NotFound` if the container is already gone.
    async fn remove_container(&self, id: &ContainerId) -> Result<()>;

    /// Inspect a container.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::NotFound` if the container does not exist.
    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInfo>;

    /// Return the last `tail` lines of combined stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns an error if the logs cannot be read.
    async fn container_logs(&self, id: &ContainerId, tail: usize) -> Result<Vec<String>>;

    /// List all containers, including stopped ones.
    ///
    /// # Errors
    ///
    /// Returns an error if listing fails.
    async fn list_containers(&self) -> Result<Vec<ContainerInfo>>;

    /// Pull an image, sending aggregated progress to `progress`.
    ///
    /// A dropped receiver does not abort the pull.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine reports a pull failure.
    async fn pull_image(&self, image: &str, progress: mpsc::Sender<PullProgress>) -> Result<()>;

    /// List named volumes.
    ///
    /// # Errors
    ///
    /// Returns an error if listing fails.
    async fn list_volumes(&self) -> Result<Vec<VolumeInfo>>;

    /// Remove a named volume.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::NotFound` if the volume does not exist.
    async fn remove_volume(&self, name: &str) -> Result<()>;

    /// Check that the engine answers.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is unreachable.
    async fn ping(&self) -> Result<()>;
}

/// Docker Engine client.
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to the engine using the configured socket, or the local defaults.
    ///
    /// Connecting is lazy; use [`ContainerRuntime::ping`] to verify the engine.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::Connect` if the client cannot be constructed.
    pub fn connect(config: &RuntimeConfig) -> Result<Self> {
        let docker = match &config.socket_path {
            Some(path) => Docker::connect_with_socket(
                &path.to_string_lossy(),
                config.timeout_secs,
                API_DEFAULT_VERSION,
            ),
            None => Docker::connect_with_local_defaults(),
        }
        .map_err(|e| RuntimeError::Connect(e.to_string()))?;

        info!(
            socket = ?config.socket_path,
            timeout_secs = config.timeout_secs,
            "Created container engine client"
        );

        Ok(Self { docker })
    }

    /// Create a runtime from an existing client.
    #[must_use]
    pub const fn with_client(docker: Docker) -> Self {
        Self { docker }
    }
}

fn is_status(error: &BollardError, code: u16) -> bool {
    matches!(
        error,
        BollardError::DockerResponseServerError { status_code, .. } if *status_code == code
    )
}

/// Map an engine error, turning 404 into `NotFound`.
fn engine_error(operation: &'static str, target: &str, error: BollardError) -> RuntimeError {
    if is_status(&error, 404) {
        return RuntimeError::NotFound(target.to_string());
    }
    match error {
        BollardError::DockerResponseServerError { message, .. } => RuntimeError::Engine {
            operation,
            message,
        },
        BollardError::RequestTimeoutError => RuntimeError::Timeout(operation),
        other => RuntimeError::Engine {
            operation,
            message: other.to_string(),
        },
    }
}

/// Parse an engine timestamp. The engine reports `0001-01-01T00:00:00Z` for "never".
fn parse_engine_time(value: Option<&str>) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value?)
        .ok()
        .map(|t| t.with_timezone(&Utc))
        .filter(|t| t.year() > 1)
}

fn phase_from_state(state: &ContainerState) -> ContainerPhase {
    let flag = |v: Option<bool>| v.unwrap_or(false);
    if flag(state.dead) {
        ContainerPhase::Dead
    } else if flag(state.restarting) {
        ContainerPhase::Restarting
    } else if flag(state.paused) {
        ContainerPhase::Paused
    } else if flag(state.running) {
        ContainerPhase::Running
    } else if parse_engine_time(state.finished_at.as_deref()).is_some()
        || parse_engine_time(state.started_at.as_deref()).is_some()
    {
        ContainerPhase::Exited
    } else {
        ContainerPhase::Created
    }
}

fn status_from_state(state: Option<&ContainerState>) -> ContainerStatus {
    let Some(state) = state else {
        return ContainerStatus::default();
    };
    let phase = phase_from_state(state);
    ContainerStatus {
        phase,
        exit_code: if phase.is_terminal() {
            state.exit_code
        } else {
            None
        },
        started_at: parse_engine_time(state.started_at.as_deref()),
        finished_at: parse_engine_time(state.finished_at.as_deref()),
        error: state.error.clone().filter(|e| !e.is_empty()),
    }
}

fn info_from_inspect(
    response: ContainerInspectResponse,
    requested: &ContainerId,
) -> Result<ContainerInfo> {
    let id = match response.id {
        Some(id) => ContainerId::new(id).map_err(|e| RuntimeError::Engine {
            operation: "inspect_container",
            message: e.to_string(),
        })?,
        None => requested.clone(),
    };
    let config = response.config.unwrap_or_default();
    Ok(ContainerInfo {
        id,
        name: response
            .name
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_default(),
        image: config.image.unwrap_or_default(),
        labels: config.labels.unwrap_or_default(),
        status: status_from_state(response.state.as_ref()),
        volumes: response
            .mounts
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| m.name)
            .collect(),
    })
}

/// Split `repo[:tag]`, leaving registry ports (`host:5000/repo`) intact.
fn split_image_ref(image: &str) -> (&str, &str) {
    match image.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => (repo, tag),
        _ => (image, "latest"),
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerId> {
        let body = ContainerCreateBody {
            image: Some(spec.image.clone()),
            entrypoint: spec.entrypoint.clone(),
            cmd: (!spec.cmd.is_empty()).then(|| spec.cmd.clone()),
            env: Some(spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect()),
            labels: Some(
                spec.labels
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect::<HashMap<_, _>>(),
            ),
            working_dir: spec.working_dir.clone(),
            tty: Some(spec.tty),
            open_stdin: Some(spec.open_stdin),
            host_config: Some(HostConfig {
                binds: Some(spec.binds.iter().map(|b| b.to_engine_string()).collect()),
                devices: Some(
                    spec.devices
                        .iter()
                        .map(|d| EngineDevice {
                            path_on_host: Some(d.host_path.display().to_string()),
                            path_in_container: Some(d.container_path.clone()),
                            cgroup_permissions: Some("rwm".to_string()),
                        })
                        .collect(),
                ),
                nano_cpus: Some(spec.limits.nano_cpus),
                memory: Some(spec.limits.memory_bytes),
                shm_size: spec.shm_size_bytes,
                ..HostConfig::default()
            }),
            ..ContainerCreateBody::default()
        };

        let response = self
            .docker
            .create_container(
                Some(CreateContainerOptionsBuilder::new().name(&spec.name).build()),
                body,
            )
            .await
            .map_err(|e| engine_error("create_container", &spec.name, e))?;

        for warning in &response.warnings {
            warn!(container = %spec.name, warning = %warning, "Engine warning on create");
        }

        let id = ContainerId::new(response.id).map_err(|e| RuntimeError::Engine {
            operation: "create_container",
            message: e.to_string(),
        })?;
        debug!(container_id = %id.short(), name = %spec.name, "Created container");
        Ok(id)
    }

    async fn start_container(&self, id: &ContainerId) -> Result<()> {
        self.docker
            .start_container(id.as_str(), None::<StartContainerOptions>)
            .await
            .map_err(|e| engine_error("start_container", id.as_str(), e))?;
        debug!(container_id = %id.short(), "Started container");
        Ok(())
    }

    async fn stop_container(&self, id: &ContainerId, grace: Duration) -> Result<()> {
        let grace_secs = i32::try_from(grace.as_secs()).unwrap_or(i32::MAX);
        match self
            .docker
            .stop_container(
                id.as_str(),
                Some(StopContainerOptionsBuilder::new().t(grace_secs).build()),
            )
            .await
        {
            Ok(()) => Ok(()),
            // 304: already stopped
            Err(e) if is_status(&e, 304) => Ok(()),
            Err(e) => Err(engine_error("stop_container", id.as_str(), e)),
        }
    }

    async fn kill_container(&self, id: &ContainerId) -> Result<()> {
        self.docker
            .kill_container(id.as_str(), None::<KillContainerOptions>)
            .await
            .map_err(|e| engine_error("kill_container", id.as_str(), e))?;
        warn!(container_id = %id.short(), "Killed container");
        Ok(())
    }

    async fn remove_container(&self, id: &ContainerId) -> Result<()> {
        self.docker
            .remove_container(
                id.as_str(),
                Some(RemoveContainerOptionsBuilder::new().force(true).v(true).build()),
            )
            .await
            .map_err(|e| engine_error("remove_container", id.as_str(), e))?;
        debug!(container_id = %id.short(), "Removed container");
        Ok(())
    }

    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInfo> {
        let response = self
            .docker
            .inspect_container(id.as_str(), None::<InspectContainerOptions>)
            .await
            .map_err(|e| engine_error("inspect_container", id.as_str(), e))?;
        info_from_inspect(response, id)
    }

    async fn container_logs(&self, id: &ContainerId, tail: usize) -> Result<Vec<String>> {
        let options = LogsOptionsBuilder::new()
            .stdout(true)
            .stderr(true)
            .tail(&tail.to_string())
            .build();

        let chunks: Vec<_> = self
            .docker
            .logs(id.as_str(), Some(options))
            .try_collect()
            .await
            .map_err(|e| engine_error("container_logs", id.as_str(), e))?;

        let text: String = chunks
            .into_iter()
            .map(|chunk| String::from_utf8_lossy(&chunk.into_bytes()).into_owned())
            .collect();
        Ok(text.lines().map(str::to_string).collect())
    }

    async fn list_containers(&self) -> Result<Vec<ContainerInfo>> {
        let summaries = self
            .docker
            .list_containers(Some(ListContainersOptionsBuilder::new().all(true).build()))
            .await
            .map_err(|e| engine_error("list_containers", "containers", e))?;

        let mut containers = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let Some(raw_id) = summary.id else {
                continue;
            };
            let Ok(id) = ContainerId::new(raw_id) else {
                continue;
            };
            match self.inspect_container(&id).await {
                Ok(info) => containers.push(info),
                // Removed between list and inspect.
                Err(RuntimeError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(containers)
    }

    async fn pull_image(&self, image: &str, progress: mpsc::Sender<PullProgress>) -> Result<()> {
        let (repo, tag) = split_image_ref(image);
        let options = CreateImageOptionsBuilder::new()
            .from_image(repo)
            .tag(tag)
            .build();

        info!(image = %image, "Pulling image");

        let mut layers: HashMap<String, (u64, u64)> = HashMap::new();
        let stream = self.docker.create_image(Some(options), None, None);
        futures::pin_mut!(stream);

        while let Some(item) = stream.next().await {
            let info = item.map_err(|e| engine_error("pull_image", image, e))?;
            if let Some(message) = info.error {
                return Err(RuntimeError::Engine {
                    operation: "pull_image",
                    message,
                });
            }

            if let (Some(layer), Some(detail)) = (&info.id, &info.progress_detail) {
                let current = detail.current.and_then(|v| u64::try_from(v).ok()).unwrap_or(0);
                let total = detail.total.and_then(|v| u64::try_from(v).ok()).unwrap_or(0);
                let entry = layers.entry(layer.clone()).or_default();
                entry.0 = current.max(entry.0);
                if total > 0 {
                    entry.1 = total;
                }
            }

            let (current, total) = layers
                .values()
                .fold((0u64, 0u64), |(c, t), (lc, lt)| (c + lc, t + lt));
            let snapshot = PullProgress::new(
                image,
                info.status.unwrap_or_default(),
                info.id,
                current,
                total,
            );
            if progress.send(snapshot).await.is_err() {
                debug!(image = %image, "Pull progress receiver dropped");
            }
        }

        info!(image = %image, "Image pull complete");
        Ok(())
    }

    async fn list_volumes(&self) -> Result<Vec<VolumeInfo>> {
        let response = self
            .docker
            .list_volumes(None::<ListVolumesOptions>)
            .await
            .map_err(|e| engine_error("list_volumes", "volumes", e))?;

        Ok(response
            .volumes
            .unwrap_or_default()
            .into_iter()
            .map(|v| VolumeInfo {
                name: v.name,
                labels: v.labels,
                mountpoint: v.mountpoint,
            })
            .collect())
    }

    async fn remove_volume(&self, name: &str) -> Result<()> {
        self.docker
            .remove_volume(name, None::<RemoveVolumeOptions>)
            .await
            .map_err(|e| engine_error("remove_volume", name, e))
    }

    async fn ping(&self) -> Result<()> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| RuntimeError::Connect(e.to_string()))
    }
}

/// Mock runtime for testing.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use parking_lot::Mutex;

    /// A mock runtime that keeps containers and volumes in memory.
    #[derive(Default)]
    pub struct MockRuntime {
        state: Mutex<MockState>,
    }

    #[derive(Default)]
    struct MockState {
        containers: HashMap<ContainerId, MockContainer>,
        volumes: HashMap<String, VolumeInfo>,
        next_id: u64,
        fail_create: Option<String>,
        fail_start: Option<String>,
        fail_stop: Option<String>,
        hang_on_stop: bool,
        failing_images: Vec<String>,
        pulled: Vec<String>,
        unreachable: bool,
        stop_calls: usize,
        kill_calls: usize,
        create_delay: Option<Duration>,
        creates_in_flight: usize,
        peak_creates: usize,
    }

    struct MockContainer {
        spec: ContainerSpec,
        status: ContainerStatus,
        volumes: Vec<String>,
        logs: Vec<String>,
    }

    impl MockContainer {
        fn info(&self, id: &ContainerId) -> ContainerInfo {
            ContainerInfo {
                id: id.clone(),
                name: self.spec.name.clone(),
                image: self.spec.image.clone(),
                labels: self
                    .spec
                    .labels
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
                status: self.status.clone(),
                volumes: self.volumes.clone(),
            }
        }

        fn exit(&mut self, code: i64) {
            self.status.phase = ContainerPhase::Exited;
            self.status.exit_code = Some(code);
            self.status.finished_at = Some(Utc::now());
        }
    }

    impl MockRuntime {
        /// Create a new mock runtime.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make the next `create_container` fail.
        pub fn fail_next_create(&self, message: impl Into<String>) {
            self.state.lock().fail_create = Some(message.into());
        }

        /// Make every `create_container` take `delay` before answering.
        pub fn set_create_delay(&self, delay: Duration) {
            self.state.lock().create_delay = Some(delay);
        }

        /// Highest number of `create_container` calls seen in flight at once.
        #[must_use]
        pub fn peak_concurrent_creates(&self) -> usize {
            self.state.lock().peak_creates
        }

        /// Make the next `start_container` fail.
        pub fn fail_next_start(&self, message: impl Into<String>) {
            self.state.lock().fail_start = Some(message.into());
        }

        /// Make the next `stop_container` fail.
        pub fn fail_next_stop(&self, message: impl Into<String>) {
            self.state.lock().fail_stop = Some(message.into());
        }

        /// Make `stop_container` never return.
        pub fn hang_on_stop(&self, hang: bool) {
            self.state.lock().hang_on_stop = hang;
        }

        /// Make pulls of `image` fail.
        pub fn fail_pull(&self, image: impl Into<String>) {
            self.state.lock().failing_images.push(image.into());
        }

        /// Make `ping` fail.
        pub fn set_unreachable(&self, unreachable: bool) {
            self.state.lock().unreachable = unreachable;
        }

        /// Mark a container's process as exited with `code`.
        pub fn set_exited(&self, id: &ContainerId, code: i64) {
            if let Some(container) = self.state.lock().containers.get_mut(id) {
                container.exit(code);
            }
        }

        /// Replace a container's log lines.
        pub fn set_logs(&self, id: &ContainerId, lines: Vec<String>) {
            if let Some(container) = self.state.lock().containers.get_mut(id) {
                container.logs = lines;
            }
        }

        /// Record that a container mounts a named volume.
        pub fn attach_volume(&self, id: &ContainerId, volume: impl Into<String>) {
            if let Some(container) = self.state.lock().containers.get_mut(id) {
                container.volumes.push(volume.into());
            }
        }

        /// Add a named volume.
        pub fn add_volume(&self, volume: VolumeInfo) {
            self.state.lock().volumes.insert(volume.name.clone(), volume);
        }

        /// Number of containers that exist.
        #[must_use]
        pub fn container_count(&self) -> usize {
            self.state.lock().containers.len()
        }

        /// Number of volumes that exist.
        #[must_use]
        pub fn volume_count(&self) -> usize {
            self.state.lock().volumes.len()
        }

        /// Check whether a container exists.
        #[must_use]
        pub fn contains(&self, id: &ContainerId) -> bool {
            self.state.lock().containers.contains_key(id)
        }

        /// Spec a container was created from.
        #[must_use]
        pub fn spec(&self, id: &ContainerId) -> Option<ContainerSpec> {
            self.state.lock().containers.get(id).map(|c| c.spec.clone())
        }

        /// Images pulled so far.
        #[must_use]
        pub fn pulled_images(&self) -> Vec<String> {
            self.state.lock().pulled.clone()
        }

        /// Number of `stop_container` calls.
        #[must_use]
        pub fn stop_calls(&self) -> usize {
            self.state.lock().stop_calls
        }

        /// Number of `kill_container` calls.
        #[must_use]
        pub fn kill_calls(&self) -> usize {
            self.state.lock().kill_calls
        }
    }

    fn not_found(id: &ContainerId) -> RuntimeError {
        RuntimeError::NotFound(id.to_string())
    }

    #[async_trait]
    impl ContainerRuntime for MockRuntime {
        async fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerId> {
            let delay = {
                let mut state = self.state.lock();
                state.creates_in_flight += 1;
                state.peak_creates = state.peak_creates.max(state.creates_in_flight);
                state.create_delay
            };
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let mut state = self.state.lock();
            state.creates_in_flight -= 1;
            if let Some(message) = state.fail_create.take() {
                return Err(RuntimeError::Engine {
                    operation: "create_container",
                    message,
                });
            }
            if state.containers.values().any(|c| c.spec.name == spec.name) {
                return Err(RuntimeError::Engine {
                    operation: "create_container",
                    message: format!("name {} already in use", spec.name),
                });
            }

            state.next_id += 1;
            let id = ContainerId::new(format!("{:064x}", state.next_id)).map_err(|e| {
                RuntimeError::Engine {
                    operation: "create_container",
                    message: e.to_string(),
                }
            })?;
            state.containers.insert(
                id.clone(),
                MockContainer {
                    spec: spec.clone(),
                    status: ContainerStatus {
                        phase: ContainerPhase::Created,
                        ..ContainerStatus::default()
                    },
                    volumes: Vec::new(),
                    logs: Vec::new(),
                },
            );
            Ok(id)
        }

        async fn start_container(&self, id: &ContainerId) -> Result<()> {
            let mut state = self.state.lock();
            if let Some(message) = state.fail_start.take() {
                return Err(RuntimeError::Engine {
                    operation: "start_container",
                    message,
                });
            }
            let container = state.containers.get_mut(id).ok_or_else(|| not_found(id))?;
            container.status.phase = ContainerPhase::Running;
            container.status.started_at = Some(Utc::now());
            Ok(())
        }

        async fn stop_container(&self, id: &ContainerId, _grace: Duration) -> Result<()> {
            let hang = {
                let mut state = self.state.lock();
                state.stop_calls += 1;
                if let Some(message) = state.fail_stop.take() {
                    return Err(RuntimeError::Engine {
                        operation: "stop_container",
                        message,
                    });
                }
                if !state.containers.contains_key(id) {
                    return Err(not_found(id));
                }
                state.hang_on_stop
            };
            if hang {
                std::future::pending::<()>().await;
            }

            let mut state = self.state.lock();
            let container = state.containers.get_mut(id).ok_or_else(|| not_found(id))?;
            if !container.status.phase.is_terminal() {
                container.exit(0);
            }
            Ok(())
        }

        async fn kill_container(&self, id: &ContainerId) -> Result<()> {
            let mut state = self.state.lock();
            state.kill_calls += 1;
            let container = state.containers.get_mut(id).ok_or_else(|| not_found(id))?;
            container.exit(137);
            Ok(())
        }

        async fn remove_container(&self, id: &ContainerId) -> Result<()> {
            self.state
                .lock()
                .containers
                .remove(id)
                .map(|_| ())
                .ok_or_else(|| not_found(id))
        }

        async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInfo> {
            self.state
                .lock()
                .containers
                .get(id)
                .map(|c| c.info(id))
                .ok_or_else(|| not_found(id))
        }

        async fn container_logs(&self, id: &ContainerId, tail: usize) -> Result<Vec<String>> {
            let state = self.state.lock();
            let container = state.containers.get(id).ok_or_else(|| not_found(id))?;
            let skip = container.logs.len().saturating_sub(tail);
            Ok(container.logs[skip..].to_vec())
        }

        async fn list_containers(&self) -> Result<Vec<ContainerInfo>> {
            Ok(self
                .state
                .lock()
                .containers
                .iter()
                .map(|(id, c)| c.info(id))
                .collect())
        }

        async fn pull_image(
            &self,
            image: &str,
            progress: mpsc::Sender<PullProgress>,
        ) -> Result<()> {
            let failing = {
                let mut state = self.state.lock();
                state.pulled.push(image.to_string());
                state.failing_images.iter().any(|i| i == image)
            };
            let _ = progress
                .send(PullProgress::new(image, "Downloading", Some("layer0".into()), 50, 100))
                .await;
            if failing {
                return Err(RuntimeError::Engine {
                    operation: "pull_image",
                    message: format!("manifest for {image} not found"),
                });
            }
            let _ = progress
                .send(PullProgress::new(image, "Pull complete", Some("layer0".into()), 100, 100))
                .await;
            Ok(())
        }

        async fn list_volumes(&self) -> Result<Vec<VolumeInfo>> {
            Ok(self.state.lock().volumes.values().cloned().collect())
        }

        async fn remove_volume(&self, name: &str) -> Result<()> {
            self.state
                .lock()
                .volumes
                .remove(name)
                .map(|_| ())
                .ok_or_else(|| RuntimeError::NotFound(name.to_string()))
        }

        async fn ping(&self) -> Result<()> {
            if self.state.lock().unreachable {
                return Err(RuntimeError::Connect("mock engine unreachable".into()));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockRuntime;
    use super::*;
    use crate::types::ResourceLimits;
    use std::collections::BTreeMap;

    fn test_spec(name: &str) -> ContainerSpec {
        ContainerSpec {
            name: name.into(),
            image: "arcadia/runner-native:latest".into(),
            entrypoint: None,
            cmd: vec!["/game/run.sh".into()],
            env: BTreeMap::new(),
            binds: Vec::new(),
            devices: Vec::new(),
            labels: BTreeMap::from([("arcadia.managed".to_string(), "true".to_string())]),
            working_dir: None,
            tty: false,
            open_stdin: false,
            limits: ResourceLimits {
                nano_cpus: 2_000_000_000,
                memory_bytes: 4 << 30,
            },
            shm_size_bytes: None,
        }
    }

    #[test]
    fn image_refs_split() {
        assert_eq!(split_image_ref("alpine"), ("alpine", "latest"));
        assert_eq!(split_image_ref("alpine:3.19"), ("alpine", "3.19"));
        assert_eq!(
            split_image_ref("registry.local:5000/runner"),
            ("registry.local:5000/runner", "latest")
        );
        assert_eq!(
            split_image_ref("registry.local:5000/runner:v2"),
            ("registry.local:5000/runner", "v2")
        );
    }

    #[test]
    fn engine_times() {
        assert!(parse_engine_time(Some("0001-01-01T00:00:00Z")).is_none());
        assert!(parse_engine_time(Some("2024-05-01T10:00:00.123456789Z")).is_some());
        assert!(parse_engine_time(Some("garbage")).is_none());
        assert!(parse_engine_time(None).is_none());
    }

    #[test]
    fn phases_from_state() {
        let running = ContainerState {
            running: Some(true),
            started_at: Some("2024-05-01T10:00:00Z".into()),
            ..ContainerState::default()
        };
        assert_eq!(phase_from_state(&running), ContainerPhase::Running);

        let exited = ContainerState {
            running: Some(false),
            exit_code: Some(3),
            started_at: Some("2024-05-01T10:00:00Z".into()),
            finished_at: Some("2024-05-01T10:05:00Z".into()),
            ..ContainerState::default()
        };
        let status = status_from_state(Some(&exited));
        assert_eq!(status.phase, ContainerPhase::Exited);
        assert_eq!(status.exit_code, Some(3));

        let created = ContainerState {
            running: Some(false),
            exit_code: Some(0),
            started_at: Some("0001-01-01T00:00:00Z".into()),
            finished_at: Some("0001-01-01T00:00:00Z".into()),
            ..ContainerState::default()
        };
        let status = status_from_state(Some(&created));
        assert_eq!(status.phase, ContainerPhase::Created);
        assert_eq!(status.exit_code, None);
    }

    #[tokio::test]
    async fn mock_runtime_lifecycle() {
        let runtime = MockRuntime::new();
        let id = runtime.create_container(&test_spec("a")).await.unwrap();
        assert_eq!(
            runtime.inspect_container(&id).await.unwrap().status.phase,
            ContainerPhase::Created
        );

        runtime.start_container(&id).await.unwrap();
        let info = runtime.inspect_container(&id).await.unwrap();
        assert_eq!(info.status.phase, ContainerPhase::Running);
        assert!(info.is_managed());

        runtime
            .stop_container(&id, Duration::from_secs(5))
            .await
            .unwrap();
        let info = runtime.inspect_container(&id).await.unwrap();
        assert_eq!(info.status.phase, ContainerPhase::Exited);
        assert_eq!(info.status.exit_code, Some(0));

        runtime.remove_container(&id).await.unwrap();
        assert!(matches!(
            runtime.remove_container(&id).await,
            Err(RuntimeError::NotFound(_))
        ));
        assert_eq!(runtime.container_count(), 0);
    }

    #[tokio::test]
    async fn mock_runtime_failure_injection() {
        let runtime = MockRuntime::new();
        runtime.fail_next_create("no space left on device");
        assert!(matches!(
            runtime.create_container(&test_spec("a")).await,
            Err(RuntimeError::Engine { operation: "create_container", .. })
        ));

        let id = runtime.create_container(&test_spec("a")).await.unwrap();
        assert!(runtime.create_container(&test_spec("a")).await.is_err());

        runtime.fail_next_start("exec format error");
        assert!(runtime.start_container(&id).await.is_err());
        runtime.start_container(&id).await.unwrap();
    }

    #[tokio::test]
    async fn mock_logs_tail() {
        let runtime = MockRuntime::new();
        let id = runtime.create_container(&test_spec("a")).await.unwrap();
        runtime.set_logs(&id, (1..=5).map(|i| format!("line {i}")).collect());

        let logs = runtime.container_logs(&id, 2).await.unwrap();
        assert_eq!(logs, vec!["line 4", "line 5"]);
        assert_eq!(runtime.container_logs(&id, 100).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn mock_pull_reports_progress() {
        let runtime = MockRuntime::new();
        let (tx, mut rx) = mpsc::channel(8);
        runtime.pull_image("runner:latest", tx).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert!((first.percent - 50.0).abs() < f64::EPSILON);
        let last = rx.recv().await.unwrap();
        assert!((last.percent - 100.0).abs() < f64::EPSILON);
        assert_eq!(runtime.pulled_images(), vec!["runner:latest"]);

        runtime.fail_pull("missing:latest");
        let (tx, _rx) = mpsc::channel(8);
        assert!(runtime.pull_image("missing:latest", tx).await.is_err());
    }
}

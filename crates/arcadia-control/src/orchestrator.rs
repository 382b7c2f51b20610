//! Orchestrator service implementation.
//!
//! This module provides the `Orchestrator` trait and the `OrchestratorService`
//! implementation that turns launch and install requests into supervised
//! containers and keeps the session registry and game records in step with them.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use arcadia_core::{ContainerId, GameId, SessionId, StreamEvent};
use arcadia_runtime::{
    build_spec, ContainerInfo, ContainerRuntime, ContainerSpec, GameDescriptor, HostCapabilities,
    LaunchMode, Platform, PullProgress, RuntimeError,
};
use arcadia_store::{
    GameRecord, GameSession, InstallStatus, Installation, PlayStats, SessionMode, SessionStatus,
    Store,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::{ControlError, Result};
use crate::install::{InstallJob, InstallMonitors, MonitorSettings};
use crate::lifecycle;
use crate::registry::SessionRegistry;
use crate::scan;
use crate::types::{
    CleanupReport, ControlConfig, DebugLaunch, InstallRequest, LaunchResponse, SessionFilter,
    SessionPatch,
};

/// Trait defining the orchestrator operations.
///
/// This trait provides the complete API for running game containers and
/// maintaining the resources they leave behind.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    // =========================================================================
    // Launch Operations
    // =========================================================================

    /// Build a spec, create and start a container, and record a running session.
    ///
    /// An install mode request is handled as [`Orchestrator::install_game`].
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Spec` before any side effect if the request is
    /// invalid, or `ControlError::LaunchError` if the engine fails to create or
    /// start the container (the session is then marked `error`).
    async fn launch_game(
        &self,
        session_id: SessionId,
        game: &GameDescriptor,
        platform: &Platform,
        mode: LaunchMode,
    ) -> Result<LaunchResponse>;

    /// Start an installer container and watch it in the background.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::InstallInProgress` if the game already has a
    /// running installer, plus the errors of [`Orchestrator::launch_game`].
    async fn install_game(
        &self,
        session_id: SessionId,
        game: &GameDescriptor,
        platform: &Platform,
        request: InstallRequest,
    ) -> Result<LaunchResponse>;

    /// Start an interactive container kept alive for `docker exec`.
    ///
    /// # Errors
    ///
    /// Same as [`Orchestrator::launch_game`].
    async fn launch_debug_container(
        &self,
        session_id: SessionId,
        game: &GameDescriptor,
        platform: &Platform,
    ) -> Result<DebugLaunch>;

    /// Stop a container and close the session that owns it.
    ///
    /// Returns the stopped session, or `None` if no session owned the container.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Runtime` if the container could not be removed (the
    /// session is then marked `error`).
    async fn stop_game(&self, container_id: &ContainerId) -> Result<Option<GameSession>>;

    // =========================================================================
    // Installation State
    // =========================================================================

    /// Current installation state of a game.
    ///
    /// Never writes while an install monitor runs for the game. Re-attaches a
    /// monitor if the record says `installing` but none is tracked.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::GameNotFound` if the game has no record.
    async fn check_install_status(&self, game_id: &GameId) -> Result<Installation>;

    /// Wait for the game's install monitor to finish and return its outcome.
    ///
    /// Returns the current installation state if no monitor exists.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::GameNotFound` if the game has no record.
    async fn await_install(&self, game_id: &GameId) -> Result<Installation>;

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Get a session by ID.
    async fn get_session(&self, session_id: &SessionId) -> Result<GameSession>;

    /// List sessions matching a filter.
    async fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<GameSession>>;

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Last `tail_lines` log lines of a container.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Timeout` if the engine does not answer in time.
    async fn get_container_logs(
        &self,
        container_id: &ContainerId,
        tail_lines: usize,
    ) -> Result<Vec<String>>;

    /// Engine view of a container.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Timeout` if the engine does not answer in time.
    async fn inspect_container(&self, container_id: &ContainerId) -> Result<ContainerInfo>;

    /// Check that the engine is reachable.
    async fn ping(&self) -> Result<()>;

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Remove exited managed containers. Installer containers under an active
    /// monitor are skipped.
    async fn cleanup_stopped_containers(&self) -> Result<CleanupReport>;

    /// Remove managed volumes no container mounts.
    async fn cleanup_orphaned_volumes(&self) -> Result<CleanupReport>;

    /// Ranked launch candidates under `path`, relative to it. Empty on failure.
    async fn scan_for_game_executables(&self, path: &Path) -> Vec<String>;

    /// Pull a runner image, forwarding progress as stream events.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Runtime` if the pull fails; an error event is sent first.
    async fn pull_image(
        &self,
        image: &str,
        events: mpsc::Sender<StreamEvent<PullProgress>>,
    ) -> Result<()>;
}

/// The main orchestrator implementation.
pub struct OrchestratorService<R: ContainerRuntime, S: Store> {
    runtime: Arc<R>,
    store: Arc<S>,
    registry: Arc<SessionRegistry<S>>,
    monitors: InstallMonitors,
    install_gates: Mutex<HashMap<GameId, Arc<tokio::sync::Mutex<()>>>>,
    host: HostCapabilities,
    config: ControlConfig,
}

impl<R, S> OrchestratorService<R, S>
where
    R: ContainerRuntime + 'static,
    S: Store + 'static,
{
    /// Create a new orchestrator.
    #[must_use]
    pub fn new(runtime: Arc<R>, store: Arc<S>, host: HostCapabilities, config: ControlConfig) -> Self {
        let registry = Arc::new(SessionRegistry::new(Arc::clone(&store)));
        Self {
            runtime,
            store,
            registry,
            monitors: InstallMonitors::default(),
            install_gates: Mutex::new(HashMap::new()),
            host,
            config,
        }
    }

    /// Get the session registry.
    #[must_use]
    pub fn registry(&self) -> &SessionRegistry<S> {
        &self.registry
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &ControlConfig {
        &self.config
    }

    fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            poll_interval: self.config.install_poll_interval,
            poll_timeout: self.config.install_poll_timeout,
            scan_max_depth: self.config.scan_max_depth,
        }
    }

    /// Lock serializing install bookkeeping for one game.
    fn install_gate(&self, game_id: &GameId) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.install_gates.lock().entry(game_id.clone()).or_default())
    }

    fn spawn_monitor(&self, job: InstallJob) -> Result<()> {
        self.monitors.spawn(
            Arc::clone(&self.runtime),
            Arc::clone(&self.store),
            Arc::clone(&self.registry),
            self.monitor_settings(),
            job,
        )
    }

    /// Create a game record on first launch.
    fn ensure_game_record(&self, game: &GameDescriptor, platform: &Platform) -> Result<GameRecord> {
        if let Some(record) = self.store.get_game(&game.game_id)? {
            return Ok(record);
        }
        let record = GameRecord::new(game.game_id.clone(), game.title.clone(), platform.id.clone());
        self.store.put_game(&record)?;
        Ok(record)
    }

    /// Register the session, then create and start its container.
    async fn launch(
        &self,
        session_id: SessionId,
        game: &GameDescriptor,
        platform: &Platform,
        mode: &LaunchMode,
        spec: ContainerSpec,
    ) -> Result<LaunchResponse> {
        self.ensure_game_record(game, platform)?;
        self.registry.create(GameSession::starting(
            session_id,
            game.game_id.clone(),
            platform.id.clone(),
            session_mode(mode),
        ))?;

        let container_id = match self.runtime.create_container(&spec).await {
            Ok(id) => id,
            Err(e) => return Err(self.fail_launch(&session_id, &e)),
        };
        if let Err(e) = self
            .registry
            .update(&session_id, SessionPatch::container(container_id.clone()))
        {
            self.discard(&container_id).await;
            return Err(self.abandon_launch(&session_id, e));
        }

        if let Err(e) = self.runtime.start_container(&container_id).await {
            self.discard(&container_id).await;
            return Err(self.fail_launch(&session_id, &e));
        }
        if let Err(e) = self
            .registry
            .update(&session_id, SessionPatch::status(SessionStatus::Running))
        {
            if let Err(stop_err) = self.terminate(&container_id).await {
                warn!(container_id = %container_id, error = %stop_err, "Failed to remove container");
            }
            return Err(self.abandon_launch(&session_id, e));
        }

        info!(
            session_id = %session_id,
            game_id = %game.game_id,
            container_id = %container_id,
            mode = mode.as_str(),
            "Container started"
        );

        Ok(LaunchResponse {
            session_id,
            container_id,
        })
    }

    fn fail_launch(&self, session_id: &SessionId, err: &RuntimeError) -> ControlError {
        let message = err.to_string();
        error!(session_id = %session_id, error = %message, "Launch failed");

        if let Err(e) = self
            .registry
            .update(session_id, SessionPatch::error(message.clone()))
        {
            warn!(session_id = %session_id, error = %e, "Failed to mark session as error");
        }
        ControlError::LaunchError {
            session_id: *session_id,
            message,
        }
    }

    /// Mark a session as failed after its container was torn down.
    fn abandon_launch(&self, session_id: &SessionId, err: ControlError) -> ControlError {
        error!(session_id = %session_id, error = %err, "Could not record launch");

        if let Err(e) = self
            .registry
            .update(session_id, SessionPatch::error(err.to_string()))
        {
            warn!(session_id = %session_id, error = %e, "Failed to mark session as error");
        }
        err
    }

    /// Best-effort removal of a container that never became useful.
    async fn discard(&self, container_id: &ContainerId) {
        match self.runtime.remove_container(container_id).await {
            Ok(()) | Err(RuntimeError::NotFound(_)) => {}
            Err(e) => warn!(container_id = %container_id, error = %e, "Failed to remove container"),
        }
    }

    /// Stop, falling back to kill, then remove.
    async fn terminate(&self, container_id: &ContainerId) -> Result<()> {
        let grace = self.config.stop_grace;
        let bound = grace + self.config.diagnostic_timeout;

        let needs_kill =
            match tokio::time::timeout(bound, self.runtime.stop_container(container_id, grace))
                .await
            {
                Ok(Ok(()) | Err(RuntimeError::NotFound(_))) => false,
                Ok(Err(e)) => {
                    warn!(container_id = %container_id, error = %e, "Graceful stop failed, killing");
                    true
                }
                Err(_) => {
                    warn!(container_id = %container_id, "Graceful stop timed out, killing");
                    true
                }
            };

        if needs_kill {
            match self.runtime.kill_container(container_id).await {
                Ok(()) | Err(RuntimeError::NotFound(_)) => {}
                Err(e) => warn!(container_id = %container_id, error = %e, "Kill failed"),
            }
        }

        match self.runtime.remove_container(container_id).await {
            Ok(()) | Err(RuntimeError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Close a session and record its play time.
    async fn close_session(
        &self,
        session: &GameSession,
        at: chrono::DateTime<Utc>,
    ) -> Result<GameSession> {
        let screenshots = collect_screenshots(&self.config.screenshot_dir_for(&session.id)).await;
        let stopped = self.registry.finish(&session.id, at, screenshots)?;
        self.record_play(&stopped);
        Ok(stopped)
    }

    fn record_play(&self, session: &GameSession) {
        if session.mode != SessionMode::Play {
            return;
        }
        let (Some(played_at), Some(duration_seconds)) = (
            session.performance.start_time,
            session.performance.duration_seconds,
        ) else {
            return;
        };

        let result = self.store.get_game(&session.game_id).and_then(|record| {
            let Some(mut record) = record else {
                return Ok(());
            };
            record.play_stats.push(PlayStats {
                played_at,
                duration_seconds,
            });
            record.updated_at = Utc::now();
            self.store.put_game(&record)
        });
        if let Err(e) = result {
            warn!(game_id = %session.game_id, error = %e, "Failed to record play stats");
        }
    }

    async fn diagnostic<T, F>(&self, operation: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = arcadia_runtime::Result<T>> + Send,
    {
        tokio::time::timeout(self.config.diagnostic_timeout, call)
            .await
            .map_err(|_| ControlError::Timeout(operation))?
            .map_err(Into::into)
    }
}

#[async_trait]
impl<R, S> Orchestrator for OrchestratorService<R, S>
where
    R: ContainerRuntime + 'static,
    S: Store + 'static,
{
    async fn launch_game(
        &self,
        session_id: SessionId,
        game: &GameDescriptor,
        platform: &Platform,
        mode: LaunchMode,
    ) -> Result<LaunchResponse> {
        match mode {
            LaunchMode::Install {
                installer_path,
                install_path,
                installer_args,
            } => {
                let request = InstallRequest {
                    installer_path,
                    install_path,
                    installer_args,
                };
                self.install_game(session_id, game, platform, request).await
            }
            mode => {
                let spec = build_spec(&session_id, game, platform, &mode, &self.host)?;
                self.launch(session_id, game, platform, &mode, spec).await
            }
        }
    }

    async fn install_game(
        &self,
        session_id: SessionId,
        game: &GameDescriptor,
        platform: &Platform,
        request: InstallRequest,
    ) -> Result<LaunchResponse> {
        let game_id = &game.game_id;
        let install_path = request.install_path.clone();
        let mode = LaunchMode::Install {
            installer_path: request.installer_path,
            install_path: request.install_path,
            installer_args: request.installer_args,
        };
        let spec = build_spec(&session_id, game, platform, &mode, &self.host)?;

        let gate = self.install_gate(game_id);
        let _guard = gate.lock().await;
        if self.monitors.is_active(game_id) {
            return Err(ControlError::InstallInProgress(game_id.clone()));
        }
        let current = self
            .store
            .get_game(game_id)?
            .map_or(InstallStatus::NotInstalled, |r| r.installation.status());
        if current == InstallStatus::Installing {
            return Err(ControlError::InstallInProgress(game_id.clone()));
        }
        lifecycle::validate_install_transition(game_id, current, InstallStatus::Installing)?;

        tokio::fs::create_dir_all(&install_path).await.map_err(|e| {
            ControlError::Internal(format!(
                "cannot create install directory {}: {e}",
                install_path.display()
            ))
        })?;

        let launched = self.launch(session_id, game, platform, &mode, spec).await?;

        let mut record = self.ensure_game_record(game, platform)?;
        record.installation = Installation::Installing {
            session_id,
            container_id: launched.container_id.clone(),
            install_path: install_path.clone(),
            started_at: Utc::now(),
        };
        record.updated_at = Utc::now();
        self.store.put_game(&record)?;

        match self.spawn_monitor(InstallJob {
            game_id: game_id.clone(),
            session_id,
            container_id: launched.container_id.clone(),
            install_path,
        }) {
            Ok(()) | Err(ControlError::InstallInProgress(_)) => {}
            Err(e) => return Err(e),
        }

        Ok(launched)
    }

    async fn launch_debug_container(
        &self,
        session_id: SessionId,
        game: &GameDescriptor,
        platform: &Platform,
    ) -> Result<DebugLaunch> {
        let mode = LaunchMode::Debug;
        let spec = build_spec(&session_id, game, platform, &mode, &self.host)?;
        let launched = self.launch(session_id, game, platform, &mode, spec).await?;

        let exec_command = format!("docker exec -it {} /bin/bash", launched.container_id);
        Ok(DebugLaunch {
            session_id,
            container_id: launched.container_id,
            exec_command,
        })
    }

    async fn stop_game(&self, container_id: &ContainerId) -> Result<Option<GameSession>> {
        let session = self.registry.find_by_container(container_id)?;

        if let Some(session) = &session {
            if lifecycle::is_valid_transition(session.status, SessionStatus::Stopping) {
                self.registry
                    .update(&session.id, SessionPatch::status(SessionStatus::Stopping))?;
            }
        }

        if let Err(e) = self.terminate(container_id).await {
            error!(container_id = %container_id, error = %e, "Failed to stop container");
            if let Some(session) = &session {
                if let Err(update_err) = self
                    .registry
                    .update(&session.id, SessionPatch::error(e.to_string()))
                {
                    warn!(session_id = %session.id, error = %update_err, "Failed to mark session as error");
                }
            }
            return Err(e);
        }

        let Some(session) = session else {
            info!(container_id = %container_id, "Stopped container without a session");
            return Ok(None);
        };

        let stopped = self.close_session(&session, Utc::now()).await?;
        info!(
            session_id = %stopped.id,
            container_id = %container_id,
            duration_seconds = ?stopped.performance.duration_seconds,
            "Session stopped"
        );
        Ok(Some(stopped))
    }

    async fn check_install_status(&self, game_id: &GameId) -> Result<Installation> {
        let record = self
            .store
            .get_game(game_id)?
            .ok_or_else(|| ControlError::GameNotFound(game_id.clone()))?;

        if self.monitors.is_active(game_id) {
            return Ok(record.installation);
        }
        if record.installation.status() != InstallStatus::Installing {
            return Ok(record.installation);
        }

        // An install in flight holds the gate until its monitor is registered.
        let gate = self.install_gate(game_id);
        let _guard = gate.lock().await;
        let record = self
            .store
            .get_game(game_id)?
            .ok_or_else(|| ControlError::GameNotFound(game_id.clone()))?;
        if self.monitors.is_active(game_id) {
            return Ok(record.installation);
        }

        if let Installation::Installing {
            session_id,
            container_id,
            install_path,
            ..
        } = &record.installation
        {
            info!(game_id = %game_id, container_id = %container_id, "Re-attaching install monitor");
            match self.spawn_monitor(InstallJob {
                game_id: game_id.clone(),
                session_id: *session_id,
                container_id: container_id.clone(),
                install_path: install_path.clone(),
            }) {
                Ok(()) | Err(ControlError::InstallInProgress(_)) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(record.installation)
    }

    async fn await_install(&self, game_id: &GameId) -> Result<Installation> {
        let mut outcome = match self.monitors.subscribe(game_id) {
            Some(rx) => rx,
            None => {
                let installation = self.check_install_status(game_id).await?;
                match self.monitors.subscribe(game_id) {
                    Some(rx) => rx,
                    None => return Ok(installation),
                }
            }
        };

        let installation = outcome
            .wait_for(Option::is_some)
            .await
            .map_err(|_| ControlError::Internal("install monitor ended without an outcome".into()))?
            .clone();
        installation
            .ok_or_else(|| ControlError::Internal("install monitor ended without an outcome".into()))
    }

    async fn get_session(&self, session_id: &SessionId) -> Result<GameSession> {
        self.registry.get(session_id)
    }

    async fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<GameSession>> {
        self.registry.list(filter)
    }

    async fn get_container_logs(
        &self,
        container_id: &ContainerId,
        tail_lines: usize,
    ) -> Result<Vec<String>> {
        self.diagnostic(
            "container_logs",
            self.runtime.container_logs(container_id, tail_lines),
        )
        .await
    }

    async fn inspect_container(&self, container_id: &ContainerId) -> Result<ContainerInfo> {
        self.diagnostic("inspect_container", self.runtime.inspect_container(container_id))
            .await
    }

    async fn ping(&self) -> Result<()> {
        self.diagnostic("ping", self.runtime.ping()).await
    }

    async fn cleanup_stopped_containers(&self) -> Result<CleanupReport> {
        let containers = self.runtime.list_containers().await?;
        let mut report = CleanupReport::default();

        for info in containers
            .into_iter()
            .filter(|c| c.is_managed() && c.status.phase.is_terminal())
        {
            if self.monitors.owns_container(&info.id) {
                debug!(container_id = %info.id, "Skipping container owned by install monitor");
                continue;
            }

            match self.runtime.remove_container(&info.id).await {
                Ok(()) => {}
                Err(RuntimeError::NotFound(_)) => continue,
                Err(e) => {
                    warn!(container_id = %info.id, error = %e, "Failed to remove stopped container");
                    continue;
                }
            }
            report.push(info.id.to_string());

            // The process exited on its own; close the session it belonged to.
            match self.registry.find_by_container(&info.id) {
                Ok(Some(session)) if lifecycle::is_active(session.status) => {
                    let at = info.status.finished_at.unwrap_or_else(Utc::now);
                    if let Err(e) = self.close_session(&session, at).await {
                        warn!(session_id = %session.id, error = %e, "Failed to close session");
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(container_id = %info.id, error = %e, "Session lookup failed"),
            }
        }

        info!(removed = report.removed, "Swept stopped containers");
        Ok(report)
    }

    async fn cleanup_orphaned_volumes(&self) -> Result<CleanupReport> {
        let in_use: HashSet<String> = self
            .runtime
            .list_containers()
            .await?
            .into_iter()
            .flat_map(|c| c.volumes)
            .collect();
        let volumes = self.runtime.list_volumes().await?;
        let mut report = CleanupReport::default();

        for volume in volumes
            .into_iter()
            .filter(|v| v.is_managed() && !in_use.contains(&v.name))
        {
            match self.runtime.remove_volume(&volume.name).await {
                Ok(()) => report.push(volume.name),
                Err(RuntimeError::NotFound(_)) => {}
                Err(e) => warn!(volume = %volume.name, error = %e, "Failed to remove volume"),
            }
        }

        info!(removed = report.removed, "Swept orphaned volumes");
        Ok(report)
    }

    async fn scan_for_game_executables(&self, path: &Path) -> Vec<String> {
        let path = path.to_path_buf();
        let depth = self.config.scan_max_depth;
        tokio::task::spawn_blocking(move || scan::scan_executables(&path, depth))
            .await
            .unwrap_or_default()
    }

    async fn pull_image(
        &self,
        image: &str,
        events: mpsc::Sender<StreamEvent<PullProgress>>,
    ) -> Result<()> {
        if image.trim().is_empty() {
            return Err(ControlError::InvalidRequest("image must not be empty".into()));
        }

        let (tx, mut rx) = mpsc::channel::<PullProgress>(32);
        let forward = async {
            let mut last = None;
            while let Some(progress) = rx.recv().await {
                last = Some(progress.clone());
                let _ = events.send(StreamEvent::Progress(progress)).await;
            }
            last
        };
        let (result, last) = tokio::join!(self.runtime.pull_image(image, tx), forward);

        match result {
            Ok(()) => {
                let mut done: PullProgress =
                    last.unwrap_or_else(|| PullProgress::new(image, "", None, 0, 0));
                done.status = "complete".into();
                done.percent = 100.0;
                let _ = events.send(StreamEvent::Complete(done)).await;
                info!(image, "Image pulled");
                Ok(())
            }
            Err(e) => {
                warn!(image, error = %e, "Image pull failed");
                let _ = events.send(StreamEvent::error(&e)).await;
                Err(e.into())
            }
        }
    }
}

const fn session_mode(mode: &LaunchMode) -> SessionMode {
    match mode {
        LaunchMode::Play => SessionMode::Play,
        LaunchMode::Install { .. } => SessionMode::Install,
        LaunchMode::Debug => SessionMode::Debug,
    }
}

/// Files in a session's screenshot directory, sorted by name.
async fn collect_screenshots(dir: &Path) -> Vec<String> {
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return Vec::new();
    };

    let mut shots = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.file_type().await.is_ok_and(|t| t.is_file()) {
            shots.push(entry.path().display().to_string());
        }
    }
    shots.sort();
    shots
}

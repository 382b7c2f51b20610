//! Background installation monitors.
//!
//! Each running installer container is watched by one tracked task per game. The
//! task polls the engine until the installer exits, scans the install directory
//! for launch targets, and writes the final installation record. It is the only
//! writer of a game's installation state while it runs; callers observe its
//! outcome through a watch channel.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arcadia_core::{ContainerId, GameId, SessionId};
use arcadia_runtime::{ContainerRuntime, RuntimeError};
use arcadia_store::{Installation, InstallStatus, Store};
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{ControlError, Result};
use crate::lifecycle;
use crate::registry::SessionRegistry;
use crate::scan;

/// Attempts made to persist the final installation record.
const PERSIST_ATTEMPTS: u32 = 3;

/// An installer to watch.
#[derive(Debug, Clone)]
pub(crate) struct InstallJob {
    pub game_id: GameId,
    pub session_id: SessionId,
    pub container_id: ContainerId,
    pub install_path: PathBuf,
}

/// Timing and scan settings for a monitor.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MonitorSettings {
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    pub scan_max_depth: usize,
}

struct MonitorHandle {
    container_id: ContainerId,
    outcome: watch::Receiver<Option<Installation>>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    fn is_running(&self) -> bool {
        self.outcome.borrow().is_none() && !self.task.is_finished()
    }
}

/// The set of install monitors, at most one per game.
#[derive(Default)]
pub(crate) struct InstallMonitors {
    monitors: Mutex<HashMap<GameId, MonitorHandle>>,
}

impl InstallMonitors {
    /// Check if a monitor is still running for the game.
    pub fn is_active(&self, game_id: &GameId) -> bool {
        self.monitors
            .lock()
            .get(game_id)
            .is_some_and(MonitorHandle::is_running)
    }

    /// Check if a running monitor watches the container.
    pub fn owns_container(&self, container_id: &ContainerId) -> bool {
        self.monitors
            .lock()
            .values()
            .any(|m| m.container_id == *container_id && m.is_running())
    }

    /// Outcome channel of the game's latest monitor.
    pub fn subscribe(&self, game_id: &GameId) -> Option<watch::Receiver<Option<Installation>>> {
        self.monitors.lock().get(game_id).map(|m| m.outcome.clone())
    }

    /// Start watching an installer, replacing any finished monitor for the game.
    pub fn spawn<R, S>(
        &self,
        runtime: Arc<R>,
        store: Arc<S>,
        registry: Arc<SessionRegistry<S>>,
        settings: MonitorSettings,
        job: InstallJob,
    ) -> Result<()>
    where
        R: ContainerRuntime + 'static,
        S: Store + 'static,
    {
        let mut monitors = self.monitors.lock();
        if monitors.get(&job.game_id).is_some_and(MonitorHandle::is_running) {
            return Err(ControlError::InstallInProgress(job.game_id));
        }

        let (tx, rx) = watch::channel(None);
        let game_id = job.game_id.clone();
        let container_id = job.container_id.clone();
        let task = tokio::spawn(monitor(runtime, store, registry, settings, job, tx));

        monitors.insert(
            game_id,
            MonitorHandle {
                container_id,
                outcome: rx,
                task,
            },
        );
        Ok(())
    }
}

/// How the installer container ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Code(Option<i64>),
    Gone,
}

async fn monitor<R, S>(
    runtime: Arc<R>,
    store: Arc<S>,
    registry: Arc<SessionRegistry<S>>,
    settings: MonitorSettings,
    job: InstallJob,
    outcome: watch::Sender<Option<Installation>>,
) where
    R: ContainerRuntime,
    S: Store,
{
    info!(
        game_id = %job.game_id,
        container_id = %job.container_id,
        "Watching installer"
    );

    let exit = wait_for_exit(runtime.as_ref(), &job.container_id, settings).await;

    let path = job.install_path.clone();
    let depth = settings.scan_max_depth;
    let executables = tokio::task::spawn_blocking(move || scan::scan_executables(&path, depth))
        .await
        .unwrap_or_default();

    let installation = decide(&job, exit, executables);
    match &installation {
        Installation::Installed { executables, .. } => info!(
            game_id = %job.game_id,
            executables = executables.len(),
            "Installation finished"
        ),
        Installation::Failed { reason, .. } => warn!(
            game_id = %job.game_id,
            reason = %reason,
            "Installation failed"
        ),
        _ => {}
    }

    persist(store.as_ref(), &job.game_id, &installation, settings.poll_interval).await;
    finish_installer(runtime.as_ref(), &registry, &job, exit).await;

    let _ = outcome.send(Some(installation));
}

async fn wait_for_exit<R: ContainerRuntime + ?Sized>(
    runtime: &R,
    container_id: &ContainerId,
    settings: MonitorSettings,
) -> Exit {
    loop {
        tokio::time::sleep(settings.poll_interval).await;

        match tokio::time::timeout(
            settings.poll_timeout,
            runtime.inspect_container(container_id),
        )
        .await
        {
            Ok(Ok(info)) if info.status.phase.is_terminal() => {
                return Exit::Code(info.status.exit_code);
            }
            Ok(Ok(_)) => {}
            Ok(Err(RuntimeError::NotFound(_))) => return Exit::Gone,
            Ok(Err(e)) => {
                warn!(container_id = %container_id, error = %e, "Installer poll failed");
            }
            Err(_) => {
                warn!(container_id = %container_id, "Installer poll timed out");
            }
        }
    }
}

fn decide(job: &InstallJob, exit: Exit, executables: Vec<String>) -> Installation {
    let now = Utc::now();
    let exit_code = match exit {
        Exit::Code(code) => code,
        Exit::Gone => None,
    };

    if !executables.is_empty() || exit_code == Some(0) {
        return Installation::Installed {
            file_path: executables.first().map(|e| job.install_path.join(e)),
            install_path: job.install_path.clone(),
            executables,
            installed_at: now,
        };
    }

    let reason = match exit {
        Exit::Code(Some(code)) => {
            format!("installer exited with code {code} and no executables were found")
        }
        Exit::Code(None) => "installer exited and no executables were found".to_string(),
        Exit::Gone => "installer container disappeared and no executables were found".to_string(),
    };
    Installation::Failed {
        reason,
        exit_code,
        failed_at: now,
    }
}

async fn persist<S: Store + ?Sized>(
    store: &S,
    game_id: &GameId,
    installation: &Installation,
    backoff: Duration,
) {
    for attempt in 1..=PERSIST_ATTEMPTS {
        match write_installation(store, game_id, installation) {
            Ok(()) => return,
            Err(e) => {
                error!(
                    game_id = %game_id,
                    attempt,
                    error = %e,
                    "Failed to persist installation outcome"
                );
                if attempt < PERSIST_ATTEMPTS {
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

fn write_installation<S: Store + ?Sized>(
    store: &S,
    game_id: &GameId,
    installation: &Installation,
) -> Result<()> {
    let mut record = store
        .get_game(game_id)?
        .ok_or_else(|| ControlError::GameNotFound(game_id.clone()))?;

    let from = record.installation.status();
    if from != InstallStatus::Installing {
        // A record replaced while the installer ran is left alone.
        debug!(game_id = %game_id, status = ?from, "Installation record no longer installing");
        return Ok(());
    }
    lifecycle::validate_install_transition(game_id, from, installation.status())?;

    record.installation = installation.clone();
    record.updated_at = Utc::now();
    store.put_game(&record)?;
    Ok(())
}

/// Remove the exited installer and close its session.
async fn finish_installer<R, S>(
    runtime: &R,
    registry: &SessionRegistry<S>,
    job: &InstallJob,
    exit: Exit,
) where
    R: ContainerRuntime + ?Sized,
    S: Store,
{
    if exit != Exit::Gone {
        match runtime.remove_container(&job.container_id).await {
            Ok(()) | Err(RuntimeError::NotFound(_)) => {}
            Err(e) => warn!(
                container_id = %job.container_id,
                error = %e,
                "Failed to remove installer container"
            ),
        }
    }

    match registry.get(&job.session_id) {
        Ok(session) if !lifecycle::is_terminal(session.status) => {
            if let Err(e) = registry.finish(&job.session_id, Utc::now(), Vec::new()) {
                warn!(session_id = %job.session_id, error = %e, "Failed to close installer session");
            }
        }
        Ok(_) => {}
        Err(e) => warn!(session_id = %job.session_id, error = %e, "Installer session missing"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> InstallJob {
        InstallJob {
            game_id: GameId::new("x").unwrap(),
            session_id: SessionId::generate(),
            container_id: ContainerId::new("c0ffee").unwrap(),
            install_path: PathBuf::from("/installed/X"),
        }
    }

    #[test]
    fn exit_zero_with_executables_is_installed() {
        let installation = decide(&job(), Exit::Code(Some(0)), vec!["bin/start.sh".into()]);
        match installation {
            Installation::Installed {
                file_path,
                executables,
                ..
            } => {
                assert_eq!(file_path, Some(PathBuf::from("/installed/X/bin/start.sh")));
                assert_eq!(executables, vec!["bin/start.sh"]);
            }
            other => panic!("expected installed, got {other:?}"),
        }
    }

    #[test]
    fn exit_zero_without_executables_is_installed() {
        let installation = decide(&job(), Exit::Code(Some(0)), Vec::new());
        assert!(matches!(
            installation,
            Installation::Installed { file_path: None, .. }
        ));
    }

    #[test]
    fn failed_exit_with_executables_is_installed() {
        let installation = decide(&job(), Exit::Code(Some(1)), vec!["game.exe".into()]);
        assert_eq!(installation.status(), InstallStatus::Installed);
    }

    #[test]
    fn failed_exit_without_executables_is_failed() {
        let installation = decide(&job(), Exit::Code(Some(2)), Vec::new());
        match installation {
            Installation::Failed {
                exit_code, reason, ..
            } => {
                assert_eq!(exit_code, Some(2));
                assert!(reason.contains("code 2"));
            }
            other => panic!("expected failed, got {other:?}"),
        }
    }

    #[test]
    fn vanished_container_without_executables_is_failed() {
        let installation = decide(&job(), Exit::Gone, Vec::new());
        assert!(matches!(
            installation,
            Installation::Failed { exit_code: None, .. }
        ));
    }
}

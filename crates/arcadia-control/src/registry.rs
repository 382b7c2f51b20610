//! Session registry.
//!
//! An in-memory map of game sessions backed by the store. Each session has its
//! own lock so updates to one session are serialized while different sessions
//! update concurrently. Every accepted change is persisted before it becomes
//! visible in memory.

use std::collections::HashMap;
use std::sync::Arc;

use arcadia_core::{ContainerId, SessionId};
use arcadia_store::{GameSession, SessionStatus, Store};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::error::{ControlError, Result};
use crate::lifecycle;
use crate::types::{SessionFilter, SessionPatch};

type Entry = Arc<Mutex<GameSession>>;

/// Registry of game sessions.
pub struct SessionRegistry<S: Store> {
    store: Arc<S>,
    sessions: RwLock<HashMap<SessionId, Entry>>,
}

impl<S: Store> SessionRegistry<S> {
    /// Create a registry over the given store.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new session.
    ///
    /// # Errors
    ///
    /// Returns `SessionExists` if the id is already known, or a store error.
    pub fn create(&self, session: GameSession) -> Result<GameSession> {
        let id = session.id;
        if self.sessions.read().contains_key(&id) || self.store.get_session(&id)?.is_some() {
            return Err(ControlError::SessionExists(id));
        }

        let mut sessions = self.sessions.write();
        if sessions.contains_key(&id) {
            return Err(ControlError::SessionExists(id));
        }
        self.store.put_session(&session)?;
        sessions.insert(id, Arc::new(Mutex::new(session.clone())));

        debug!(session_id = %id, game_id = %session.game_id, "Registered session");
        Ok(session)
    }

    /// Get a session, falling back to the store on a miss.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` if the session does not exist.
    pub fn get(&self, id: &SessionId) -> Result<GameSession> {
        let entry = self.entry(id)?;
        let session = entry.lock().clone();
        Ok(session)
    }

    /// Apply a patch to a session.
    ///
    /// Status changes are validated against the session lifecycle. Moving to
    /// `Running` records the start time once; moving to `Stopped` records the end
    /// time, computes the duration, and releases the container id.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound`, `InvalidState` for a disallowed transition,
    /// `ContainerAlreadyAssigned` when a different container is already set, or a
    /// store error. A rejected patch leaves the session unchanged.
    pub fn update(&self, id: &SessionId, patch: SessionPatch) -> Result<GameSession> {
        let entry = self.entry(id)?;
        let mut current = entry.lock();

        let next = apply_patch(&current, patch)?;
        self.store.put_session(&next)?;
        *current = next.clone();
        drop(current);

        debug!(session_id = %id, status = ?next.status, "Updated session");
        Ok(next)
    }

    /// Drive a session to `Stopped`, passing through `Stopping` when needed.
    ///
    /// Sessions already stopped are returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` or a store error.
    pub fn finish(
        &self,
        id: &SessionId,
        at: DateTime<Utc>,
        screenshots: Vec<String>,
    ) -> Result<GameSession> {
        let entry = self.entry(id)?;
        let mut current = entry.lock();

        let mut next = current.clone();
        match next.status {
            SessionStatus::Stopped => return Ok(next),
            status if lifecycle::is_valid_transition(status, SessionStatus::Stopping) => {
                next = apply_patch(&next, SessionPatch::status(SessionStatus::Stopping).at(at))?;
            }
            _ => {}
        }
        let next = apply_patch(
            &next,
            SessionPatch::status(SessionStatus::Stopped)
                .at(at)
                .with_screenshots(screenshots),
        )?;

        self.store.put_session(&next)?;
        *current = next.clone();
        drop(current);

        debug!(
            session_id = %id,
            duration_seconds = ?next.performance.duration_seconds,
            "Session finished"
        );
        Ok(next)
    }

    /// List sessions that pass the filter, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a store error if persisted sessions cannot be read.
    pub fn list(&self, filter: &SessionFilter) -> Result<Vec<GameSession>> {
        let cached: HashMap<SessionId, GameSession> = self
            .sessions
            .read()
            .iter()
            .map(|(id, entry)| (*id, entry.lock().clone()))
            .collect();

        let persisted = match &filter.game_id {
            Some(game_id) => self.store.list_sessions_by_game(game_id)?,
            None => self.store.list_sessions()?,
        };

        let mut merged = cached;
        for session in persisted {
            merged.entry(session.id).or_insert(session);
        }

        let mut sessions: Vec<GameSession> = merged
            .into_values()
            .filter(|s| filter.matches(s))
            .collect();
        sessions.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.as_uuid().cmp(b.id.as_uuid()))
        });
        Ok(sessions)
    }

    /// Find the session that owns a container.
    ///
    /// # Errors
    ///
    /// Returns a store error if persisted sessions cannot be read.
    pub fn find_by_container(&self, container_id: &ContainerId) -> Result<Option<GameSession>> {
        let cached = self
            .sessions
            .read()
            .values()
            .map(|entry| entry.lock().clone())
            .find(|s| s.container_id.as_ref() == Some(container_id));
        if cached.is_some() {
            return Ok(cached);
        }

        Ok(self
            .store
            .list_sessions()?
            .into_iter()
            .find(|s| s.container_id.as_ref() == Some(container_id)))
    }

    fn entry(&self, id: &SessionId) -> Result<Entry> {
        if let Some(entry) = self.sessions.read().get(id) {
            return Ok(Arc::clone(entry));
        }

        let session = self
            .store
            .get_session(id)?
            .ok_or(ControlError::SessionNotFound(*id))?;

        let mut sessions = self.sessions.write();
        let entry = sessions
            .entry(*id)
            .or_insert_with(|| Arc::new(Mutex::new(session)));
        Ok(Arc::clone(entry))
    }
}

/// Compute the session that results from applying `patch` to `current`.
fn apply_patch(current: &GameSession, patch: SessionPatch) -> Result<GameSession> {
    let at = patch.at.unwrap_or_else(Utc::now);
    let mut next = current.clone();

    if let Some(container_id) = patch.container_id {
        match &next.container_id {
            Some(existing) if *existing != container_id => {
                return Err(ControlError::ContainerAlreadyAssigned {
                    session_id: next.id,
                    existing: existing.clone(),
                });
            }
            _ => next.container_id = Some(container_id),
        }
    }

    if let Some(to) = patch.status {
        if to != next.status {
            lifecycle::validate_transition(&next.id, next.status, to)?;
            next.status = to;

            match to {
                SessionStatus::Running if next.performance.start_time.is_none() => {
                    next.performance.start_time = Some(at);
                }
                SessionStatus::Stopped => {
                    next.performance.end_time = Some(at);
                    next.performance.duration_seconds = next
                        .performance
                        .start_time
                        .map(|start| (at - start).num_seconds().max(0));
                    next.container_id = None;
                }
                _ => {}
            }
        }
    }

    if let Some(resources) = patch.resources {
        next.resources = resources;
    }
    if let Some(screenshots) = patch.screenshots {
        next.screenshots = screenshots;
    }
    if let Some(message) = patch.error_message {
        next.error_message = Some(message);
    }

    next.updated_at = at;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arcadia_core::{GameId, PlatformId};
    use arcadia_store::{RocksStore, SessionMode};
    use chrono::Duration;
    use tempfile::TempDir;

    fn setup() -> (SessionRegistry<RocksStore>, Arc<RocksStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        (SessionRegistry::new(Arc::clone(&store)), store, dir)
    }

    fn new_session(game: &str) -> GameSession {
        GameSession::starting(
            SessionId::generate(),
            GameId::new(game).unwrap(),
            PlatformId::new("native").unwrap(),
            SessionMode::Play,
        )
    }

    fn container(n: u8) -> ContainerId {
        ContainerId::new(format!("{n:064x}")).unwrap()
    }

    #[test]
    fn create_and_get() {
        let (registry, store, _dir) = setup();
        let session = registry.create(new_session("quake")).unwrap();

        let fetched = registry.get(&session.id).unwrap();
        assert_eq!(fetched, session);
        assert!(store.get_session(&session.id).unwrap().is_some());
    }

    #[test]
    fn create_duplicate_fails() {
        let (registry, _store, _dir) = setup();
        let session = registry.create(new_session("quake")).unwrap();

        let result = registry.create(session);
        assert!(matches!(result, Err(ControlError::SessionExists(_))));
    }

    #[test]
    fn get_missing_fails() {
        let (registry, _store, _dir) = setup();
        let result = registry.get(&SessionId::generate());
        assert!(matches!(result, Err(ControlError::SessionNotFound(_))));
    }

    #[test]
    fn lookup_miss_falls_back_to_store() {
        let (registry, store, _dir) = setup();
        let session = new_session("doom");
        store.put_session(&session).unwrap();

        let fetched = registry.get(&session.id).unwrap();
        assert_eq!(fetched.id, session.id);
    }

    #[test]
    fn running_then_stopped_computes_duration() {
        let (registry, _store, _dir) = setup();
        let session = registry.create(new_session("quake")).unwrap();
        let t0 = Utc::now();

        registry
            .update(&session.id, SessionPatch::container(container(1)))
            .unwrap();
        let running = registry
            .update(&session.id, SessionPatch::status(SessionStatus::Running).at(t0))
            .unwrap();
        assert_eq!(running.performance.start_time, Some(t0));

        registry
            .update(
                &session.id,
                SessionPatch::status(SessionStatus::Stopping).at(t0 + Duration::seconds(120)),
            )
            .unwrap();
        let stopped = registry
            .update(
                &session.id,
                SessionPatch::status(SessionStatus::Stopped).at(t0 + Duration::seconds(125)),
            )
            .unwrap();

        assert_eq!(stopped.status, SessionStatus::Stopped);
        assert_eq!(stopped.performance.duration_seconds, Some(125));
        assert_eq!(stopped.performance.end_time, Some(t0 + Duration::seconds(125)));
        assert!(stopped.container_id.is_none());
    }

    #[test]
    fn resume_keeps_original_start_time() {
        let (registry, _store, _dir) = setup();
        let session = registry.create(new_session("quake")).unwrap();
        let t0 = Utc::now();

        registry
            .update(&session.id, SessionPatch::status(SessionStatus::Running).at(t0))
            .unwrap();
        registry
            .update(&session.id, SessionPatch::status(SessionStatus::Paused))
            .unwrap();
        let resumed = registry
            .update(
                &session.id,
                SessionPatch::status(SessionStatus::Running).at(t0 + Duration::seconds(30)),
            )
            .unwrap();
        assert_eq!(resumed.performance.start_time, Some(t0));
    }

    #[test]
    fn stop_without_start_has_no_duration() {
        let (registry, _store, _dir) = setup();
        let session = registry.create(new_session("quake")).unwrap();

        registry
            .update(&session.id, SessionPatch::error("create failed"))
            .unwrap();
        let stopped = registry
            .update(&session.id, SessionPatch::status(SessionStatus::Stopped))
            .unwrap();
        assert!(stopped.performance.end_time.is_some());
        assert!(stopped.performance.duration_seconds.is_none());
        assert_eq!(stopped.error_message.as_deref(), Some("create failed"));
    }

    #[test]
    fn invalid_transition_leaves_session_unchanged() {
        let (registry, _store, _dir) = setup();
        let session = registry.create(new_session("quake")).unwrap();

        let result = registry.update(&session.id, SessionPatch::status(SessionStatus::Stopped));
        assert!(matches!(result, Err(ControlError::InvalidState { .. })));
        assert_eq!(
            registry.get(&session.id).unwrap().status,
            SessionStatus::Starting
        );
    }

    #[test]
    fn container_is_set_once() {
        let (registry, _store, _dir) = setup();
        let session = registry.create(new_session("quake")).unwrap();

        registry
            .update(&session.id, SessionPatch::container(container(1)))
            .unwrap();
        // Same id again is a no-op
        registry
            .update(&session.id, SessionPatch::container(container(1)))
            .unwrap();

        let result = registry.update(&session.id, SessionPatch::container(container(2)));
        assert!(matches!(
            result,
            Err(ControlError::ContainerAlreadyAssigned { .. })
        ));
    }

    #[test]
    fn finish_passes_through_stopping() {
        let (registry, _store, _dir) = setup();
        let session = registry.create(new_session("quake")).unwrap();
        let t0 = Utc::now();
        registry
            .update(&session.id, SessionPatch::status(SessionStatus::Running).at(t0))
            .unwrap();

        let shots = vec!["a.png".to_string()];
        let stopped = registry
            .finish(&session.id, t0 + Duration::seconds(10), shots.clone())
            .unwrap();
        assert_eq!(stopped.status, SessionStatus::Stopped);
        assert_eq!(stopped.performance.duration_seconds, Some(10));
        assert_eq!(stopped.screenshots, shots);

        // Already stopped is returned as-is
        let again = registry.finish(&session.id, Utc::now(), Vec::new()).unwrap();
        assert_eq!(again, stopped);
    }

    #[test]
    fn list_filters_and_orders() {
        let (registry, _store, _dir) = setup();
        let first = registry.create(new_session("quake")).unwrap();
        let second = registry.create(new_session("doom")).unwrap();
        registry
            .update(&second.id, SessionPatch::status(SessionStatus::Running))
            .unwrap();

        let all = registry.list(&SessionFilter::default()).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, first.id);

        let running = registry
            .list(&SessionFilter {
                status: Some(SessionStatus::Running),
                ..SessionFilter::default()
            })
            .unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].id, second.id);

        let quake = registry
            .list(&SessionFilter {
                game_id: Some(GameId::new("quake").unwrap()),
                ..SessionFilter::default()
            })
            .unwrap();
        assert_eq!(quake.len(), 1);
        assert_eq!(quake[0].id, first.id);
    }

    #[test]
    fn find_by_container() {
        let (registry, _store, _dir) = setup();
        let session = registry.create(new_session("quake")).unwrap();
        registry
            .update(&session.id, SessionPatch::container(container(7)))
            .unwrap();

        let found = registry.find_by_container(&container(7)).unwrap();
        assert_eq!(found.map(|s| s.id), Some(session.id));
        assert!(registry.find_by_container(&container(8)).unwrap().is_none());
    }

    #[test]
    fn concurrent_updates_to_one_session_are_serialized() {
        let (registry, store, _dir) = setup();
        let registry = Arc::new(registry);
        let id = registry.create(new_session("quake")).unwrap().id;
        let t0 = Utc::now();
        registry
            .update(&id, SessionPatch::status(SessionStatus::Running).at(t0))
            .unwrap();
        registry
            .update(&id, SessionPatch::status(SessionStatus::Stopping).at(t0))
            .unwrap();

        let handles: Vec<_> = (1..=8)
            .map(|n| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    registry
                        .update(
                            &id,
                            SessionPatch::status(SessionStatus::Stopped)
                                .at(t0 + Duration::seconds(n * 10))
                                .with_screenshots(vec![format!("{n}.png")]),
                        )
                        .unwrap()
                })
            })
            .collect();
        let results: Vec<GameSession> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let last = registry.get(&id).unwrap();
        assert_eq!(last.status, SessionStatus::Stopped);
        let end = last.performance.end_time.unwrap();
        assert_eq!(
            last.performance.duration_seconds,
            Some((end - t0).num_seconds())
        );
        // Only the first stop sets the end time; later ones see it already stopped.
        for session in &results {
            assert_eq!(session.performance.end_time, Some(end));
            assert_eq!(session.performance.duration_seconds, last.performance.duration_seconds);
        }
        // Every patch landed in order: the final screenshots belong to one of them.
        assert_eq!(last.screenshots.len(), 1);
        assert!(results.iter().any(|s| s.screenshots == last.screenshots));
        assert_eq!(store.get_session(&id).unwrap().unwrap(), last);
    }

    #[test]
    fn concurrent_updates_to_different_sessions() {
        let (registry, _store, _dir) = setup();
        let registry = Arc::new(registry);
        let ids: Vec<SessionId> = (0..8)
            .map(|_| registry.create(new_session("quake")).unwrap().id)
            .collect();

        let handles: Vec<_> = ids
            .iter()
            .map(|id| {
                let registry = Arc::clone(&registry);
                let id = *id;
                std::thread::spawn(move || {
                    registry
                        .update(&id, SessionPatch::status(SessionStatus::Running))
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for id in ids {
            assert_eq!(registry.get(&id).unwrap().status, SessionStatus::Running);
        }
    }
}

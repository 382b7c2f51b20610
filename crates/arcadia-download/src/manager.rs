//! The download manager.
//!
//! The manager owns the download table and the admission queue. Each admitted
//! task runs in its own spawned task that pairs a [`DownloadWorker`] with an
//! event loop applying the worker's messages to the table. Tasks are admitted in
//! strict FIFO order while fewer than the configured maximum are active.
//!
//! Table entries are locked individually. The admission lock is never taken
//! while another lock is held by the same call, except that an entry lock may be
//! held while the admission queue is edited.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arcadia_core::{GameId, StreamEvent};
use arcadia_store::{DownloadFile, DownloadStatus, DownloadTask, Store};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::cache;
use crate::error::{DownloadError, Result};
use crate::types::{
    DownloadConfig, DownloadEvent, DownloadProgress, DownloadRequest, DownloadSummary,
};
use crate::worker::{DownloadWorker, WorkerEvent, WorkerJob};

/// Buffer between a worker and its event loop.
const WORKER_EVENT_BUFFER: usize = 64;

/// Events kept for slow subscribers before they lag.
const BROADCAST_CAPACITY: usize = 256;

const WORKER_GONE: &str = "download worker stopped unexpectedly";

/// Multi-file download scheduler.
///
/// Cloning is cheap; clones share the same table and workers.
pub struct DownloadManager<S: Store> {
    inner: Arc<Inner<S>>,
}

impl<S: Store> Clone for DownloadManager<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<S: Store> {
    store: Arc<S>,
    worker: DownloadWorker,
    cache_root: PathBuf,
    tasks: RwLock<HashMap<GameId, Arc<Mutex<TaskEntry>>>>,
    admission: Mutex<Admission>,
    next_run: AtomicU64,
    events: broadcast::Sender<DownloadEvent>,
}

struct TaskEntry {
    task: DownloadTask,
    cancel: Option<CancellationToken>,
    run: u64,
}

struct Admission {
    queue: VecDeque<GameId>,
    /// Admitted games and the run holding the slot.
    active: HashMap<GameId, u64>,
    max: usize,
}

impl<S: Store + 'static> DownloadManager<S> {
    /// Create a manager.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::Client` if the HTTP client cannot be built.
    pub fn new(store: Arc<S>, config: DownloadConfig) -> Result<Self> {
        let worker = DownloadWorker::new(&config)?;
        let (events, _) = broadcast::channel(BROADCAST_CAPACITY);

        Ok(Self {
            inner: Arc::new(Inner {
                store,
                worker,
                cache_root: config.cache_root,
                tasks: RwLock::new(HashMap::new()),
                admission: Mutex::new(Admission {
                    queue: VecDeque::new(),
                    active: HashMap::new(),
                    max: config.max_concurrent.max(1),
                }),
                next_run: AtomicU64::new(1),
                events,
            }),
        })
    }

    /// Start a download described by a request.
    ///
    /// Without an explicit cache directory name, one is derived from the game id
    /// and the first file's URL.
    ///
    /// # Errors
    ///
    /// See [`start_download`](Self::start_download).
    pub async fn start(&self, request: DownloadRequest) -> Result<DownloadTask> {
        let directory = match request.cache_directory_name {
            Some(name) => name,
            None => {
                let source = request
                    .files
                    .first()
                    .map(|f| f.url.as_str())
                    .unwrap_or_default();
                cache::cache_directory_name(&request.game_id, source)
            }
        };
        self.start_download(request.game_id, &directory, &request.title, request.files)
            .await
    }

    /// Start downloading `files` for a game into `cache_directory_name`.
    ///
    /// If a download for the game is queued or running, it is returned unchanged
    /// and nothing new is started. A finished, failed, or cancelled task is
    /// replaced; files already in its cache directory are reused.
    ///
    /// # Errors
    ///
    /// - `DownloadError::InvalidRequest` for an empty file list, a non-HTTP URL,
    ///   a bad directory name, or duplicate file names
    /// - `DownloadError::InvalidFilename` if a file name sanitizes to nothing
    /// - `DownloadError::Io` if the cache directory cannot be created
    /// - `DownloadError::Store` if the task cannot be persisted
    pub async fn start_download(
        &self,
        game_id: GameId,
        cache_directory_name: &str,
        title: &str,
        files: Vec<DownloadFile>,
    ) -> Result<DownloadTask> {
        if let Some(existing) = self.inner.active_task(&game_id) {
            debug!(game_id = %game_id, "Download already active");
            return Ok(existing);
        }

        let files = prepare_files(files)?;
        cache::validate_directory_name(cache_directory_name)?;
        tokio::fs::create_dir_all(self.inner.cache_root.join(cache_directory_name)).await?;

        let task = DownloadTask::queued(
            game_id.clone(),
            cache_directory_name.to_string(),
            title.to_string(),
            files,
        );

        {
            let mut tasks = self.inner.tasks.write();
            if let Some(entry) = tasks.get(&game_id) {
                let entry = entry.lock();
                if entry.task.status.is_active() {
                    return Ok(entry.task.clone());
                }
            }
            self.inner.store.put_download(&task)?;
            tasks.insert(
                game_id.clone(),
                Arc::new(Mutex::new(TaskEntry {
                    task: task.clone(),
                    cancel: None,
                    run: 0,
                })),
            );
        }

        info!(
            game_id = %game_id,
            files = task.total_files,
            directory = %cache_directory_name,
            "Download requested"
        );
        self.inner.admission.lock().queue.push_back(game_id.clone());
        self.inner
            .publish(&game_id, StreamEvent::Progress(DownloadProgress::from(&task)));
        self.inner.pump();

        Ok(self.inner.snapshot(&game_id).unwrap_or(task))
    }

    /// Get a game's download task, from memory or the store.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::Store` if the store lookup fails.
    pub fn get_download_status(&self, game_id: &GameId) -> Result<Option<DownloadTask>> {
        if let Some(task) = self.inner.snapshot(game_id) {
            return Ok(Some(task));
        }
        Ok(self.inner.store.get_download(game_id)?)
    }

    /// Cancel a game's download. Files already on disk are kept.
    ///
    /// Cancelling a finished task returns it unchanged.
    ///
    /// # Errors
    ///
    /// - `DownloadError::NotFound` if the game has no download
    /// - `DownloadError::Store` if the store lookup fails
    pub fn cancel_download(&self, game_id: &GameId) -> Result<DownloadTask> {
        let Some(entry) = self.inner.entry(game_id) else {
            let mut task = self
                .inner
                .store
                .get_download(game_id)?
                .ok_or_else(|| DownloadError::NotFound(game_id.clone()))?;
            if task.status.is_active() {
                task.status = DownloadStatus::Cancelled;
                task.bytes_per_second = 0;
                task.updated_at = Utc::now();
                self.inner.store.put_download(&task)?;
            }
            return Ok(task);
        };

        let mut entry = entry.lock();
        match entry.task.status {
            DownloadStatus::Queued => {
                self.inner
                    .admission
                    .lock()
                    .queue
                    .retain(|queued| queued != game_id);
            }
            DownloadStatus::Downloading => {
                if let Some(token) = &entry.cancel {
                    token.cancel();
                }
            }
            _ => return Ok(entry.task.clone()),
        }

        entry.task.status = DownloadStatus::Cancelled;
        entry.task.bytes_per_second = 0;
        entry.task.updated_at = Utc::now();
        self.inner.persist(&entry.task);
        self.inner
            .publish(game_id, StreamEvent::error("download cancelled"));
        info!(game_id = %game_id, "Download cancelled");

        Ok(entry.task.clone())
    }

    /// Change the concurrency limit.
    ///
    /// Raising the limit admits queued tasks immediately; lowering it never
    /// interrupts running tasks.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::InvalidRequest` if `max` is zero.
    pub fn set_max_concurrent_downloads(&self, max: usize) -> Result<()> {
        if max == 0 {
            return Err(DownloadError::InvalidRequest(
                "max concurrent downloads must be at least 1".into(),
            ));
        }
        self.inner.admission.lock().max = max;
        info!(max, "Download concurrency changed");
        self.inner.pump();
        Ok(())
    }

    /// List every known download, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::Store` if the store listing fails.
    pub fn list_downloads(&self) -> Result<Vec<DownloadTask>> {
        let mut by_game: HashMap<GameId, DownloadTask> = self
            .inner
            .store
            .list_downloads()?
            .into_iter()
            .map(|t| (t.game_id.clone(), t))
            .collect();

        let entries: Vec<_> = self.inner.tasks.read().values().cloned().collect();
        for entry in entries {
            let task = entry.lock().task.clone();
            by_game.insert(task.game_id.clone(), task);
        }

        let mut tasks: Vec<_> = by_game.into_values().collect();
        tasks.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.game_id.cmp(&b.game_id))
        });
        Ok(tasks)
    }

    /// Receive progress events for every download.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.inner.events.subscribe()
    }

    /// Active and queued counts with the aggregate transfer rate.
    #[must_use]
    pub fn summary(&self) -> DownloadSummary {
        let max_concurrent = self.inner.admission.lock().max;
        let entries: Vec<_> = self.inner.tasks.read().values().cloned().collect();

        let mut summary = DownloadSummary {
            max_concurrent,
            ..DownloadSummary::default()
        };
        for entry in entries {
            let entry = entry.lock();
            match entry.task.status {
                DownloadStatus::Downloading => {
                    summary.active += 1;
                    summary.bytes_per_second += entry.task.bytes_per_second;
                }
                DownloadStatus::Queued => summary.queued += 1,
                _ => {}
            }
        }
        summary
    }

    /// Re-queue tasks persisted as queued or downloading by an earlier process.
    ///
    /// Returns the number of tasks queued.
    ///
    /// # Errors
    ///
    /// - `DownloadError::Store` if the store cannot be read or written
    /// - `DownloadError::Io` if a cache directory cannot be created
    pub async fn resume_interrupted(&self) -> Result<usize> {
        let mut resumed = 0;

        for mut task in self.inner.store.list_downloads()? {
            if !task.status.is_active() || self.inner.entry(&task.game_id).is_some() {
                continue;
            }
            tokio::fs::create_dir_all(self.inner.cache_root.join(&task.cache_directory_name))
                .await?;

            task.status = DownloadStatus::Queued;
            task.bytes_per_second = 0;
            task.updated_at = Utc::now();
            self.inner.store.put_download(&task)?;

            let game_id = task.game_id.clone();
            {
                let mut tasks = self.inner.tasks.write();
                if tasks.contains_key(&game_id) {
                    continue;
                }
                tasks.insert(
                    game_id.clone(),
                    Arc::new(Mutex::new(TaskEntry {
                        task,
                        cancel: None,
                        run: 0,
                    })),
                );
            }
            info!(game_id = %game_id, "Resuming interrupted download");
            self.inner.admission.lock().queue.push_back(game_id);
            resumed += 1;
        }

        self.inner.pump();
        Ok(resumed)
    }
}

impl<S: Store + 'static> Inner<S> {
    fn entry(&self, game_id: &GameId) -> Option<Arc<Mutex<TaskEntry>>> {
        self.tasks.read().get(game_id).cloned()
    }

    fn snapshot(&self, game_id: &GameId) -> Option<DownloadTask> {
        self.entry(game_id).map(|e| e.lock().task.clone())
    }

    fn active_task(&self, game_id: &GameId) -> Option<DownloadTask> {
        self.snapshot(game_id).filter(|t| t.status.is_active())
    }

    fn persist(&self, task: &DownloadTask) {
        if let Err(e) = self.store.put_download(task) {
            error!(game_id = %task.game_id, error = %e, "Failed to persist download task");
        }
    }

    fn publish(&self, game_id: &GameId, event: StreamEvent<DownloadProgress>) {
        // No subscribers is not an error.
        let _ = self.events.send(DownloadEvent {
            game_id: game_id.clone(),
            event,
        });
    }

    /// Admit queued tasks while slots are free.
    fn pump(self: &Arc<Self>) {
        loop {
            let (game_id, run) = {
                let mut admission = self.admission.lock();
                if admission.active.len() >= admission.max {
                    return;
                }
                match admission.queue.front() {
                    None => return,
                    // The game's previous run has not released its slot yet.
                    Some(front) if admission.active.contains_key(front) => return,
                    Some(_) => {}
                }
                let Some(game_id) = admission.queue.pop_front() else {
                    return;
                };
                let run = self.next_run.fetch_add(1, Ordering::Relaxed);
                admission.active.insert(game_id.clone(), run);
                (game_id, run)
            };

            if !self.launch(&game_id, run) {
                let mut admission = self.admission.lock();
                if admission.active.get(&game_id) == Some(&run) {
                    admission.active.remove(&game_id);
                }
            }
        }
    }

    /// Mark an admitted task as downloading and spawn its worker.
    fn launch(self: &Arc<Self>, game_id: &GameId, run: u64) -> bool {
        let Some(entry) = self.entry(game_id) else {
            return false;
        };

        let (job, cancel) = {
            let mut entry = entry.lock();
            if entry.task.status != DownloadStatus::Queued {
                return false;
            }

            let cancel = CancellationToken::new();
            entry.cancel = Some(cancel.clone());
            entry.run = run;
            entry.task.status = DownloadStatus::Downloading;
            entry.task.error_message = None;
            entry.task.updated_at = Utc::now();
            self.persist(&entry.task);
            self.publish(
                game_id,
                StreamEvent::Progress(DownloadProgress::from(&entry.task)),
            );

            let job = WorkerJob {
                game_id: game_id.clone(),
                title: entry.task.title.clone(),
                download_path: self.cache_root.join(&entry.task.cache_directory_name),
                files: entry.task.files.clone(),
            };
            (job, cancel)
        };

        debug!(game_id = %game_id, run, "Download admitted");
        let (tx, rx) = mpsc::channel(WORKER_EVENT_BUFFER);
        let worker = self.worker.clone();
        let inner = Arc::clone(self);
        let game_id = game_id.clone();
        tokio::spawn(async move {
            tokio::join!(worker.run(job, tx, cancel), inner.drive(game_id, run, rx));
        });
        true
    }

    /// Apply a worker's events until it finishes, then free its slot.
    async fn drive(
        self: Arc<Self>,
        game_id: GameId,
        run: u64,
        mut rx: mpsc::Receiver<WorkerEvent>,
    ) {
        while let Some(event) = rx.recv().await {
            self.apply(&game_id, run, event);
        }

        if let Some(entry) = self.entry(&game_id) {
            let mut entry = entry.lock();
            if entry.run == run && entry.task.status == DownloadStatus::Downloading {
                entry.task.status = DownloadStatus::Failed;
                entry.task.error_message = Some(WORKER_GONE.into());
                entry.task.updated_at = Utc::now();
                self.persist(&entry.task);
                self.publish(&game_id, StreamEvent::error(WORKER_GONE));
            }
        }

        {
            let mut admission = self.admission.lock();
            if admission.active.get(&game_id) == Some(&run) {
                admission.active.remove(&game_id);
            }
        }
        self.pump();
    }

    fn apply(&self, game_id: &GameId, run: u64, event: WorkerEvent) {
        let Some(entry) = self.entry(game_id) else {
            return;
        };
        let mut entry = entry.lock();
        if entry.run != run {
            return;
        }

        let downloading = entry.task.status == DownloadStatus::Downloading;
        let task = &mut entry.task;
        let outgoing = match event {
            WorkerEvent::Progress(progress) if downloading => {
                task.current_file = Some(progress.current_file);
                task.current_file_progress_percent = progress.current_file_percent;
                task.total_progress_percent =
                    task.total_progress_percent.max(progress.total_percent);
                task.completed_files = progress.completed_files;
                task.bytes_downloaded = progress.bytes_downloaded;
                task.bytes_per_second = progress.bytes_per_second;
                StreamEvent::Progress(DownloadProgress::from(&*task))
            }
            WorkerEvent::FileCompleted {
                filename,
                skipped,
                completed_files,
                total_percent,
                ..
            } if downloading => {
                debug!(game_id = %game_id, filename = %filename, skipped, "File ready");
                task.current_file = Some(filename);
                task.current_file_progress_percent = 100.0;
                task.completed_files = completed_files;
                task.total_progress_percent = task.total_progress_percent.max(total_percent);
                StreamEvent::Progress(DownloadProgress::from(&*task))
            }
            WorkerEvent::Completed { bytes_downloaded } if downloading => {
                task.status = DownloadStatus::Completed;
                task.completed_files = task.total_files;
                task.current_file = None;
                task.current_file_progress_percent = 100.0;
                task.total_progress_percent = 100.0;
                task.bytes_downloaded = bytes_downloaded;
                task.bytes_per_second = 0;
                StreamEvent::Complete(DownloadProgress::from(&*task))
            }
            WorkerEvent::Failed {
                completed_files,
                message,
            } if downloading => {
                task.status = DownloadStatus::Failed;
                task.completed_files = completed_files;
                task.bytes_per_second = 0;
                task.error_message = Some(message.clone());
                StreamEvent::Error { message }
            }
            WorkerEvent::Cancelled { completed_files } => {
                // The cancel call already published the state change.
                task.completed_files = completed_files;
                task.status = DownloadStatus::Cancelled;
                task.bytes_per_second = 0;
                task.updated_at = Utc::now();
                self.persist(task);
                return;
            }
            _ => return,
        };

        task.updated_at = Utc::now();
        self.persist(task);
        self.publish(game_id, outgoing);
    }
}

/// Validate URLs and sanitize file names.
fn prepare_files(files: Vec<DownloadFile>) -> Result<Vec<DownloadFile>> {
    if files.is_empty() {
        return Err(DownloadError::InvalidRequest("no files to download".into()));
    }

    let mut seen = HashSet::new();
    files
        .into_iter()
        .map(|file| {
            let url = reqwest::Url::parse(&file.url).map_err(|e| {
                DownloadError::InvalidRequest(format!("invalid url {:?}: {e}", file.url))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(DownloadError::InvalidRequest(format!(
                    "unsupported url scheme: {}",
                    url.scheme()
                )));
            }

            let filename = cache::sanitize_filename(&file.filename)?;
            if !seen.insert(filename.clone()) {
                return Err(DownloadError::InvalidRequest(format!(
                    "duplicate file name: {filename}"
                )));
            }
            Ok(DownloadFile { filename, ..file })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use arcadia_store::RocksStore;
    use tempfile::TempDir;
    use tokio::sync::broadcast::error::RecvError;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn setup(max_concurrent: usize) -> (DownloadManager<RocksStore>, Arc<RocksStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path().join("db")).unwrap());
        let config = DownloadConfig {
            cache_root: dir.path().join("cache"),
            max_concurrent,
            progress_interval: Duration::ZERO,
            ..DownloadConfig::default()
        };
        let manager = DownloadManager::new(Arc::clone(&store), config).unwrap();
        (manager, store, dir)
    }

    fn game(id: &str) -> GameId {
        GameId::new(id).unwrap()
    }

    fn file(server: &MockServer, name: &str, size: Option<u64>) -> DownloadFile {
        DownloadFile {
            url: format!("{}/{name}", server.uri()),
            filename: name.to_string(),
            expected_size_bytes: size,
        }
    }

    async fn serve(server: &MockServer, name: &str, body: &[u8], delay: Duration) {
        Mock::given(method("GET"))
            .and(path(format!("/{name}")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(body.to_vec())
                    .set_delay(delay),
            )
            .mount(server)
            .await;
    }

    async fn wait_terminal(
        rx: &mut broadcast::Receiver<DownloadEvent>,
        game_id: &GameId,
    ) -> DownloadEvent {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                match rx.recv().await {
                    Ok(event) if event.game_id == *game_id && event.event.is_terminal() => {
                        return event;
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => panic!("event channel closed"),
                }
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn completes_download() {
        let (manager, store, dir) = setup(2);
        let server = MockServer::start().await;
        serve(&server, "a.bin", b"aaaa", Duration::ZERO).await;
        serve(&server, "b.bin", b"bb", Duration::ZERO).await;
        let mut events = manager.subscribe();
        let doom = game("doom");

        manager
            .start_download(
                doom.clone(),
                "doom-cache",
                "Doom",
                vec![file(&server, "a.bin", Some(4)), file(&server, "b.bin", None)],
            )
            .await
            .unwrap();

        let terminal = wait_terminal(&mut events, &doom).await;
        assert_eq!(terminal.event_name(), "complete");

        let task = manager.get_download_status(&doom).unwrap().unwrap();
        assert_eq!(task.status, DownloadStatus::Completed);
        assert_eq!(task.completed_files, 2);
        assert!((task.total_progress_percent - 100.0).abs() < f64::EPSILON);

        let stored = store.get_download(&doom).unwrap().unwrap();
        assert_eq!(stored.status, DownloadStatus::Completed);

        let cache = dir.path().join("cache/doom-cache");
        assert_eq!(std::fs::read(cache.join("a.bin")).unwrap(), b"aaaa");
        assert_eq!(std::fs::read(cache.join("b.bin")).unwrap(), b"bb");
    }

    #[tokio::test]
    async fn start_is_idempotent_while_active() {
        let (manager, _store, _dir) = setup(2);
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/big.bin"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"big".to_vec())
                    .set_delay(Duration::from_millis(300)),
            )
            .expect(1)
            .mount(&server)
            .await;
        let mut events = manager.subscribe();
        let doom = game("doom");
        let files = vec![file(&server, "big.bin", None)];

        let first = manager
            .start_download(doom.clone(), "doom-cache", "Doom", files.clone())
            .await
            .unwrap();
        let second = manager
            .start_download(doom.clone(), "doom-cache", "Doom", files)
            .await
            .unwrap();

        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.status, DownloadStatus::Downloading);
        assert_eq!(manager.summary().active, 1);

        wait_terminal(&mut events, &doom).await;
    }

    #[tokio::test]
    async fn queues_beyond_the_limit_in_fifo_order() {
        let (manager, _store, _dir) = setup(1);
        let server = MockServer::start().await;
        serve(&server, "a.bin", b"a", Duration::from_millis(200)).await;
        serve(&server, "b.bin", b"b", Duration::ZERO).await;
        let mut events = manager.subscribe();

        let first = manager
            .start_download(game("first"), "first", "First", vec![file(&server, "a.bin", None)])
            .await
            .unwrap();
        let second = manager
            .start_download(game("second"), "second", "Second", vec![file(&server, "b.bin", None)])
            .await
            .unwrap();

        assert_eq!(first.status, DownloadStatus::Downloading);
        assert_eq!(second.status, DownloadStatus::Queued);
        let summary = manager.summary();
        assert_eq!((summary.active, summary.queued), (1, 1));

        let done = wait_terminal(&mut events, &game("first")).await;
        assert_eq!(done.event_name(), "complete");
        let done = wait_terminal(&mut events, &game("second")).await;
        assert_eq!(done.event_name(), "complete");
    }

    #[tokio::test]
    async fn failure_mid_task_keeps_completed_files() {
        let (manager, _store, dir) = setup(2);
        let server = MockServer::start().await;
        serve(&server, "part1.bin", b"11111", Duration::ZERO).await;
        Mock::given(method("GET"))
            .and(path("/part2.bin"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let mut events = manager.subscribe();
        let doom = game("doom");

        manager
            .start_download(
                doom.clone(),
                "doom-cache",
                "Doom",
                vec![
                    file(&server, "part1.bin", Some(5)),
                    file(&server, "part2.bin", Some(5)),
                ],
            )
            .await
            .unwrap();

        let terminal = wait_terminal(&mut events, &doom).await;
        assert_eq!(terminal.event_name(), "error");

        let task = manager.get_download_status(&doom).unwrap().unwrap();
        assert_eq!(task.status, DownloadStatus::Failed);
        assert_eq!(task.completed_files, 1);
        assert!(task.error_message.unwrap().contains("503"));
        assert!(dir.path().join("cache/doom-cache/part1.bin").exists());
    }

    #[tokio::test]
    async fn retry_replaces_failed_task_and_reuses_files() {
        let (manager, _store, _dir) = setup(2);
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/part1.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"11111".to_vec()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/part2.bin"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        serve(&server, "part2.bin", b"22222", Duration::ZERO).await;
        let mut events = manager.subscribe();
        let doom = game("doom");
        let files = vec![
            file(&server, "part1.bin", Some(5)),
            file(&server, "part2.bin", Some(5)),
        ];

        manager
            .start_download(doom.clone(), "doom-cache", "Doom", files.clone())
            .await
            .unwrap();
        assert_eq!(wait_terminal(&mut events, &doom).await.event_name(), "error");

        manager
            .start_download(doom.clone(), "doom-cache", "Doom", files)
            .await
            .unwrap();
        assert_eq!(wait_terminal(&mut events, &doom).await.event_name(), "complete");

        let task = manager.get_download_status(&doom).unwrap().unwrap();
        assert_eq!(task.status, DownloadStatus::Completed);
        assert!(task.error_message.is_none());
    }

    #[tokio::test]
    async fn cancel_queued_and_running_tasks() {
        let (manager, _store, dir) = setup(1);
        let server = MockServer::start().await;
        serve(&server, "slow.bin", b"slow", Duration::from_secs(30)).await;
        Mock::given(method("GET"))
            .and(path("/never.bin"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        manager
            .start_download(game("running"), "running", "Running", vec![file(&server, "slow.bin", None)])
            .await
            .unwrap();
        manager
            .start_download(game("waiting"), "waiting", "Waiting", vec![file(&server, "never.bin", None)])
            .await
            .unwrap();

        let waiting = manager.cancel_download(&game("waiting")).unwrap();
        assert_eq!(waiting.status, DownloadStatus::Cancelled);

        let running = manager.cancel_download(&game("running")).unwrap();
        assert_eq!(running.status, DownloadStatus::Cancelled);

        // Cancelling again is a no-op.
        let again = manager.cancel_download(&game("running")).unwrap();
        assert_eq!(again.status, DownloadStatus::Cancelled);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(manager.summary().active, 0);
        assert!(dir.path().join("cache/running").exists());
    }

    #[tokio::test]
    async fn cancel_unknown_download_is_not_found() {
        let (manager, _store, _dir) = setup(2);
        assert!(matches!(
            manager.cancel_download(&game("nope")),
            Err(DownloadError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn raising_the_limit_admits_queued_tasks() {
        let (manager, _store, _dir) = setup(1);
        let server = MockServer::start().await;
        serve(&server, "a.bin", b"a", Duration::from_millis(300)).await;
        serve(&server, "b.bin", b"b", Duration::from_millis(300)).await;

        manager
            .start_download(game("a"), "a", "A", vec![file(&server, "a.bin", None)])
            .await
            .unwrap();
        manager
            .start_download(game("b"), "b", "B", vec![file(&server, "b.bin", None)])
            .await
            .unwrap();
        assert_eq!(manager.summary().queued, 1);

        assert!(matches!(
            manager.set_max_concurrent_downloads(0),
            Err(DownloadError::InvalidRequest(_))
        ));
        manager.set_max_concurrent_downloads(2).unwrap();

        let summary = manager.summary();
        assert_eq!((summary.active, summary.queued, summary.max_concurrent), (2, 0, 2));
    }

    #[tokio::test]
    async fn resumes_interrupted_tasks() {
        let (manager, store, _dir) = setup(2);
        let server = MockServer::start().await;
        serve(&server, "a.bin", b"aaaa", Duration::ZERO).await;
        let doom = game("doom");

        let mut task = DownloadTask::queued(
            doom.clone(),
            "doom-cache".into(),
            "Doom".into(),
            vec![file(&server, "a.bin", Some(4))],
        );
        task.status = DownloadStatus::Downloading;
        store.put_download(&task).unwrap();

        let mut events = manager.subscribe();
        assert_eq!(manager.resume_interrupted().await.unwrap(), 1);
        assert_eq!(wait_terminal(&mut events, &doom).await.event_name(), "complete");
        assert_eq!(manager.resume_interrupted().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn rejects_invalid_requests() {
        let (manager, _store, _dir) = setup(2);
        let doom = game("doom");
        let good = DownloadFile {
            url: "http://mirror.example/a.bin".into(),
            filename: "a.bin".into(),
            expected_size_bytes: None,
        };

        let empty = manager
            .start_download(doom.clone(), "doom", "Doom", Vec::new())
            .await;
        assert!(matches!(empty, Err(DownloadError::InvalidRequest(_))));

        let ftp = DownloadFile {
            url: "ftp://mirror.example/a.bin".into(),
            ..good.clone()
        };
        let result = manager
            .start_download(doom.clone(), "doom", "Doom", vec![ftp])
            .await;
        assert!(matches!(result, Err(DownloadError::InvalidRequest(_))));

        let duplicate = DownloadFile {
            filename: "../a.bin".into(),
            ..good.clone()
        };
        let result = manager
            .start_download(doom.clone(), "doom", "Doom", vec![good.clone(), duplicate])
            .await;
        assert!(matches!(result, Err(DownloadError::InvalidRequest(_))));

        let shadow = DownloadFile {
            filename: "a.bin.part".into(),
            ..good.clone()
        };
        let result = manager
            .start_download(doom.clone(), "doom", "Doom", vec![good.clone(), shadow])
            .await;
        assert!(matches!(result, Err(DownloadError::InvalidFilename(_))));

        let result = manager
            .start_download(doom.clone(), "../escape", "Doom", vec![good])
            .await;
        assert!(matches!(result, Err(DownloadError::InvalidRequest(_))));

        assert!(manager.get_download_status(&doom).unwrap().is_none());
    }

    #[tokio::test]
    async fn lists_memory_and_store() {
        let (manager, store, _dir) = setup(2);
        let server = MockServer::start().await;
        serve(&server, "a.bin", b"a", Duration::ZERO).await;
        let mut events = manager.subscribe();

        let mut older = DownloadTask::queued(
            game("older"),
            "older".into(),
            "Older".into(),
            vec![file(&server, "a.bin", None)],
        );
        older.status = DownloadStatus::Completed;
        store.put_download(&older).unwrap();

        manager
            .start_download(game("newer"), "newer", "Newer", vec![file(&server, "a.bin", None)])
            .await
            .unwrap();
        wait_terminal(&mut events, &game("newer")).await;

        let listed = manager.list_downloads().unwrap();
        let ids: Vec<_> = listed.iter().map(|t| t.game_id.as_str()).collect();
        assert_eq!(ids, vec!["older", "newer"]);
    }

    #[test]
    fn request_files_are_sanitized() {
        let files = prepare_files(vec![DownloadFile {
            url: "https://mirror.example/x".into(),
            filename: "../../etc/passwd".into(),
            expected_size_bytes: Some(1),
        }])
        .unwrap();
        assert_eq!(files[0].filename, "passwd");
    }
}

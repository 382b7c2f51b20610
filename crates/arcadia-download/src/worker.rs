//! The download worker.
//!
//! A worker fetches the files of one task strictly in order into the task's cache
//! directory. It talks to the manager only through an mpsc channel of
//! [`WorkerEvent`]s and watches a [`CancellationToken`] while it waits for each
//! response and each body chunk.
//!
//! Each file is streamed into `<name>.part` and renamed once complete, so a file
//! under its final name is always whole. A leftover `.part` file from an earlier
//! run is resumed with a `Range` request.

use std::path::{Path, PathBuf};
use std::time::Duration;

use arcadia_core::GameId;
use arcadia_store::DownloadFile;
use futures::StreamExt;
use reqwest::header::{CONTENT_RANGE, LOCATION, RANGE};
use reqwest::{StatusCode, Url};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::PART_SUFFIX;
use crate::error::{DownloadError, WorkerError};
use crate::types::DownloadConfig;

/// Files to fetch for one task.
#[derive(Debug, Clone)]
pub struct WorkerJob {
    /// The game the files belong to.
    pub game_id: GameId,
    /// Display title.
    pub title: String,
    /// Cache directory the files are written into. Must exist.
    pub download_path: PathBuf,
    /// Files in download order.
    pub files: Vec<DownloadFile>,
}

/// A throttled progress sample.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerProgress {
    /// Index of the file being fetched.
    pub file_index: usize,
    /// Name of the file being fetched.
    pub current_file: String,
    /// Progress of that file, 0-100.
    pub current_file_percent: f64,
    /// Aggregate progress, 0-100. Never decreases within a run.
    pub total_percent: f64,
    /// Files fully on disk.
    pub completed_files: usize,
    /// Bytes received by this run.
    pub bytes_downloaded: u64,
    /// Average rate of this run.
    pub bytes_per_second: u64,
}

/// Messages from a worker to the manager.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// Periodic progress, at most once per progress interval.
    Progress(WorkerProgress),
    /// A file is on disk under its final name.
    FileCompleted {
        /// Index of the file.
        index: usize,
        /// Name of the file.
        filename: String,
        /// True if the file was already present and not fetched.
        skipped: bool,
        /// Files fully on disk.
        completed_files: usize,
        /// Aggregate progress, 0-100.
        total_percent: f64,
    },
    /// Every file is on disk.
    Completed {
        /// Bytes received by this run.
        bytes_downloaded: u64,
    },
    /// A file failed; later files were not attempted.
    Failed {
        /// Files fully on disk.
        completed_files: usize,
        /// Failure reason.
        message: String,
    },
    /// The cancellation token fired.
    Cancelled {
        /// Files fully on disk.
        completed_files: usize,
    },
}

impl WorkerEvent {
    /// Returns true if the worker sends nothing after this event.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Failed { .. } | Self::Cancelled { .. }
        )
    }
}

/// Fetches the files of a task over HTTP.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct DownloadWorker {
    client: reqwest::Client,
    max_redirects: usize,
    progress_interval: Duration,
}

impl DownloadWorker {
    /// Create a worker from configuration.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::Client` if the HTTP client cannot be built.
    pub fn new(config: &DownloadConfig) -> Result<Self, DownloadError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| DownloadError::Client(e.to_string()))?;

        Ok(Self::with_client(client, config))
    }

    /// Create a worker with a custom reqwest client.
    ///
    /// Redirects are followed by the worker itself, so the client should have
    /// its own redirect policy disabled.
    #[must_use]
    pub fn with_client(client: reqwest::Client, config: &DownloadConfig) -> Self {
        Self {
            client,
            max_redirects: config.max_redirects,
            progress_interval: config.progress_interval,
        }
    }

    /// Fetch every file of `job`, reporting through `events`.
    ///
    /// Always ends with exactly one terminal event unless the receiver is gone.
    pub async fn run(
        &self,
        job: WorkerJob,
        events: mpsc::Sender<WorkerEvent>,
        cancel: CancellationToken,
    ) {
        info!(
            game_id = %job.game_id,
            title = %job.title,
            files = job.files.len(),
            "Starting download"
        );

        let mut tracker = Tracker::new(job.files.len(), self.progress_interval);
        let terminal = match self.fetch_all(&job, &events, &cancel, &mut tracker).await {
            Ok(()) => {
                info!(
                    game_id = %job.game_id,
                    bytes = tracker.bytes,
                    "Download complete"
                );
                WorkerEvent::Completed {
                    bytes_downloaded: tracker.bytes,
                }
            }
            Err(WorkerError::Cancelled) => {
                info!(game_id = %job.game_id, "Download cancelled");
                WorkerEvent::Cancelled {
                    completed_files: tracker.completed_files,
                }
            }
            Err(e) => {
                warn!(game_id = %job.game_id, error = %e, "Download failed");
                WorkerEvent::Failed {
                    completed_files: tracker.completed_files,
                    message: e.to_string(),
                }
            }
        };

        let _ = events.send(terminal).await;
    }

    async fn fetch_all(
        &self,
        job: &WorkerJob,
        events: &mpsc::Sender<WorkerEvent>,
        cancel: &CancellationToken,
        tracker: &mut Tracker,
    ) -> Result<(), WorkerError> {
        for (index, file) in job.files.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(WorkerError::Cancelled);
            }

            let skipped = self
                .fetch_file(index, file, &job.download_path, events, cancel, tracker)
                .await?;
            tracker.file_done();

            let _ = events
                .send(WorkerEvent::FileCompleted {
                    index,
                    filename: file.filename.clone(),
                    skipped,
                    completed_files: tracker.completed_files,
                    total_percent: tracker.total_percent(0.0),
                })
                .await;
        }
        Ok(())
    }

    /// Fetch one file. Returns true if it was already on disk.
    async fn fetch_file(
        &self,
        index: usize,
        file: &DownloadFile,
        dir: &Path,
        events: &mpsc::Sender<WorkerEvent>,
        cancel: &CancellationToken,
        tracker: &mut Tracker,
    ) -> Result<bool, WorkerError> {
        let final_path = dir.join(&file.filename);
        if let Ok(meta) = tokio::fs::metadata(&final_path).await {
            let present = match file.expected_size_bytes {
                Some(expected) => meta.len() == expected,
                None => meta.is_file(),
            };
            if present {
                debug!(filename = %file.filename, "File already on disk");
                return Ok(true);
            }
        }

        let part_path = dir.join(format!("{}{PART_SUFFIX}", file.filename));
        let mut offset = tokio::fs::metadata(&part_path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);

        let mut response = self.open(&file.url, offset, cancel).await?;

        if response.status() == StatusCode::RANGE_NOT_SATISFIABLE && offset > 0 {
            let total = file.expected_size_bytes.or_else(|| content_range_total(&response));
            if total == Some(offset) {
                // The partial file already holds every byte.
                tokio::fs::rename(&part_path, &final_path)
                    .await
                    .map_err(|e| WorkerError::io(&file.filename, e))?;
                return Ok(false);
            }

            debug!(
                filename = %file.filename,
                offset,
                total = ?total,
                "Partial file cannot be resumed, starting over"
            );
            remove_part(&part_path, &file.filename).await?;
            offset = 0;
            response = self.open(&file.url, 0, cancel).await?;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(WorkerError::HttpStatus {
                url: file.url.clone(),
                status: status.as_u16(),
            });
        }

        let resume = offset > 0 && status == StatusCode::PARTIAL_CONTENT;
        let mut written = if resume { offset } else { 0 };
        let mut out = if resume {
            debug!(filename = %file.filename, offset, "Resuming partial file");
            tokio::fs::OpenOptions::new()
                .append(true)
                .open(&part_path)
                .await
        } else {
            tokio::fs::File::create(&part_path).await
        }
        .map_err(|e| WorkerError::io(&file.filename, e))?;

        let expected_total = file
            .expected_size_bytes
            .or_else(|| response.content_length().map(|len| len + written));

        tracker.start_file(index, &file.filename);
        let mut body = response.bytes_stream();
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    let _ = out.flush().await;
                    return Err(WorkerError::Cancelled);
                }
                next = body.next() => next,
            };
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk.map_err(|e| WorkerError::from_reqwest(&file.url, &e))?;

            out.write_all(&chunk)
                .await
                .map_err(|e| WorkerError::io(&file.filename, e))?;
            written += chunk.len() as u64;
            tracker.add_bytes(chunk.len() as u64);

            if let Some(progress) = tracker.tick(fraction(written, expected_total)) {
                let _ = events.send(WorkerEvent::Progress(progress)).await;
            }
        }

        out.flush()
            .await
            .map_err(|e| WorkerError::io(&file.filename, e))?;
        drop(out);

        if let Some(expected) = file.expected_size_bytes {
            if written != expected {
                remove_part(&part_path, &file.filename).await?;
                return Err(WorkerError::SizeMismatch {
                    filename: file.filename.clone(),
                    expected,
                    actual: written,
                });
            }
        }

        tokio::fs::rename(&part_path, &final_path)
            .await
            .map_err(|e| WorkerError::io(&file.filename, e))?;
        Ok(false)
    }

    /// Send a GET, following at most `max_redirects` redirects.
    async fn open(
        &self,
        url: &str,
        offset: u64,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, WorkerError> {
        let mut current = Url::parse(url).map_err(|e| WorkerError::Transfer {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        for hop in 0..=self.max_redirects {
            let mut request = self.client.get(current.clone());
            if offset > 0 {
                request = request.header(RANGE, format!("bytes={offset}-"));
            }

            let response = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(WorkerError::Cancelled),
                result = request.send() => {
                    result.map_err(|e| WorkerError::from_reqwest(url, &e))?
                }
            };

            if !response.status().is_redirection() {
                return Ok(response);
            }
            let Some(location) = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
            else {
                return Ok(response);
            };

            current = current.join(location).map_err(|e| WorkerError::Transfer {
                url: url.to_string(),
                message: format!("bad redirect location {location:?}: {e}"),
            })?;
            debug!(hop = hop + 1, location = %current, "Following redirect");
        }

        Err(WorkerError::TooManyRedirects {
            url: url.to_string(),
        })
    }
}

/// Complete length from a `Content-Range: bytes */N` header.
fn content_range_total(response: &reqwest::Response) -> Option<u64> {
    let value = response.headers().get(CONTENT_RANGE)?.to_str().ok()?;
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse().ok()
}

async fn remove_part(path: &Path, filename: &str) -> Result<(), WorkerError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(WorkerError::io(filename, e)),
    }
}

#[allow(clippy::cast_precision_loss)]
fn fraction(written: u64, total: Option<u64>) -> f64 {
    match total {
        Some(total) if total > 0 => (written as f64 / total as f64).min(1.0),
        _ => 0.0,
    }
}

/// Progress bookkeeping for one run.
struct Tracker {
    total_files: usize,
    completed_files: usize,
    current: Option<(usize, String)>,
    bytes: u64,
    started: Instant,
    last_emit: Option<Instant>,
    last_total: f64,
    interval: Duration,
}

impl Tracker {
    fn new(total_files: usize, interval: Duration) -> Self {
        Self {
            total_files,
            completed_files: 0,
            current: None,
            bytes: 0,
            started: Instant::now(),
            last_emit: None,
            last_total: 0.0,
            interval,
        }
    }

    fn start_file(&mut self, index: usize, filename: &str) {
        self.current = Some((index, filename.to_string()));
    }

    fn file_done(&mut self) {
        self.completed_files += 1;
        self.current = None;
    }

    const fn add_bytes(&mut self, n: u64) {
        self.bytes += n;
    }

    /// Aggregate percentage, clamped so it never goes backwards.
    #[allow(clippy::cast_precision_loss)]
    fn total_percent(&mut self, file_fraction: f64) -> f64 {
        let raw = if self.total_files == 0 {
            100.0
        } else {
            (self.completed_files as f64 + file_fraction.clamp(0.0, 1.0))
                / self.total_files as f64
                * 100.0
        };
        let pct = raw.min(100.0).max(self.last_total);
        self.last_total = pct;
        pct
    }

    fn bytes_per_second(&self) -> u64 {
        let millis = self.started.elapsed().as_millis().max(1);
        u64::try_from(u128::from(self.bytes) * 1000 / millis).unwrap_or(u64::MAX)
    }

    /// A progress sample, unless one was emitted within the interval.
    fn tick(&mut self, file_fraction: f64) -> Option<WorkerProgress> {
        let (file_index, current_file) = self.current.clone()?;
        let now = Instant::now();
        if self
            .last_emit
            .is_some_and(|last| now.duration_since(last) < self.interval)
        {
            return None;
        }
        self.last_emit = Some(now);

        Some(WorkerProgress {
            file_index,
            current_file,
            current_file_percent: file_fraction.clamp(0.0, 1.0) * 100.0,
            total_percent: self.total_percent(file_fraction),
            completed_files: self.completed_files,
            bytes_downloaded: self.bytes,
            bytes_per_second: self.bytes_per_second(),
        })
    }
}

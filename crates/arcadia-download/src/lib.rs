//! # arcadia-download
//!
//! Multi-file game downloads for arcadia.
//!
//! This crate provides:
//! - [`DownloadManager`]: the download table, FIFO admission, cancellation, and
//!   progress broadcast
//! - [`DownloadWorker`]: sequential, resumable HTTP fetching of one task's files
//! - Cache directory naming and file name sanitization
//!
//! ## Architecture
//!
//! ```text
//! start_download ──► DownloadManager ──► admission queue (FIFO, max N active)
//!                         │    ▲
//!            spawn per task    │ WorkerEvent (mpsc)
//!                         ▼    │
//!                     DownloadWorker ──► cache_root/<game>-<hash>/<file>.part
//!                         ▲
//!                         └── CancellationToken
//!
//! DownloadManager ──► Store (persisted tasks)
//!                 └─► broadcast<DownloadEvent> ──► SSE subscribers
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use arcadia_download::{DownloadConfig, DownloadManager};
//! use arcadia_store::{DownloadFile, RocksStore};
//! use arcadia_core::GameId;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/var/lib/arcadia/db")?);
//! let manager = DownloadManager::new(store, DownloadConfig::from_env())?;
//!
//! let task = manager
//!     .start_download(
//!         GameId::new("doom")?,
//!         "doom-0011223344556677",
//!         "Doom",
//!         vec![DownloadFile {
//!             url: "https://mirror.example/doom.zip".into(),
//!             filename: "doom.zip".into(),
//!             expected_size_bytes: None,
//!         }],
//!     )
//!     .await?;
//! println!("{:?}", task.status);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod cache;
pub mod error;
pub mod manager;
pub mod types;
pub mod worker;

pub use cache::{cache_directory_name, sanitize_filename};
pub use error::{DownloadError, Result, WorkerError};
pub use manager::DownloadManager;
pub use types::{DownloadConfig, DownloadEvent, DownloadProgress, DownloadRequest, DownloadSummary};
pub use worker::{DownloadWorker, WorkerEvent, WorkerJob, WorkerProgress};

// Re-export commonly used types from dependencies
pub use arcadia_store::{DownloadFile, DownloadStatus, DownloadTask};
pub use tokio_util::sync::CancellationToken;

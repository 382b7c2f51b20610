//! `RocksDB` storage layer for arcadia.
//!
//! This crate persists game sessions, download tasks, game library records, and paired
//! streaming clients using `RocksDB` with column families for indexing.
//!
//! # Architecture
//!
//! The storage uses the following column families:
//!
//! - `sessions`: Primary session records, keyed by `session_id`
//! - `sessions_by_game`: Index for listing sessions by game
//! - `downloads`: Download tasks, keyed by `game_id`
//! - `games`: Game records with installation state and play statistics
//! - `paired_clients`: Streaming clients that completed PIN pairing
//!
//! Every `put_*` is a single atomic write; the last writer wins.
//!
//! # Example
//!
//! ```no_run
//! use arcadia_store::{RocksStore, Store};
//! use arcadia_core::GameId;
//!
//! let store = RocksStore::open("/tmp/arcadia-db").unwrap();
//!
//! let game_id = GameId::new("quake").unwrap();
//! let sessions = store.list_sessions_by_game(&game_id).unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;
pub mod types;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;
pub use types::{
    DownloadFile, DownloadStatus, DownloadTask, GameRecord, GameSession, InstallStatus,
    Installation, NetworkUsage, PairedClient, Performance, PlayStats, ResourceUsage,
    SessionMode, SessionStatus,
};

use arcadia_core::{GameId, SessionId};

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different implementations
/// (e.g., `RocksDB`, in-memory for testing).
pub trait Store: Send + Sync {
    // =========================================================================
    // Session Operations
    // =========================================================================

    /// Insert or update a session record.
    ///
    /// This also maintains the game index.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_session(&self, session: &GameSession) -> Result<()>;

    /// Get a session by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_session(&self, session_id: &SessionId) -> Result<Option<GameSession>>;

    /// Delete a session by ID.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the session doesn't exist.
    fn delete_session(&self, session_id: &SessionId) -> Result<()>;

    /// List all sessions in the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_sessions(&self) -> Result<Vec<GameSession>>;

    /// List all sessions for a game.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_sessions_by_game(&self, game_id: &GameId) -> Result<Vec<GameSession>>;

    // =========================================================================
    // Download Operations
    // =========================================================================

    /// Insert or update a download task.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_download(&self, task: &DownloadTask) -> Result<()>;

    /// Get the download task for a game.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_download(&self, game_id: &GameId) -> Result<Option<DownloadTask>>;

    /// Delete the download task for a game.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no task exists.
    fn delete_download(&self, game_id: &GameId) -> Result<()>;

    /// List all download tasks.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_downloads(&self) -> Result<Vec<DownloadTask>>;

    // =========================================================================
    // Game Operations
    // =========================================================================

    /// Insert or update a game record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_game(&self, game: &GameRecord) -> Result<()>;

    /// Get a game record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_game(&self, game_id: &GameId) -> Result<Option<GameRecord>>;

    /// List all game records.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_games(&self) -> Result<Vec<GameRecord>>;

    // =========================================================================
    // Paired Client Operations
    // =========================================================================

    /// Insert or update a paired client.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_paired_client(&self, client: &PairedClient) -> Result<()>;

    /// Get a paired client by pairing secret.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_paired_client(&self, pair_secret: &str) -> Result<Option<PairedClient>>;

    /// List all paired clients.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_paired_clients(&self) -> Result<Vec<PairedClient>>;

    /// Remove every paired client and return how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn clear_paired_clients(&self) -> Result<usize>;
}

//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::path::Path;
use std::sync::Arc;

use arcadia_core::{GameId, SessionId};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::types::{DownloadTask, GameRecord, GameSession, PairedClient};
use crate::Store;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Read and decode a single value.
    fn get_value<T: serde::de::DeserializeOwned>(
        &self,
        cf_name: &str,
        key: &[u8],
    ) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    /// Encode and write a single value.
    fn put_value<T: serde::Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        let value = Self::serialize(value)?;
        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Decode every value of a column family.
    fn scan_values<T: serde::de::DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;

        let mut values = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            values.push(Self::deserialize(&value)?);
        }

        Ok(values)
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Session Operations
    // =========================================================================

    fn put_session(&self, session: &GameSession) -> Result<()> {
        let cf_sessions = self.cf(cf::SESSIONS)?;
        let cf_by_game = self.cf(cf::SESSIONS_BY_GAME)?;

        let session_key = keys::session_key(&session.id);
        let game_session_key = keys::game_session_key(&session.game_id, &session.id);
        let value = Self::serialize(session)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_sessions, &session_key, &value);
        batch.put_cf(&cf_by_game, &game_session_key, []);

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn get_session(&self, session_id: &SessionId) -> Result<Option<GameSession>> {
        self.get_value(cf::SESSIONS, &keys::session_key(session_id))
    }

    fn delete_session(&self, session_id: &SessionId) -> Result<()> {
        let cf_sessions = self.cf(cf::SESSIONS)?;
        let cf_by_game = self.cf(cf::SESSIONS_BY_GAME)?;

        let session = self.get_session(session_id)?.ok_or(StoreError::NotFound)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(&cf_sessions, keys::session_key(session_id));
        batch.delete_cf(
            &cf_by_game,
            keys::game_session_key(&session.game_id, session_id),
        );

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn list_sessions(&self) -> Result<Vec<GameSession>> {
        self.scan_values(cf::SESSIONS)
    }

    fn list_sessions_by_game(&self, game_id: &GameId) -> Result<Vec<GameSession>> {
        let cf_by_game = self.cf(cf::SESSIONS_BY_GAME)?;
        let prefix = keys::game_prefix(game_id);

        let mut sessions = Vec::new();
        let iter = self.db.iterator_cf(
            &cf_by_game,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );

        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            if !key.starts_with(&prefix) {
                break;
            }

            let session_id = keys::extract_session_id_from_game_session_key(&key).ok_or(
                StoreError::CorruptKey {
                    cf: cf::SESSIONS_BY_GAME,
                },
            )?;
            if let Some(session) = self.get_session(&session_id)? {
                sessions.push(session);
            }
        }

        Ok(sessions)
    }

    // =========================================================================
    // Download Operations
    // =========================================================================

    fn put_download(&self, task: &DownloadTask) -> Result<()> {
        self.put_value(cf::DOWNLOADS, &keys::game_key(&task.game_id), task)
    }

    fn get_download(&self, game_id: &GameId) -> Result<Option<DownloadTask>> {
        self.get_value(cf::DOWNLOADS, &keys::game_key(game_id))
    }

    fn delete_download(&self, game_id: &GameId) -> Result<()> {
        if self.get_download(game_id)?.is_none() {
            return Err(StoreError::NotFound);
        }
        let cf = self.cf(cf::DOWNLOADS)?;
        self.db
            .delete_cf(&cf, keys::game_key(game_id))
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn list_downloads(&self) -> Result<Vec<DownloadTask>> {
        self.scan_values(cf::DOWNLOADS)
    }

    // =========================================================================
    // Game Operations
    // =========================================================================

    fn put_game(&self, game: &GameRecord) -> Result<()> {
        self.put_value(cf::GAMES, &keys::game_key(&game.game_id), game)
    }

    fn get_game(&self, game_id: &GameId) -> Result<Option<GameRecord>> {
        self.get_value(cf::GAMES, &keys::game_key(game_id))
    }

    fn list_games(&self) -> Result<Vec<GameRecord>> {
        self.scan_values(cf::GAMES)
    }

    // =========================================================================
    // Paired Client Operations
    // =========================================================================

    fn put_paired_client(&self, client: &PairedClient) -> Result<()> {
        self.put_value(
            cf::PAIRED_CLIENTS,
            &keys::paired_client_key(&client.pair_secret),
            client,
        )
    }

    fn get_paired_client(&self, pair_secret: &str) -> Result<Option<PairedClient>> {
        self.get_value(cf::PAIRED_CLIENTS, &keys::paired_client_key(pair_secret))
    }

    fn list_paired_clients(&self) -> Result<Vec<PairedClient>> {
        self.scan_values(cf::PAIRED_CLIENTS)
    }

    fn clear_paired_clients(&self) -> Result<usize> {
        let cf = self.cf(cf::PAIRED_CLIENTS)?;

        let mut batch = WriteBatch::default();
        let mut removed = 0;
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            batch.delete_cf(&cf, key);
            removed += 1;
        }

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::debug!(removed, "Cleared paired clients");
        Ok(removed)
    }
}

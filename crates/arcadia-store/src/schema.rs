//! Database schema definitions and column families.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Primary game session records, keyed by `session_id`.
    pub const SESSIONS: &str = "sessions";

    /// Index: sessions by game, keyed by `game_id || '/' || session_id`.
    pub const SESSIONS_BY_GAME: &str = "sessions_by_game";

    /// Download tasks, keyed by `game_id`.
    pub const DOWNLOADS: &str = "downloads";

    /// Game library records, keyed by `game_id`.
    pub const GAMES: &str = "games";

    /// Paired streaming clients, keyed by `pair_secret`.
    pub const PAIRED_CLIENTS: &str = "paired_clients";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::SESSIONS,
        cf::SESSIONS_BY_GAME,
        cf::DOWNLOADS,
        cf::GAMES,
        cf::PAIRED_CLIENTS,
    ]
}

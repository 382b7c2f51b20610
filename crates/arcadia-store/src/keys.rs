//! Key encoding utilities for `RocksDB`.
//!
//! Game ids are slugs and never contain `/`, so a trailing separator makes the
//! per-game prefix unambiguous (`quake/` never matches `quake2/...`).

use arcadia_core::{GameId, SessionId};

/// Separator between the game id and the session id in index keys.
const SEPARATOR: u8 = b'/';

/// Encode a session key (just the session ID bytes).
#[must_use]
pub fn session_key(session_id: &SessionId) -> Vec<u8> {
    session_id.as_bytes().to_vec()
}

/// Encode a game-session index key: `game_id || '/' || session_id`.
#[must_use]
pub fn game_session_key(game_id: &GameId, session_id: &SessionId) -> Vec<u8> {
    let mut key = game_prefix(game_id);
    key.extend_from_slice(session_id.as_bytes());
    key
}

/// Encode a game prefix for scanning all sessions of a game.
#[must_use]
pub fn game_prefix(game_id: &GameId) -> Vec<u8> {
    let mut key = Vec::with_capacity(game_id.as_bytes().len() + 17);
    key.extend_from_slice(game_id.as_bytes());
    key.push(SEPARATOR);
    key
}

/// Extract the session ID from a game-session key.
///
/// Returns `None` if the key is shorter than a session id.
#[must_use]
pub fn extract_session_id_from_game_session_key(key: &[u8]) -> Option<SessionId> {
    let start = key.len().checked_sub(16)?;
    let bytes: [u8; 16] = key[start..].try_into().ok()?;
    Some(SessionId::from_uuid(uuid::Uuid::from_bytes(bytes)))
}

/// Encode a key addressed by game id (downloads, games).
#[must_use]
pub fn game_key(game_id: &GameId) -> Vec<u8> {
    game_id.as_bytes().to_vec()
}

/// Encode a paired client key.
#[must_use]
pub fn paired_client_key(pair_secret: &str) -> Vec<u8> {
    pair_secret.as_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_session_key_roundtrip() {
        let game_id = GameId::new("quake").unwrap();
        let session_id = SessionId::generate();

        let key = game_session_key(&game_id, &session_id);
        assert_eq!(key.len(), "quake/".len() + 16);

        let extracted = extract_session_id_from_game_session_key(&key).unwrap();
        assert_eq!(extracted, session_id);
    }

    #[test]
    fn prefix_does_not_match_longer_game_ids() {
        let quake = GameId::new("quake").unwrap();
        let quake2 = GameId::new("quake2").unwrap();
        let key = game_session_key(&quake2, &SessionId::generate());

        assert!(!key.starts_with(&game_prefix(&quake)));
        assert!(key.starts_with(&game_prefix(&quake2)));
    }

    #[test]
    fn short_key_is_rejected() {
        assert!(extract_session_id_from_game_session_key(b"abc").is_none());
    }
}

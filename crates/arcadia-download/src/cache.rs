//! Cache directory naming and file name sanitization.
//!
//! A download's cache directory is named from the game id plus a short hash of
//! its source, so retrying the same download lands in the same directory and can
//! reuse files already on disk.

use arcadia_core::GameId;

use crate::error::{DownloadError, Result};

/// Hex characters of the source hash kept in directory names.
const SOURCE_HASH_HEX_LEN: usize = 16;

/// Suffix of a file still being written.
pub const PART_SUFFIX: &str = ".part";

/// Characters never allowed in a cached file name.
const RESERVED: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// Deterministic cache directory name for a game and its download source.
///
/// The result is `<game-id>-<16 hex chars of blake3(source)>`.
#[must_use]
pub fn cache_directory_name(game_id: &GameId, source: &str) -> String {
    let hash = blake3::hash(source.as_bytes());
    let hex = hex::encode(hash.as_bytes());
    format!("{game_id}-{}", &hex[..SOURCE_HASH_HEX_LEN])
}

/// Reduce a caller-supplied file name to a single safe path component.
///
/// Directory parts are stripped (`../../etc/passwd` becomes `passwd`), reserved
/// and control characters are dropped, and leading dots and surrounding
/// whitespace are trimmed. Names ending in [`PART_SUFFIX`] are refused since they
/// would share a path with another file's partial download.
///
/// # Errors
///
/// Returns `DownloadError::InvalidFilename` if nothing usable remains or the name
/// ends in `.part`.
pub fn sanitize_filename(name: &str) -> Result<String> {
    let last = name
        .rsplit(['/', '\\'])
        .find(|part| !part.trim().is_empty())
        .unwrap_or_default();

    let cleaned: String = last
        .chars()
        .filter(|c| !c.is_control() && !RESERVED.contains(c))
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.').trim();

    if cleaned.is_empty() || cleaned.to_ascii_lowercase().ends_with(PART_SUFFIX) {
        return Err(DownloadError::InvalidFilename(name.to_string()));
    }
    Ok(cleaned.to_string())
}

/// Validate a cache directory name supplied by a caller.
///
/// # Errors
///
/// Returns `DownloadError::InvalidRequest` if the name is empty, contains a path
/// separator, or is a relative path component.
pub fn validate_directory_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control)
    {
        return Err(DownloadError::InvalidRequest(format!(
            "invalid cache directory name: {name:?}"
        )));
    }
    Ok(())
}

//! Core identifier types for arcadia.
//!
//! This module provides strongly-typed identifiers for sessions, games, platforms,
//! and containers. Slug identifiers are validated on construction so they can be
//! used directly in storage keys, container names, and filesystem paths.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum length of a slug identifier.
pub const MAX_SLUG_LEN: usize = 128;

/// A game session identifier (random UUID v4).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(uuid::Uuid);

/// A game identifier, validated as a slug (`[A-Za-z0-9._-]`).
///
/// Game IDs are stable across the library and are used to key download tasks,
/// installation records, and cache directory names.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GameId(String);

/// A platform profile identifier, validated as a slug.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlatformId(String);

/// An opaque container identifier assigned by the container engine.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContainerId(String);

impl SessionId {
    /// Create a new `SessionId` from a UUID.
    #[must_use]
    pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// Generate a new random `SessionId`.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Return the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }

    /// Return the bytes of the UUID.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Return the first eight hex characters, used in container names.
    #[must_use]
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl FromStr for SessionId {
    type Err = IdError;

    /// Parse a `SessionId` from a UUID string.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = uuid::Uuid::parse_str(s).map_err(|_| IdError::InvalidUuid)?;
        Ok(Self(uuid))
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for SessionId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0.to_string()
    }
}

impl AsRef<[u8]> for SessionId {
    fn as_ref(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

/// Validate a slug identifier.
fn validate_slug(s: &str) -> Result<(), IdError> {
    if s.is_empty() {
        return Err(IdError::Empty);
    }
    if s.len() > MAX_SLUG_LEN {
        return Err(IdError::TooLong {
            max: MAX_SLUG_LEN,
            got: s.len(),
        });
    }
    if let Some(c) = s
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(IdError::InvalidCharacter(c));
    }
    if s.starts_with('.') || s.starts_with('-') {
        return Err(IdError::InvalidCharacter(s.chars().next().unwrap_or('.')));
    }
    Ok(())
}

impl GameId {
    /// Create a `GameId` after validating it as a slug.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is empty, too long, or contains characters
    /// outside `[A-Za-z0-9._-]`.
    pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
        let value = value.into();
        validate_slug(&value)?;
        Ok(Self(value))
    }

    /// Return the slug as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Return the slug bytes, used for storage keys.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl FromStr for GameId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Debug for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GameId({})", self.0)
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for GameId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<GameId> for String {
    fn from(id: GameId) -> Self {
        id.0
    }
}

impl PlatformId {
    /// Create a `PlatformId` after validating it as a slug.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a valid slug.
    pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
        let value = value.into();
        validate_slug(&value)?;
        Ok(Self(value))
    }

    /// Return the slug as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for PlatformId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Debug for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PlatformId({})", self.0)
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PlatformId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PlatformId> for String {
    fn from(id: PlatformId) -> Self {
        id.0
    }
}

impl ContainerId {
    /// Create a `ContainerId` from an engine-assigned identifier.
    ///
    /// # Errors
    ///
    /// Returns `IdError::Empty` if the value is blank.
    pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(IdError::Empty);
        }
        Ok(Self(value))
    }

    /// Return the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Return the 12-character short form shown by the docker CLI.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl FromStr for ContainerId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Debug for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContainerId({})", self.short())
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ContainerId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ContainerId> for String {
    fn from(id: ContainerId) -> Self {
        id.0
    }
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input is not a valid UUID.
    #[error("invalid UUID format")]
    InvalidUuid,

    /// The input is empty.
    #[error("identifier must not be empty")]
    Empty,

    /// The input exceeds the maximum slug length.
    #[error("identifier too long: maximum {max} characters, got {got}")]
    TooLong {
        /// The maximum number of characters.
        max: usize,
        /// The actual number of characters.
        got: usize,
    },

    /// The input contains a character that is not allowed in a slug.
    #[error("invalid character {0:?} in identifier")]
    InvalidCharacter(char),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_roundtrip() {
        let id = SessionId::generate();
        let str_repr = id.to_string();
        let parsed = SessionId::from_str(&str_repr).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn session_id_short_is_eight_hex() {
        let id = SessionId::generate();
        let short = id.short();
        assert_eq!(short.len(), 8);
        assert!(short.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn session_id_invalid_uuid() {
        let result = SessionId::from_str("not-a-uuid");
        assert!(matches!(result, Err(IdError::InvalidUuid)));
    }

    #[test]
    fn session_id_serde_json() {
        let id = SessionId::generate();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: SessionId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn game_id_accepts_slugs() {
        assert!(GameId::new("doom").is_ok());
        assert!(GameId::new("half-life_2.goty").is_ok());
        assert!(GameId::new("X").is_ok());
    }

    #[test]
    fn game_id_rejects_traversal_and_separators() {
        assert!(matches!(GameId::new(""), Err(IdError::Empty)));
        assert!(matches!(
            GameId::new("../etc"),
            Err(IdError::InvalidCharacter('.'))
        ));
        assert!(matches!(
            GameId::new("a/b"),
            Err(IdError::InvalidCharacter('/'))
        ));
        assert!(matches!(
            GameId::new("-rm"),
            Err(IdError::InvalidCharacter('-'))
        ));
        assert!(matches!(
            GameId::new("a".repeat(MAX_SLUG_LEN + 1)),
            Err(IdError::TooLong { .. })
        ));
    }

    #[test]
    fn game_id_serde_rejects_invalid() {
        let parsed: Result<GameId, _> = serde_json::from_str("\"bad id\"");
        assert!(parsed.is_err());

        let id: GameId = serde_json::from_str("\"quake\"").unwrap();
        assert_eq!(id.as_str(), "quake");
    }

    #[test]
    fn platform_id_roundtrip() {
        let id = PlatformId::new("wine").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"wine\"");
        let parsed: PlatformId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn container_id_short_form() {
        let id = ContainerId::new("0123456789abcdef0123").unwrap();
        assert_eq!(id.short(), "0123456789ab");

        let tiny = ContainerId::new("abc").unwrap();
        assert_eq!(tiny.short(), "abc");

        assert!(matches!(ContainerId::new("  "), Err(IdError::Empty)));
    }
}

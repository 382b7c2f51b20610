//! Pairing request, outcome, and configuration types.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PairingError;

/// A four-digit pairing PIN.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Pin([u8; 4]);

impl Pin {
    /// Parse a PIN, accepting exactly four ASCII digits.
    ///
    /// # Errors
    ///
    /// Returns `PairingError::InvalidPin` for anything else.
    pub fn parse(s: &str) -> Result<Self, PairingError> {
        let bytes: [u8; 4] = s
            .as_bytes()
            .try_into()
            .map_err(|_| PairingError::InvalidPin)?;
        if !bytes.iter().all(u8::is_ascii_digit) {
            return Err(PairingError::InvalidPin);
        }
        Ok(Self(bytes))
    }

    /// Return the PIN as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        // Only ASCII digits are ever stored.
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl fmt::Debug for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Pin(****)")
    }
}

/// A pairing request waiting for a PIN on the sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPairing {
    /// Handshake token issued by the sidecar.
    pub pair_secret: String,
    /// Address of the client asking to pair.
    pub client_ip: String,
}

/// A client known to the sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidecarClientInfo {
    /// Sidecar-assigned client identity.
    pub client_id: String,
    /// Address the client last connected from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
}

/// A paired client as reported by [`status`](crate::PairingCoordinator::status).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairedClientView {
    /// Sidecar client id, or the pairing secret for locally recorded clients.
    pub id: String,
    /// Client address, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
    /// When pairing was accepted, for locally recorded clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paired_at: Option<DateTime<Utc>>,
    /// True if the sidecar currently lists the client.
    pub on_sidecar: bool,
}

/// Snapshot of pairing state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingStatus {
    /// True if the sidecar answered.
    pub reachable: bool,
    /// Requests waiting for a PIN.
    pub pending: Vec<PendingPairing>,
    /// Sidecar clients merged with locally recorded ones.
    pub clients: Vec<PairedClientView>,
}

/// Why a pairing attempt was turned down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The sidecar does not list the secret as pending.
    UnknownSecret,
    /// The sidecar refused the PIN. The secret stays usable.
    WrongPin,
    /// The secret was already accepted.
    AlreadyUsed,
    /// Another attempt on the secret is running.
    InProgress,
}

/// Result of a pairing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PairingOutcome {
    /// The client is paired.
    Accepted,
    /// The attempt was turned down.
    Rejected {
        /// Why.
        reason: RejectReason,
    },
}

impl PairingOutcome {
    /// Returns true if the client is paired.
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Result of clearing all pairings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearReport {
    /// True if the sidecar confirmed the unpair.
    pub sidecar_cleared: bool,
    /// Sidecar failure, when it did not.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sidecar_error: Option<String>,
    /// Locally recorded clients removed.
    pub local_removed: usize,
}

/// Configuration for the sidecar client.
#[derive(Debug, Clone)]
pub struct PairingConfig {
    /// Base URL of the sidecar API.
    pub sidecar_url: String,
    /// Bound on each sidecar request.
    pub timeout: Duration,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            sidecar_url: "http://127.0.0.1:47990".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

impl PairingConfig {
    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `SIDECAR_URL`: Base URL of the sidecar API
    /// - `SIDECAR_TIMEOUT_SECS`: Bound on each sidecar request
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("SIDECAR_URL") {
            config.sidecar_url = val.trim_end_matches('/').to_string();
        }
        if let Ok(val) = std::env::var("SIDECAR_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse() {
                config.timeout = Duration::from_secs(secs);
            }
        }

        config
    }
}

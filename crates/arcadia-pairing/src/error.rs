//! Error types for pairing.

use thiserror::Error;

/// A result type using `PairingError`.
pub type Result<T> = std::result::Result<T, PairingError>;

/// Errors that can occur while pairing streaming clients.
#[derive(Debug, Error)]
pub enum PairingError {
    /// The PIN is not exactly four ASCII digits.
    #[error("invalid PIN: expected 4 digits")]
    InvalidPin,

    /// The pairing secret is empty.
    #[error("pairing secret must not be empty")]
    EmptySecret,

    /// The sidecar could not be reached.
    #[error("sidecar unavailable: {0}")]
    Unavailable(String),

    /// The sidecar answered with an error.
    #[error("sidecar error: {0}")]
    Sidecar(String),

    /// The HTTP client could not be built.
    #[error("http client error: {0}")]
    Client(String),

    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(#[from] arcadia_store::StoreError),
}

impl PairingError {
    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::InvalidPin | Self::EmptySecret => 400,
            Self::Sidecar(_) => 502,
            Self::Unavailable(_) => 503,
            Self::Client(_) | Self::Store(_) => 500,
        }
    }

    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Store(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_codes() {
        assert_eq!(PairingError::InvalidPin.http_status_code(), 400);
        assert_eq!(PairingError::EmptySecret.http_status_code(), 400);
        assert_eq!(PairingError::Sidecar("500".into()).http_status_code(), 502);
        assert_eq!(
            PairingError::Unavailable("refused".into()).http_status_code(),
            503
        );
    }

    #[test]
    fn retriable_errors() {
        assert!(PairingError::Unavailable("refused".into()).is_retriable());
        assert!(!PairingError::InvalidPin.is_retriable());
    }
}

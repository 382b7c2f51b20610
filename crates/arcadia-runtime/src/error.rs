//! Error types for the runtime crate.

use std::path::PathBuf;

use arcadia_core::PlatformId;
use thiserror::Error;

/// Errors that can occur while talking to the container engine.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The engine rejected or failed an operation.
    #[error("container engine error during {operation}: {message}")]
    Engine {
        /// Engine operation that failed.
        operation: &'static str,
        /// Engine error message.
        message: String,
    },

    /// Container, image, or volume not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The engine did not answer in time.
    #[error("timed out during {0}")]
    Timeout(&'static str),

    /// The engine socket could not be reached.
    #[error("cannot connect to container engine: {0}")]
    Connect(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The launch request could not be turned into a container spec.
    #[error("invalid launch specification: {0}")]
    Spec(#[from] SpecError),
}

impl RuntimeError {
    /// Check if this error is retriable.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Connect(_))
    }

    /// Get the HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Spec(_) | Self::Config(_) => 400,
            Self::Engine { .. } => 502,
            Self::Timeout(_) => 504,
            Self::Connect(_) => 503,
        }
    }
}

/// Validation failures raised by the launch spec builder.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpecError {
    /// CPU count is not a positive number within the supported range.
    #[error("cpu must be a positive number no larger than 1024, got {0}")]
    InvalidCpu(f64),

    /// Memory string is malformed or zero.
    #[error("invalid memory limit {0:?}, expected e.g. \"4g\" or \"512m\"")]
    InvalidMemory(String),

    /// Display width or height is zero.
    #[error("display dimensions must be non-zero, got {width}x{height}")]
    InvalidDisplay {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },

    /// Play mode needs an executable.
    #[error("no executable configured for play mode")]
    MissingExecutable,

    /// Executable path is absolute or escapes the game directory.
    #[error("executable must be a relative path inside the game directory: {0}")]
    InvalidExecutable(String),

    /// The platform has no runner image.
    #[error("platform {0} has no runner image")]
    MissingImage(PlatformId),

    /// Installer path has no file name or parent directory.
    #[error("invalid installer path: {0}")]
    InvalidInstallerPath(PathBuf),

    /// The platform cannot run in the requested mode.
    #[error("platform {platform} does not support {mode} mode")]
    UnsupportedMode {
        /// Platform identifier.
        platform: PlatformId,
        /// Requested mode.
        mode: &'static str,
    },
}

/// A specialized Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

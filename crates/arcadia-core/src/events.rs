//! Server-Sent-Events shaped progress messages.
//!
//! Image pulls and downloads both report progress to callers as a stream of
//! [`StreamEvent`]s. Each event serializes to a flat JSON object tagged by `type`:
//!
//! ```text
//! {"type":"progress", ...payload}
//! {"type":"complete", ...payload}
//! {"type":"error", "message":"..."}
//! ```
//!
//! The payload type is chosen by the producer (pull progress, download progress)
//! and must serialize as a JSON object.

use serde::{Deserialize, Serialize};

/// A progress message streamed to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent<P> {
    /// Intermediate progress.
    Progress(P),
    /// The operation finished successfully.
    Complete(P),
    /// The operation failed.
    Error {
        /// Human-readable failure reason.
        message: String,
    },
}

impl<P> StreamEvent<P> {
    /// Return the SSE event name (`progress`, `complete`, or `error`).
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Progress(_) => "progress",
            Self::Complete(_) => "complete",
            Self::Error { .. } => "error",
        }
    }

    /// Returns true if no further events follow this one.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Error { .. })
    }

    /// Build an error event from any displayable error.
    pub fn error(message: impl ToString) -> Self {
        Self::Error {
            message: message.to_string(),
        }
    }
}

impl<P: Serialize> StreamEvent<P> {
    /// Encode the event as the JSON `data:` line of an SSE message.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not serialize as a JSON object.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

//! Core error types for flowmesh operations.
//!
//! All errors are explicit, typed, and recoverable - no panics allowed.
//! Errors are `Clone` so the same failure can be handed to every waiter of a
//! ticket and carried inside actor replies.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The three failure kinds visible on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The payload failed a runtime type check.
    UnexpectedContent,
    /// An underlying operation raised an unexpected fault.
    FailedExecution,
    /// The request was valid but refused in the current state.
    RefusedRequest,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedContent => write!(f, "UNEXPECTEDCONTENT"),
            Self::FailedExecution => write!(f, "FAILEDEXECUTION"),
            Self::RefusedRequest => write!(f, "REFUSEDREQUEST"),
        }
    }
}

/// Core error type for flowmesh operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    // Content errors
    #[error("unexpected content: expected {expected}, found {found}")]
    UnexpectedContent { expected: String, found: String },

    // Execution errors
    #[error("execution failed: {reason}")]
    FailedExecution { reason: String },

    #[error("request refused: {reason}")]
    RefusedRequest { reason: String },

    // Store errors
    #[error("key not found: {key}")]
    NotFound { key: String },

    // Promise errors
    #[error("promise already settled")]
    AlreadySettled,

    #[error("promise abandoned before it settled")]
    Abandoned,

    #[error("operation cancelled")]
    Cancelled,

    // Actor errors
    #[error("actor unavailable: {actor}")]
    ActorUnavailable { actor: String },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    // Configuration errors
    #[error("failed to read file '{path}': {reason}")]
    FileReadFailed { path: PathBuf, reason: String },

    #[error("TOML parse error: {reason}")]
    TomlParseFailed { reason: String },

    #[error("JSON error: {reason}")]
    JsonFailed { reason: String },
}

impl Error {
    /// Create an unexpected content error.
    pub fn unexpected_content(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::UnexpectedContent {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create a failed execution error.
    pub fn failed_execution(reason: impl Into<String>) -> Self {
        Self::FailedExecution {
            reason: reason.into(),
        }
    }

    /// Create a refused request error.
    pub fn refused_request(reason: impl Into<String>) -> Self {
        Self::RefusedRequest {
            reason: reason.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(key: impl fmt::Display) -> Self {
        Self::NotFound {
            key: key.to_string(),
        }
    }

    /// Create an actor unavailable error.
    pub fn actor_unavailable(actor: impl fmt::Display) -> Self {
        Self::ActorUnavailable {
            actor: actor.to_string(),
        }
    }

    /// Create a file read error.
    pub fn file_read_failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a TOML parse error.
    pub fn toml_parse_failed(reason: impl Into<String>) -> Self {
        Self::TomlParseFailed {
            reason: reason.into(),
        }
    }

    /// Create a JSON error.
    pub fn json_failed(reason: impl Into<String>) -> Self {
        Self::JsonFailed {
            reason: reason.into(),
        }
    }

    /// Collapse this error to the kind reported on the wire.
    ///
    /// Content and refusal errors keep their identity; everything else is an
    /// execution failure.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UnexpectedContent { .. } => ErrorKind::UnexpectedContent,
            Self::RefusedRequest { .. } => ErrorKind::RefusedRequest,
            _ => ErrorKind::FailedExecution,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::json_failed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_collapse_content_errors_to_unexpected_content() {
        let err = Error::unexpected_content("integer", "text");
        assert_eq!(err.kind(), ErrorKind::UnexpectedContent);
        assert!(err.to_string().contains("integer"));
    }

    #[test]
    fn should_collapse_refusals_to_refused_request() {
        let err = Error::refused_request("busy");
        assert_eq!(err.kind(), ErrorKind::RefusedRequest);
    }

    #[test]
    fn should_collapse_other_errors_to_failed_execution() {
        assert_eq!(Error::Cancelled.kind(), ErrorKind::FailedExecution);
        assert_eq!(Error::not_found("k-1").kind(), ErrorKind::FailedExecution);
        assert_eq!(
            Error::Timeout(Duration::from_secs(1)).kind(),
            ErrorKind::FailedExecution
        );
    }

    #[test]
    fn should_display_wire_kinds() {
        assert_eq!(ErrorKind::UnexpectedContent.to_string(), "UNEXPECTEDCONTENT");
        assert_eq!(ErrorKind::FailedExecution.to_string(), "FAILEDEXECUTION");
        assert_eq!(ErrorKind::RefusedRequest.to_string(), "REFUSEDREQUEST");
    }
}

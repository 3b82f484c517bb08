//! Tagged results of long-running operations.
//!
//! Outcomes travel across actor boundaries as values. A failure inside an
//! engine becomes an `Outcome::Error` or a `Fault`, never an actor crash.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{Error, ErrorKind};

/// Unit acknowledgement: the operation finished and has nothing to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Done;

/// A failure as reported on the wire: a kind plus a human readable message.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct Fault {
    /// The wire-level kind.
    pub kind: ErrorKind,
    /// Description of what went wrong.
    pub message: String,
}

impl Fault {
    /// Create a fault of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// A payload failed its type check.
    pub fn unexpected_content(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnexpectedContent, message)
    }

    /// An underlying operation failed.
    pub fn failed_execution(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FailedExecution, message)
    }

    /// The request was refused in the current state.
    pub fn refused_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RefusedRequest, message)
    }
}

impl From<Error> for Fault {
    fn from(e: Error) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

/// Result of a long-running operation such as an evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Outcome<T> {
    /// Finished, nothing to report.
    Done,
    /// Finished with a failure.
    Error(Fault),
    /// Finished with a result.
    Data(T),
}

impl<T> Outcome<T> {
    /// Whether this outcome is a failure.
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Transform the data arm.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Done => Outcome::Done,
            Self::Error(fault) => Outcome::Error(fault),
            Self::Data(value) => Outcome::Data(f(value)),
        }
    }
}

impl<T> From<std::result::Result<T, Error>> for Outcome<T> {
    fn from(result: std::result::Result<T, Error>) -> Self {
        match result {
            Ok(value) => Self::Data(value),
            Err(e) => Self::Error(e.into()),
        }
    }
}

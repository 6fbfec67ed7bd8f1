//! Per-cycle error types.
//!
//! Every failure inside a publish cycle is turned into a `CycleError`.
//! The runner treats all of them the same way (report and continue);
//! the `ErrorKind` tag only exists so diagnostics say where it broke.
use std::fmt;

use thiserror::Error;

/// Where in the cycle a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Broker unreachable, bad URL, authentication refused.
    Connect,
    /// Quote could not be encoded.
    Serialize,
    /// Broker rejected or never acknowledged the message.
    Send,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Connect => "connect",
            ErrorKind::Serialize => "serialize",
            ErrorKind::Send => "send",
        };
        f.write_str(name)
    }
}

/// Failure of a single publish cycle.
#[derive(Error, Debug)]
pub enum CycleError {
    /// Acquiring a publisher handle failed.
    #[error("broker connection failed: {0}")]
    Connect(String),

    /// Encoding the quote body failed.
    #[error("quote serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Publishing the message failed.
    #[error("publish to topic '{topic}' failed: {reason}")]
    Send { topic: String, reason: String },
}

impl CycleError {
    /// Tag used in diagnostics and metrics.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CycleError::Connect(_) => ErrorKind::Connect,
            CycleError::Serialize(_) => ErrorKind::Serialize,
            CycleError::Send { .. } => ErrorKind::Send,
        }
    }
}

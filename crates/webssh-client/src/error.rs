//! Error taxonomy for transfer operations.

use std::fmt;
use std::time::Duration;
use webssh_core::{PathError, TransferId};

/// The client operation an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Upload,
    Download,
    Subscribe,
    PollProgress,
    ListDirectory,
    CheckReachable,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Upload => "upload",
            Self::Download => "download",
            Self::Subscribe => "progress subscription",
            Self::PollProgress => "progress poll",
            Self::ListDirectory => "directory listing",
            Self::CheckReachable => "reachability check",
        };
        f.write_str(s)
    }
}

/// Errors surfaced by the transfer client.
///
/// `subject` is the target's label for target-scoped calls and
/// `transfer <id>` for progress calls.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// The connection could not be established or broke mid-request.
    #[error("{operation} for {subject} failed: {message}")]
    Transport {
        operation: Operation,
        subject: String,
        message: String,
    },

    /// The server declined the request.
    #[error("{operation} for {subject} rejected: {reason}")]
    Rejected {
        operation: Operation,
        subject: String,
        reason: String,
    },

    /// Unknown transfer id or missing remote path.
    #[error("{operation} for {subject} failed: not found: {what}")]
    NotFound {
        operation: Operation,
        subject: String,
        what: String,
    },

    /// A local deadline expired. The remote side is left untouched.
    #[error("{operation} for {subject} timed out after {after:?}")]
    Timeout {
        operation: Operation,
        subject: String,
        after: Duration,
    },

    /// The progress channel dropped before a terminal state arrived.
    #[error("progress channel for transfer {id} lost after {events} events: {reason}")]
    ConnectionLost {
        id: TransferId,
        events: u64,
        reason: String,
    },

    /// Input rejected before any request was sent.
    #[error("invalid {operation} request: {source}")]
    InvalidRequest {
        operation: Operation,
        #[source]
        source: PathError,
    },

    /// A completed download could not be written locally.
    #[error("failed to save {name}: {source}")]
    Persist {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

impl TransferError {
    pub(crate) fn transport(
        operation: Operation,
        subject: impl Into<String>,
        message: impl fmt::Display,
    ) -> Self {
        Self::Transport {
            operation,
            subject: subject.into(),
            message: message.to_string(),
        }
    }

    /// Map an unsuccessful HTTP status to the taxonomy.
    pub(crate) fn from_status(
        operation: Operation,
        subject: impl Into<String>,
        status: u16,
        detail: impl Into<String>,
    ) -> Self {
        let subject = subject.into();
        let detail = detail.into();
        let detail = if detail.trim().is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {}", detail.trim())
        };
        match status {
            404 => Self::NotFound {
                operation,
                subject,
                what: detail,
            },
            400..=499 => Self::Rejected {
                operation,
                subject,
                reason: detail,
            },
            _ => Self::Transport {
                operation,
                subject,
                message: detail,
            },
        }
    }

    /// Classify an error message carried in a response envelope.
    pub(crate) fn from_remote_message(
        operation: Operation,
        subject: impl Into<String>,
        message: String,
    ) -> Self {
        let subject = subject.into();
        if reports_missing(&message) {
            Self::NotFound {
                operation,
                subject,
                what: message,
            }
        } else {
            Self::Rejected {
                operation,
                subject,
                reason: message,
            }
        }
    }

    /// The operation this error belongs to, when it is tied to one.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            Self::Transport { operation, .. }
            | Self::Rejected { operation, .. }
            | Self::NotFound { operation, .. }
            | Self::Timeout { operation, .. }
            | Self::InvalidRequest { operation, .. } => Some(*operation),
            Self::ConnectionLost { .. } => Some(Operation::Subscribe),
            Self::Persist { .. } => Some(Operation::Download),
        }
    }

    /// Whether repeating the same call may succeed.
    ///
    /// Resubscribing is the retry for `ConnectionLost`. Upload submissions
    /// are never retried here; a blind retry can create a duplicate transfer.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Timeout { .. } | Self::ConnectionLost { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

fn reports_missing(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    ["no such file", "not found", "does not exist", "not exist"]
        .iter()
        .any(|needle| lower.contains(needle))
}

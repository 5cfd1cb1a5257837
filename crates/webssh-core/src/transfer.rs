//! Transfer identifiers, states and progress snapshots.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Server-minted token correlating an upload with its progress events.
///
/// Servers may send it as a JSON string or integer; it is always held and
/// re-sent as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransferId(String);

impl TransferId {
    /// Create an id from its textual form.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TransferId {
    type Err = TransferIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TransferIdError::Empty);
        }
        Ok(Self(s.to_string()))
    }
}

impl From<u64> for TransferId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

impl Serialize for TransferId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TransferId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Text(String),
            Number(u64),
        }

        match Wire::deserialize(deserializer)? {
            Wire::Text(s) => s.parse().map_err(de::Error::custom),
            Wire::Number(n) => Ok(n.into()),
        }
    }
}

/// Error parsing a transfer id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferIdError {
    #[error("transfer id cannot be empty")]
    Empty,
}

/// Lifecycle of a transfer as reported by the server.
///
/// `Pending → InProgress → {Completed | Failed | Cancelled}`. The last three
/// are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransferState {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TransferState {
    /// Whether no further transitions can follow this state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A point-in-time view of one transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferProgress {
    pub id: TransferId,
    pub bytes_transferred: u64,
    /// `None` when the source declared no length.
    #[serde(default)]
    pub total_bytes: Option<u64>,
    pub state: TransferState,
    /// Server-provided detail, typically the reason for `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TransferProgress {
    /// A freshly accepted transfer with nothing moved yet.
    pub fn pending(id: TransferId, total_bytes: Option<u64>) -> Self {
        Self {
            id,
            bytes_transferred: 0,
            total_bytes,
            state: TransferState::Pending,
            message: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Completed fraction in `0.0..=1.0`.
    ///
    /// Returns `None` when the total is unknown or zero; callers must fall
    /// back to the raw byte count in that case.
    pub fn fraction(&self) -> Option<f64> {
        match self.total_bytes {
            Some(total) if total > 0 => {
                Some((self.bytes_transferred as f64 / total as f64).min(1.0))
            }
            _ => None,
        }
    }
}

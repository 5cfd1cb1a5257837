//! Opaque remote target descriptor.
//!
//! A target is whatever the server needs to reach a host and authenticate
//! (the `sshInfo` blob). Clients forward it verbatim and never look inside.
//! It may embed credentials, so `Debug` and `Display` never print the raw
//! value; a caller-supplied label is shown instead.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder printed for targets that carry no label.
const UNLABELED: &str = "<unlabeled target>";

/// An opaque remote endpoint descriptor.
#[derive(Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Target {
    raw: String,
    label: Option<String>,
}

impl Target {
    /// Wrap a raw descriptor as received from the caller.
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            label: None,
        }
    }

    /// Wrap a raw descriptor and attach a human-readable label for
    /// diagnostics.
    pub fn labeled(raw: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            label: Some(label.into()),
        }
    }

    /// The raw descriptor, exactly as it goes on the wire.
    pub fn as_raw(&self) -> &str {
        &self.raw
    }

    /// The diagnostic label, if one was attached.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Target {}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label.as_deref().unwrap_or(UNLABELED))
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("label", &self.label)
            .field("raw_len", &self.raw.len())
            .finish()
    }
}

impl From<String> for Target {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<Target> for String {
    fn from(target: Target) -> Self {
        target.raw
    }
}

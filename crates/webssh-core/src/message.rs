//! Wire envelopes and endpoint paths.
//!
//! JSON endpoints wrap their payload in the server's response envelope:
//! `{"Duration": .., "Data": .., "Msg": "success" | <error text>}`.

use crate::TransferId;
use serde::{Deserialize, Serialize};

/// `Msg` value marking a successful call.
pub const SUCCESS: &str = "success";

/// Endpoint paths, relative to the configured prefix.
pub mod endpoint {
    pub const LIST: &str = "/file/list";
    pub const UPLOAD: &str = "/file/upload";
    pub const DOWNLOAD: &str = "/file/download";
    /// Serves both the polling snapshot and the WebSocket progress channel.
    pub const PROGRESS: &str = "/file/progress";
    pub const CHECK: &str = "/check";
}

/// Query and form field names.
pub mod field {
    pub const SSH_INFO: &str = "sshInfo";
    pub const PATH: &str = "path";
    pub const ID: &str = "id";
    pub const FILE: &str = "file";
}

/// Response envelope used by every JSON endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(rename = "Duration", default)]
    pub duration: String,
    /// Absent or `null` on most errors.
    #[serde(rename = "Data")]
    pub data: Option<T>,
    #[serde(rename = "Msg")]
    pub msg: String,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            duration: String::new(),
            data: Some(data),
            msg: SUCCESS.to_string(),
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            duration: String::new(),
            data: None,
            msg: msg.into(),
        }
    }

    /// Attach the elapsed handling time, as the server reports it.
    pub fn with_duration(mut self, duration: impl Into<String>) -> Self {
        self.duration = duration.into();
        self
    }

    pub fn is_success(&self) -> bool {
        self.msg == SUCCESS
    }

    /// Split into the payload or the server's error text.
    pub fn into_result(self) -> Result<Option<T>, String> {
        if self.is_success() {
            Ok(self.data)
        } else {
            Err(self.msg)
        }
    }
}

/// Payload of a successful upload submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadAccepted {
    pub transfer_id: TransferId,
}

/// Payload of a successful reachability check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckData {
    /// Whether the server is configured to remember passwords.
    #[serde(default)]
    pub save_pass: bool,
}

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DirEntry {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    /// Server-formatted modification time.
    #[serde(default)]
    pub modify_time: String,
    #[serde(default)]
    pub is_dir: bool,
}

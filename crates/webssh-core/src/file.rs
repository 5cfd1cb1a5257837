//! Download results and upload metadata.

use serde::{Deserialize, Serialize};

/// A fully received download.
///
/// Produced once, after the whole payload has arrived. There is no partial
/// variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResult {
    pub bytes: Vec<u8>,
    /// Local file name, taken from the final segment of the remote path.
    pub suggested_name: String,
}

impl DownloadResult {
    /// Pair a payload with the name derived from `remote_path`.
    pub fn new(remote_path: &str, bytes: Vec<u8>) -> Result<Self, PathError> {
        let suggested_name = final_segment(remote_path)?.to_string();
        Ok(Self {
            bytes,
            suggested_name,
        })
    }
}

/// Where an upload lands on the remote side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadMetadata {
    /// Remote directory receiving the file.
    pub remote_dir: String,
    /// Name the file gets inside `remote_dir`.
    pub file_name: String,
}

impl UploadMetadata {
    pub fn new(remote_dir: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            remote_dir: remote_dir.into(),
            file_name: file_name.into(),
        }
    }

    /// Reject metadata that cannot name a single remote file.
    pub fn validate(&self) -> Result<(), PathError> {
        if self.remote_dir.trim().is_empty() {
            return Err(PathError::Empty);
        }
        let name = self.file_name.as_str();
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(PathError::InvalidFileName(self.file_name.clone()));
        }
        Ok(())
    }
}

/// Final segment of a slash-separated remote path.
///
/// Trailing slashes are ignored, so `/a/b/` yields `b`. Paths with no
/// segment at all (`""`, `/`) are rejected.
pub fn final_segment(path: &str) -> Result<&str, PathError> {
    if path.trim().is_empty() {
        return Err(PathError::Empty);
    }
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| PathError::NoFinalSegment(path.to_string()))
}

/// Error validating a remote path or file name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("remote path cannot be empty")]
    Empty,
    #[error("remote path has no final segment: {0}")]
    NoFinalSegment(String),
    #[error("invalid remote file name: {0:?}")]
    InvalidFileName(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggested_name_is_final_segment() {
        let result = DownloadResult::new("/a/b/report.csv", vec![1, 2]).unwrap();
        assert_eq!(result.suggested_name, "report.csv");
        assert_eq!(final_segment("report.csv").unwrap(), "report.csv");
        assert_eq!(final_segment("/var/log/").unwrap(), "log");
    }

    #[test]
    fn rejects_paths_without_a_name() {
        assert_eq!(final_segment(""), Err(PathError::Empty));
        assert_eq!(
            final_segment("///"),
            Err(PathError::NoFinalSegment("///".to_string()))
        );
    }

    #[test]
    fn metadata_validation() {
        assert!(UploadMetadata::new("/tmp", "a.txt").validate().is_ok());
        assert_eq!(
            UploadMetadata::new("", "a.txt").validate(),
            Err(PathError::Empty)
        );
        assert!(UploadMetadata::new("/tmp", "../a").validate().is_err());
        assert!(UploadMetadata::new("/tmp", "..").validate().is_err());
    }
}
